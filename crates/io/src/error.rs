// Errors raised while reading uploads or writing reports

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read upload: {0}")]
    Read(String),

    #[error("cannot parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error("unsupported file type '{0}' (expected xlsx, xlsm, xls, xlsb, ods, csv, tsv or txt)")]
    UnsupportedFormat(String),

    #[error("cannot write report: {0}")]
    Write(String),
}

impl IoError {
    pub(crate) fn parse(file: &str, message: impl ToString) -> Self {
        Self::Parse {
            file: file.to_string(),
            message: message.to_string(),
        }
    }
}
