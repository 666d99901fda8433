// Upload staging: copy an incoming file to a private temp file and parse it
//
// The temp file lives exactly as long as the StagedUpload; every exit path,
// including a failed parse, removes it.

use std::io::Read;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use ordrecon_recon::model::Batch;

use crate::error::IoError;

/// Reader selected from the upload's file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Spreadsheet,
    Delimited,
}

impl UploadFormat {
    pub fn from_name(name: &str) -> Result<Self, IoError> {
        let ext = extension(name).to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Self::Spreadsheet),
            "csv" | "tsv" | "txt" => Ok(Self::Delimited),
            _ => Err(IoError::UnsupportedFormat(ext)),
        }
    }
}

fn extension(name: &str) -> &str {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
}

#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    name: String,
    format: UploadFormat,
}

impl StagedUpload {
    /// Stage bytes from `reader` under the original upload `name`.
    pub fn from_reader(name: &str, reader: &mut impl Read) -> Result<Self, IoError> {
        let format = UploadFormat::from_name(name)?;
        let suffix = format!(".{}", extension(name).to_ascii_lowercase());
        let mut file = tempfile::Builder::new()
            .prefix("ordrecon-upload-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| IoError::Read(format!("cannot create staging file: {e}")))?;
        let bytes = std::io::copy(reader, &mut file).map_err(|e| IoError::Read(e.to_string()))?;

        debug!(upload = name, bytes, staged = %file.path().display(), "upload staged");
        Ok(Self {
            file,
            name: name.to_string(),
            format,
        })
    }

    /// Stage a file from disk.
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let name = crate::csv::file_name(path);
        // check the extension before touching the file
        UploadFormat::from_name(&name)?;
        let mut source = std::fs::File::open(path).map_err(|source| IoError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(&name, &mut source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn format(&self) -> UploadFormat {
        self.format
    }

    /// Parse the staged file. The batch is named after the original upload.
    pub fn parse(&self) -> Result<Batch, IoError> {
        let mut batch = match self.format {
            UploadFormat::Spreadsheet => crate::xlsx::import(self.path()),
            UploadFormat::Delimited => crate::csv::import(self.path()),
        }
        .map_err(|e| match e {
            IoError::Parse { message, .. } => IoError::Parse {
                file: self.name.clone(),
                message,
            },
            other => other,
        })?;
        batch.source = self.name.clone();
        debug!(upload = %self.name, rows = batch.len(), "upload parsed");
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn format_follows_extension() {
        assert_eq!(UploadFormat::from_name("Orders.XLSX").unwrap(), UploadFormat::Spreadsheet);
        assert_eq!(UploadFormat::from_name("orders.ods").unwrap(), UploadFormat::Spreadsheet);
        assert_eq!(UploadFormat::from_name("orders.tsv").unwrap(), UploadFormat::Delimited);
        assert!(matches!(
            UploadFormat::from_name("orders.pdf"),
            Err(IoError::UnsupportedFormat(ext)) if ext == "pdf"
        ));
        assert!(UploadFormat::from_name("orders").is_err());
    }

    #[test]
    fn staged_csv_parses_under_original_name() {
        let mut body = Cursor::new("ORDERNUMBER,MATERIAL_NUMBER\nA1,M1\n".as_bytes().to_vec());
        let staged = StagedUpload::from_reader("march.csv", &mut body).unwrap();
        assert!(staged.path().to_string_lossy().ends_with(".csv"));
        let batch = staged.parse().unwrap();
        assert_eq!(batch.source, "march.csv");
        assert_eq!(batch.rows[0].get("MATERIAL_NUMBER"), Some("M1"));
    }

    #[test]
    fn staging_file_is_removed_on_drop() {
        let mut body = Cursor::new(b"not,really\n".to_vec());
        let staged = StagedUpload::from_reader("x.csv", &mut body).unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn parse_failure_names_the_upload() {
        let mut body = Cursor::new(b"garbage".to_vec());
        let staged = StagedUpload::from_reader("orders.xlsx", &mut body).unwrap();
        let path = staged.path().to_path_buf();
        match staged.parse() {
            Err(IoError::Parse { file, .. }) => assert_eq!(file, "orders.xlsx"),
            other => panic!("expected parse error, got {other:?}"),
        }
        drop(staged);
        assert!(!path.exists());
    }
}
