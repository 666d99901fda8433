// Report export: write an ExportTable under a unique name and hand back its path

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use ordrecon_recon::model::ExportTable;

use crate::error::IoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown export format '{other}' (expected xlsx or csv)")),
        }
    }
}

/// Write `table` to `dir` as `<kind>-<uuid>.<ext>`, creating `dir` if needed.
pub fn write_report(
    dir: &Path,
    kind: &str,
    table: &ExportTable,
    format: ExportFormat,
) -> Result<PathBuf, IoError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| IoError::Write(format!("cannot create {}: {e}", dir.display())))?;

    let path = dir.join(format!("{kind}-{}.{}", Uuid::new_v4(), format.extension()));
    match format {
        ExportFormat::Xlsx => crate::xlsx::export(table, &path)?,
        ExportFormat::Csv => crate::csv::export(table, &path)?,
    }

    info!(kind, rows = table.len(), path = %path.display(), "report exported");
    Ok(path)
}
