// Application settings
// Loaded from ~/.config/ordrecon/settings.json

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot write settings: {0}")]
    Write(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Record store
    #[serde(rename = "store.path")]
    pub store_path: Option<PathBuf>, // None = data dir

    #[serde(rename = "store.poolSize")]
    pub pool_size: usize,

    #[serde(rename = "store.busyTimeoutMs")]
    pub busy_timeout_ms: u64,

    #[serde(rename = "store.callTimeoutMs")]
    pub call_timeout_ms: Option<u64>, // None = no deadline

    // Reports
    #[serde(rename = "export.dir")]
    pub export_dir: PathBuf,

    #[serde(rename = "export.format")]
    pub export_format: String,

    // Logging
    #[serde(rename = "log.filter")]
    pub log_filter: String,

    // Engine rules (TOML)
    #[serde(rename = "recon.configPath")]
    pub recon_config_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: None,
            pool_size: 4,
            busy_timeout_ms: 5_000,
            call_timeout_ms: Some(30_000),
            export_dir: PathBuf::from("reports"),
            export_format: "xlsx".to_string(),
            log_filter: "info".to_string(),
            recon_config_path: None,
        }
    }
}

const DEFAULT_FILE: &str = r#"{
    // Record store (SQLite). Omit "store.path" to use the data directory.
    "store.poolSize": 4,
    "store.busyTimeoutMs": 5000,

    // Deadline for each command's store calls; null = wait indefinitely
    "store.callTimeoutMs": 30000,

    // Where exported reports are written, and as what ("xlsx" or "csv")
    "export.dir": "reports",
    "export.format": "xlsx",

    // tracing filter directive, e.g. "info" or "ordrecon_recon=debug"
    "log.filter": "info"

    // Engine rules file (TOML); omit for built-in column names and policies
    // "recon.configPath": "/path/to/ordrecon.toml"
}
"#;

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ordrecon")
            .join("settings.json")
    }

    /// Load from the default location, writing a commented default file on first run.
    pub fn load() -> Result<Self, SettingsError> {
        let path = Self::config_path();
        if !path.exists() {
            // best effort: a read-only config dir must not stop the tool
            let _ = Self::create_default_file(&path);
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse settings JSON. Lines starting with `//` are comments.
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        serde_json::from_str(&cleaned)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SettingsError::Write(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| SettingsError::Write(e.to_string()))?;
        fs::write(path, json).map_err(|e| SettingsError::Write(e.to_string()))
    }

    /// Write the commented default settings file.
    pub fn create_default_file(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SettingsError::Write(e.to_string()))?;
        }
        fs::write(path, DEFAULT_FILE).map_err(|e| SettingsError::Write(e.to_string()))
    }

    /// Database file to open.
    pub fn effective_store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ordrecon")
                .join("recon.db")
        })
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}
