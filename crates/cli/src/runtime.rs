// Resolved global options: settings file merged with flags

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use ordrecon_config::Settings;
use ordrecon_io::{write_report, ExportFormat, SqliteStore, StoreOptions};
use ordrecon_recon::model::ExportTable;
use ordrecon_recon::{CallContext, ReconConfig};

use crate::exit_codes::{EXIT_CONFIG_INVALID, EXIT_ERROR, EXIT_IO};
use crate::{CliError, GlobalArgs};

pub struct Runtime {
    pub settings_path: PathBuf,
    pub settings: Settings,
    pub db: PathBuf,
    pub config_path: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub export_dir: PathBuf,
    pub format: ExportFormat,
    pub json: bool,
}

impl Runtime {
    pub fn resolve(
        global: GlobalArgs,
        settings_path: PathBuf,
        settings: Settings,
    ) -> Result<Self, CliError> {
        let format = match global.format {
            Some(format) => format,
            None => settings
                .export_format
                .parse()
                .map_err(|e| CliError::args(format!("export.format setting: {e}")))?,
        };
        Ok(Self {
            db: global.db.unwrap_or_else(|| settings.effective_store_path()),
            config_path: global.config.or_else(|| settings.recon_config_path.clone()),
            timeout: global
                .timeout_ms
                .map(Duration::from_millis)
                .or_else(|| settings.call_timeout()),
            export_dir: global.export_dir.unwrap_or_else(|| settings.export_dir.clone()),
            format,
            json: global.json,
            settings_path,
            settings,
        })
    }

    /// Engine rules from the configured TOML file, or the built-in defaults.
    pub fn recon_config(&self) -> Result<ReconConfig, CliError> {
        match self.config_path {
            Some(ref path) => load_recon_config(path),
            None => Ok(ReconConfig::default()),
        }
    }

    pub fn open_store(&self) -> Result<SqliteStore, CliError> {
        if let Some(parent) = self.db.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CliError::new(EXIT_IO, format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let options = StoreOptions {
            pool_size: self.settings.pool_size,
            busy_timeout: self.settings.busy_timeout(),
            ..StoreOptions::default()
        };
        debug!(db = %self.db.display(), "opening record store");
        SqliteStore::open(&self.db, options)
            .map_err(|e| CliError::store(e).with_hint(format!("database: {}", self.db.display())))
    }

    /// One context per command: the deadline covers every store call it makes.
    pub fn context(&self) -> CallContext {
        match self.timeout {
            Some(timeout) => CallContext::with_timeout(timeout),
            None => CallContext::unbounded(),
        }
    }

    pub fn export(&self, kind: &str, table: &ExportTable) -> Result<PathBuf, CliError> {
        write_report(&self.export_dir, kind, table, self.format).map_err(CliError::io)
    }

    /// With --json, print `value` as the command's single stdout line; otherwise run `human`.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce()) -> Result<(), CliError> {
        if self.json {
            let out = serde_json::to_string(value)
                .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
            println!("{out}");
        } else {
            human();
        }
        Ok(())
    }
}

pub fn load_recon_config(path: &Path) -> Result<ReconConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CliError::new(EXIT_CONFIG_INVALID, format!("cannot read config {}: {e}", path.display()))
    })?;
    ReconConfig::from_toml(&text).map_err(|e| CliError::new(EXIT_CONFIG_INVALID, format!("{}: {e}", path.display())))
}
