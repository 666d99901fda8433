//! `ordrecon config`: check an engine rules file, show effective settings.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

use crate::runtime::{load_recon_config, Runtime};
use crate::CliError;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Parse and validate an engine rules file without running anything
    #[command(after_help = "\
Examples:
  ordrecon config validate ordrecon.toml")]
    Validate {
        /// Path to the TOML rules file
        file: PathBuf,
    },

    /// Show the settings file location and the effective options
    Show,
}

#[derive(Serialize)]
struct ValidateOutcome<'a> {
    valid: bool,
    file: &'a Path,
    commit: String,
    in_batch_duplicates: bool,
    required_columns: Vec<String>,
}

#[derive(Serialize)]
struct ShowOutcome<'a> {
    settings: &'a Path,
    db: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a Path>,
    export_dir: &'a Path,
    format: String,
    timeout_ms: Option<u64>,
    pool_size: usize,
}

pub fn cmd_config(rt: &Runtime, cmd: ConfigCommands) -> Result<(), CliError> {
    match cmd {
        ConfigCommands::Validate { file } => {
            let config = load_recon_config(&file)?;
            let outcome = ValidateOutcome {
                valid: true,
                file: &file,
                commit: config.policy.commit.to_string(),
                in_batch_duplicates: config.policy.in_batch_duplicates,
                required_columns: config.required_columns(),
            };
            rt.emit(&outcome, || {
                eprintln!(
                    "ok: {} (commit: {}, in-batch duplicates: {})",
                    file.display(),
                    outcome.commit,
                    if outcome.in_batch_duplicates { "rejected" } else { "allowed" }
                );
                eprintln!("required columns: {}", outcome.required_columns.join(", "));
            })
        }
        ConfigCommands::Show => {
            let outcome = ShowOutcome {
                settings: &rt.settings_path,
                db: &rt.db,
                config: rt.config_path.as_deref(),
                export_dir: &rt.export_dir,
                format: rt.format.to_string(),
                timeout_ms: rt.timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
                pool_size: rt.settings.pool_size,
            };
            rt.emit(&outcome, || {
                println!("settings:   {}", outcome.settings.display());
                println!("db:         {}", outcome.db.display());
                match outcome.config {
                    Some(path) => println!("config:     {}", path.display()),
                    None => println!("config:     (built-in defaults)"),
                }
                println!("export dir: {}", outcome.export_dir.display());
                println!("format:     {}", outcome.format);
                match outcome.timeout_ms {
                    Some(ms) => println!("timeout:    {ms}ms"),
                    None => println!("timeout:    none"),
                }
                println!("pool size:  {}", outcome.pool_size);
            })
        }
    }
}
