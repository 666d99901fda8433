// ordrecon CLI - order uploads, as-of checks and duplicate scans against the record store

mod config;
mod exit_codes;
mod records;
mod runtime;
mod scan;
mod upload;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ordrecon_config::Settings;
use ordrecon_io::{ExportFormat, IoError};
use ordrecon_recon::{MalformedInput, ReconError, StoreError};

use exit_codes::{io_exit_code, recon_exit_code, EXIT_SUCCESS, EXIT_USAGE};
use runtime::Runtime;

#[derive(Parser)]
#[command(name = "ordrecon")]
#[command(about = "Validate order uploads, catch duplicate identities, and keep the record store consistent")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command. Flags beat environment, environment beats settings.
#[derive(Args)]
pub struct GlobalArgs {
    /// SQLite record store (default: store.path setting, then the data directory)
    #[arg(long, global = true, env = "ORDRECON_DB", value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Engine rules file (TOML)
    #[arg(long, global = true, env = "ORDRECON_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Settings file (default: ~/.config/ordrecon/settings.json)
    #[arg(long, global = true, env = "ORDRECON_SETTINGS", value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Deadline in milliseconds for the command's store calls
    #[arg(long, global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Directory for exported reports
    #[arg(long, global = true, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Report file format (xlsx or csv)
    #[arg(long, global = true, value_parser = parse_export_format)]
    pub format: Option<ExportFormat>,

    /// Print a single JSON object to stdout instead of a human summary
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter, e.g. "debug" or "ordrecon_recon=debug" (overrides RUST_LOG)
    #[arg(long, global = true, value_name = "FILTER")]
    pub log: Option<String>,
}

fn parse_export_format(s: &str) -> Result<ExportFormat, String> {
    s.parse()
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an order upload and add it to the store
    #[command(after_help = "\
Nothing is written if any row is invalid or any identity (order number + material
number) already exists. Rejected uploads produce a report file.

Examples:
  ordrecon add march-orders.xlsx
  ordrecon add march-orders.csv --dry-run
  ordrecon add march-orders.csv --json --format csv")]
    Add {
        /// Upload file (xlsx, xlsm, xls, xlsb, ods, csv, tsv, txt)
        file: PathBuf,

        /// Validate only; never touch the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Flag upload rows whose batch number disagrees with stored records
    #[command(name = "as-of", after_help = "\
Examples:
  ordrecon as-of status-report.xlsx
  ordrecon as-of status-report.csv --export-dir ./out")]
    AsOf {
        /// Upload file with order, material and batch columns
        file: PathBuf,
    },

    /// Report stored identities recorded under more than one batch number
    #[command(name = "true-dups")]
    TrueDups,

    /// Edit or remove stored records by order number
    Records {
        #[command(subcommand)]
        command: records::RecordsCommands,
    },

    /// Engine rules and settings
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings_path = cli
        .global
        .settings
        .clone()
        .unwrap_or_else(Settings::config_path);
    let loaded = match cli.global.settings {
        Some(ref path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let (settings, settings_error) = match loaded {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };

    init_logging(cli.global.log.as_deref(), &settings.log_filter);
    if let Some(e) = settings_error {
        warn!(error = %e, "ignoring settings file, using defaults");
    }

    let result = Runtime::resolve(cli.global, settings_path, settings).and_then(|rt| match cli.command {
        Commands::Add { file, dry_run } => upload::cmd_add(&rt, file, dry_run),
        Commands::AsOf { file } => upload::cmd_as_of(&rt, file),
        Commands::TrueDups => scan::cmd_true_dups(&rt),
        Commands::Records { command } => records::cmd_records(&rt, command),
        Commands::Config { command } => config::cmd_config(&rt, command),
    });

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Filter precedence: --log, then RUST_LOG, then the log.filter setting.
fn init_logging(flag: Option<&str>, setting: &str) {
    let filter = match flag {
        Some(directive) => EnvFilter::try_new(directive),
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(setting)),
    }
    .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(err: IoError) -> Self {
        Self::new(io_exit_code(&err), err.to_string())
    }

    pub fn store(err: StoreError) -> Self {
        Self::recon(ReconError::StoreUnavailable(err))
    }

    /// Map an engine error to its exit code, with a hint where one helps.
    pub fn recon(err: ReconError) -> Self {
        let code = recon_exit_code(&err);
        let hint = match &err {
            ReconError::MalformedInput(MalformedInput::MissingColumns(_)) => {
                Some("check the header row, or map column names in the engine rules file".to_string())
            }
            ReconError::StoreUnavailable(StoreError::TimedOut) => {
                Some("raise --timeout-ms or the store.callTimeoutMs setting".to_string())
            }
            ReconError::StoreUnavailable(StoreError::Unavailable(_)) => {
                Some("check --db; another process may hold the database lock".to_string())
            }
            ReconError::PersistenceFailure { committed, .. } if *committed > 0 => Some(format!(
                "the first {committed} row(s) were kept; re-upload only the remaining rows"
            )),
            _ => None,
        };
        let message = match err {
            ReconError::RowValidation(ref rejections) => {
                let shown: Vec<String> = rejections.iter().take(3).map(|r| r.to_string()).collect();
                let more = if rejections.len() > shown.len() { "; ..." } else { "" };
                format!("{err}: {}{more}", shown.join("; "))
            }
            ref other => other.to_string(),
        };
        Self { code, message, hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
