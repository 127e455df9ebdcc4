use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use claude_to_sqlite::sequential;
use claude_to_sqlite::utils::ConvertConfig;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Convert a Claude.ai export to SQLite.
///
/// Example: claude-to-sqlite claude.zip claude.db
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The export: a .zip from Claude.ai or its conversations.json.
    #[arg(value_name = "EXPORT_PATH")]
    export_path: PathBuf,

    /// SQLite database to create or update.
    /// Falls back to `db_path` from the config file.
    #[arg(value_name = "DB_PATH")]
    db_path: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/claude-to-sqlite/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Suppress the progress bar and summary.
    #[arg(short, long)]
    quiet: bool,

    /// Log each conversation and extracted artifact.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    db_path: Option<PathBuf>,
    quiet: Option<bool>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("claude-to-sqlite/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    // A second init (tests, embedding) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve db_path (CLI > Config)
    let db_path = cli.db_path.or(file_cfg.db_path).ok_or_else(|| {
        eyre!("No database path given.\nPass DB_PATH, or set db_path in config.toml.")
    })?;

    if !cli.export_path.is_file() {
        return Err(eyre!(
            "Export not found or not a file: {}",
            cli.export_path.display()
        ));
    }

    // 3. Build the conversion config
    let config = ConvertConfig {
        export_path: cli.export_path,
        db_path,
        quiet: cli.quiet || file_cfg.quiet.unwrap_or(false),
    };

    // 4. Run the conversion
    sequential::execute(config)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
