//! stalecheck - incremental file change detection.
//!
//! Usage:
//!   stalecheck check PATH      Report files changed since the last check
//!   stalecheck hash PATH       Print the content digest of a file
//!   stalecheck prune           Forget records for files that no longer exist
//!   stalecheck --help          Show help

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::Level;

use stalecheck_core::{ChangeInfo, CheckMode, CheckOptions, CheckOutcome, CheckerConfig, FolderOutcome, HashBackend};
use stalecheck_detect::ChangeChecker;

#[derive(Parser)]
#[command(
    name = "stalecheck",
    version,
    about = "Incremental file change detection",
    long_about = "stalecheck remembers the size and modification time of every file it \
                  checks and only hashes content when the metadata looks suspicious.\n\n\
                  Records live in two JSON stores, by default under .stalecheck/."
)]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Metadata store location (overrides the config)
    #[arg(long, global = true)]
    mtime_store: Option<PathBuf>,

    /// Hash store location (overrides the config)
    #[arg(long, global = true)]
    hash_store: Option<PathBuf>,

    /// Hash backend: buffered, streaming or mapped
    #[arg(short, long, global = true)]
    backend: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a file or every file under a directory
    Check {
        /// File or directory to check
        path: PathBuf,

        /// Report every verdict, not just changed paths
        #[arg(short, long)]
        detail: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the content digest of a file
    Hash {
        /// File to hash
        path: PathBuf,
    },

    /// Drop records for files that no longer exist
    Prune,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let mut checker = ChangeChecker::open(config).context("Failed to open record stores")?;

    match cli.command {
        Command::Check {
            path,
            detail,
            format,
        } => {
            run_check(&mut checker, &path, detail, format).await?;
        }
        Command::Hash { path } => {
            let digest = checker
                .compute_hash(&path)
                .await
                .wrap_err_with(|| format!("Failed to hash {}", path.display()))?;
            println!("{}  {}", digest, path.display());
        }
        Command::Prune => {
            let removed = checker.prune_missing();
            checker.save().context("Failed to save record stores")?;
            println!("Pruned {} record(s)", removed);
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Build the checker config from the optional file plus command line overrides.
fn load_config(cli: &Cli) -> Result<CheckerConfig> {
    let mut config = match &cli.config {
        Some(path) => CheckerConfig::from_toml_file(path)
            .wrap_err_with(|| format!("Failed to load config {}", path.display()))?,
        None => CheckerConfig::default(),
    };

    if let Some(path) = &cli.mtime_store {
        config.mtime_store = path.clone();
    }
    if let Some(path) = &cli.hash_store {
        config.hash_store = path.clone();
    }
    if let Some(name) = &cli.backend {
        config.backend = HashBackend::from_name(name)?;
    }

    config.validate()?;
    Ok(config)
}

/// Check a file or folder and print the verdicts.
async fn run_check(
    checker: &mut ChangeChecker,
    path: &Path,
    detail: bool,
    format: OutputFormat,
) -> Result<()> {
    let metadata =
        std::fs::metadata(path).wrap_err_with(|| format!("Invalid path {}", path.display()))?;

    let mode = if detail {
        CheckMode::Detail
    } else {
        CheckMode::Boolean
    };
    let options = CheckOptions::new(mode).with_cancel(cancel_on_ctrl_c());

    if metadata.is_dir() {
        eprintln!("Checking {}...", path.display());
        let outcome = checker
            .check_folder(path, &options)
            .await
            .context("Folder check failed")?;
        print_folder(&outcome, format)?;
    } else {
        let outcome = checker.check_file(path, &options).await?;
        checker.save().context("Failed to save record stores")?;
        print_file(path, &outcome, format)?;
    }

    Ok(())
}

/// A token cancelled when the user hits Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing current file...");
            trigger.cancel();
        }
    });
    token
}

fn print_file(path: &Path, outcome: &CheckOutcome, format: OutputFormat) -> Result<()> {
    match (format, outcome) {
        (OutputFormat::Text, CheckOutcome::Changed(changed)) => {
            println!("{}  {}", if *changed { "changed" } else { "unchanged" }, path.display());
        }
        (OutputFormat::Text, CheckOutcome::Detail(info)) => print_info(info),
        (OutputFormat::Json, CheckOutcome::Changed(changed)) => {
            let value = serde_json::json!({ "filePath": path, "changed": changed });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        (OutputFormat::Json, CheckOutcome::Detail(info)) => {
            println!("{}", serde_json::to_string_pretty(info)?);
        }
    }
    Ok(())
}

fn print_folder(outcome: &FolderOutcome, format: OutputFormat) -> Result<()> {
    match (format, outcome) {
        (OutputFormat::Text, FolderOutcome::Changed(paths)) => {
            for path in paths {
                println!("{}", path.display());
            }
            eprintln!();
            eprintln!("{} changed file(s)", paths.len());
        }
        (OutputFormat::Text, FolderOutcome::Details(infos)) => {
            for info in infos {
                print_info(info);
            }
            let changed = infos.iter().filter(|i| i.changed).count();
            let hashed = infos.iter().filter(|i| i.suspicious).count();
            eprintln!();
            eprintln!(
                "{} file(s) checked, {} changed, {} hashed",
                infos.len(),
                changed,
                hashed
            );
        }
        (OutputFormat::Json, FolderOutcome::Changed(paths)) => {
            println!("{}", serde_json::to_string_pretty(paths)?);
        }
        (OutputFormat::Json, FolderOutcome::Details(infos)) => {
            println!("{}", serde_json::to_string_pretty(infos)?);
        }
    }
    Ok(())
}

fn print_info(info: &ChangeInfo) {
    let digest = info
        .hash
        .map(|h| h.to_hex())
        .unwrap_or_else(|| "-".repeat(16));
    println!(
        "{:<9} {:>10}  {}  {:<17} {}",
        if info.changed { "changed" } else { "unchanged" },
        format_size(info.size),
        digest,
        info.reason,
        info.file_path.display()
    );
}

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
