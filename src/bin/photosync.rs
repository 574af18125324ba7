//! # Photosync CLI - Back up a photo library into a bucket
//!
//! ## Usage
//! ```bash
//! # Show the bucket key of every photo in the library
//! photosync list-source
//!
//! # Show every key in the bucket
//! photosync list-target --prefix Travel/
//!
//! # See what a backup would do, then do it
//! photosync backup --dry-run
//! photosync backup --progress
//! ```
//!
//! Library and bucket locations come from `~/.photosync.yaml`, or the file
//! named by `--config` or `PHOTOSYNC_CONFIG`.

use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use photosync::{
    LocalBucket, LocalSource, Result, SourceWalk, SyncConfig, SyncError, SyncEvent,
    SynchronizerBuilder, TargetStore,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Photosync CLI - One-way backup of a photo library
#[derive(Parser)]
#[command(name = "photosync")]
#[command(version)]
#[command(about = "Back up a photo library into an object-storage bucket")]
#[command(long_about = None)]
struct Cli {
    /// Config file (defaults to $PHOTOSYNC_CONFIG or ~/.photosync.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the bucket key of every photo in the library
    #[command(alias = "ls-source")]
    ListSource {
        /// Only keys starting with this prefix (must end with '/')
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// List every key in the bucket
    #[command(alias = "ls-target")]
    ListTarget {
        /// Only keys starting with this prefix (must end with '/')
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Upload new photos and hide removed ones
    Backup {
        /// Only sync keys starting with this prefix (must end with '/')
        #[arg(short, long)]
        prefix: Option<String>,

        /// Show what would change without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Show a spinner instead of one line per action
        #[arg(long)]
        progress: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    // Run command
    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    let config_path = SyncConfig::resolve_path(cli.config.as_deref())?;
    let config = SyncConfig::load(&config_path)?;

    match cli.command {
        Commands::ListSource { prefix } => {
            let prefix = prefix.unwrap_or_else(|| config.prefix.clone());
            cmd_list_source(&config, &prefix)
        }
        Commands::ListTarget { prefix } => {
            let prefix = prefix.unwrap_or_else(|| config.prefix.clone());
            cmd_list_target(&config, &prefix)
        }
        Commands::Backup { prefix, dry_run, progress } => {
            let prefix = prefix.unwrap_or_else(|| config.prefix.clone());
            cmd_backup(&config, prefix, dry_run, progress)
        }
    }
}

/// Print the key of every library item, in sync order
fn cmd_list_source(config: &SyncConfig, prefix: &str) -> Result<()> {
    photosync::walk::validate_prefix(prefix)?;
    let source = LocalSource::open(&config.source.root)?;

    for image in SourceWalk::with_prefix(&source, prefix) {
        println!("{}", image?.key);
    }
    Ok(())
}

/// Print every visible key in the bucket
fn cmd_list_target(config: &SyncConfig, prefix: &str) -> Result<()> {
    photosync::walk::validate_prefix(prefix)?;
    let bucket = LocalBucket::open(&config.target.root)?;

    for object in bucket.list_objects(prefix)? {
        println!("{}", object?.key);
    }
    Ok(())
}

/// Run a backup
///
/// Uploads every library item whose key is missing from the bucket and
/// hides every bucket object whose key is missing from the library. With
/// `--dry-run` nothing is downloaded or written.
fn cmd_backup(config: &SyncConfig, prefix: String, dry_run: bool, show_progress: bool) -> Result<()> {
    let source = LocalSource::open(&config.source.root)?;
    let bucket = LocalBucket::open(&config.target.root)?;
    let sync = SynchronizerBuilder::new()
        .prefix(prefix)
        .dry_run(dry_run)
        .build(source, bucket)?;

    if dry_run {
        println!("{}", "Planning backup (dry run)...".blue().bold());
    } else {
        println!("{}", "Backing up...".blue().bold());
    }
    if !sync.prefix().is_empty() {
        println!("  Prefix: {}", sync.prefix().cyan());
    }

    let progress = if show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {pos} actions {msg}")
                .map_err(|e| SyncError::internal(e.to_string()))?,
        );
        Some(pb)
    } else {
        None
    };

    let report = sync.run_with_progress(|event| match &progress {
        Some(pb) => {
            let key = match event {
                SyncEvent::Uploaded { key, .. } | SyncEvent::Hidden { key } => key,
            };
            pb.set_message(key.to_string());
            pb.inc(1);
        }
        None => match event {
            SyncEvent::Uploaded { key, bytes } => {
                println!("  {} {} ({})", "+".green().bold(), key, format_bytes(*bytes).dimmed());
            }
            SyncEvent::Hidden { key } => {
                println!("  {} {}", "-".red().bold(), key);
            }
        },
    })?;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let (title, verb) = if report.dry_run {
        ("Dry run complete", "Would upload")
    } else {
        ("Backup complete", "Uploaded")
    };
    println!("\n{} {}", "✓".green().bold(), title.bold());
    println!(
        "  {}: {} ({})",
        verb,
        report.uploaded.to_string().green(),
        format_bytes(report.bytes_uploaded).cyan()
    );
    println!(
        "  {}: {}",
        if report.dry_run { "Would hide" } else { "Hidden" },
        report.hidden.to_string().yellow()
    );
    println!("  Unchanged: {}", report.unchanged.to_string().dimmed());
    println!("  Time: {}", format_duration(report.duration).to_string().cyan());

    Ok(())
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
