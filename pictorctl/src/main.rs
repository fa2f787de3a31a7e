//! # pictorctl
//!
//! Operator CLI for pictor cache directories at rest. Every command works
//! directly on the files; no running cache instance is involved.
//!
//! - `dump`: report the directory contents, oldest access first
//! - `gc`: apply the eviction policy offline
//! - `key`: print the on-disk file name for a source URL

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pictor_core::{CacheKey, format_bytes, paths, policy, scan};

#[derive(Parser, Debug)]
#[command(name = "pictorctl")]
#[command(about = "Inspect and maintain pictor image cache directories")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report every cache file with its size and last access, oldest first
    Dump {
        /// Cache directory to inspect
        root: PathBuf,

        /// Byte budget to compare the total against
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Apply the eviction policy to a directory offline
    Gc {
        /// Cache directory to collect
        root: PathBuf,

        /// Byte budget
        #[arg(long)]
        limit: u64,

        /// Fraction of the budget to free beyond the overage
        #[arg(long, default_value_t = 0.1)]
        ratio: f64,

        /// List victims without deleting anything
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Print the on-disk file name for a source URL
    Key {
        /// Source URL
        url: String,

        /// Print the dense-format file name instead
        #[arg(long, default_value_t = false)]
        dense: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Dump { root, limit } => run_dump(&root, limit),
        Command::Gc {
            root,
            limit,
            ratio,
            dry_run,
        } => run_gc(&root, limit, ratio, dry_run),
        Command::Key { url, dense } => {
            run_key(&url, dense);
            Ok(())
        }
    }
}

fn run_dump(root: &Path, limit: Option<u64>) -> anyhow::Result<()> {
    let entries = scan::scan_directory(root)
        .with_context(|| format!("failed to scan {}", root.display()))?;
    debug!(files = entries.len(), "scanned cache directory");

    let total: u64 = entries.iter().map(|entry| entry.file_size).sum();
    println!("{} files, {} total", entries.len(), format_bytes(total));
    for entry in &entries {
        let accessed: DateTime<Utc> = entry.access_time.into();
        println!(
            "  {:>12}  {}  {}",
            format_bytes(entry.file_size),
            accessed.format("%Y-%m-%d %H:%M:%S"),
            entry.file_name
        );
    }

    if let Some(limit) = limit {
        if policy::should_evict(total, limit) {
            println!(
                "over budget: {} exceeds {}",
                format_bytes(total),
                format_bytes(limit)
            );
        } else {
            println!(
                "within budget: {} of {}",
                format_bytes(total),
                format_bytes(limit)
            );
        }
    }
    Ok(())
}

fn run_gc(root: &Path, limit: u64, ratio: f64, dry_run: bool) -> anyhow::Result<()> {
    let entries = scan::scan_directory(root)
        .with_context(|| format!("failed to scan {}", root.display()))?;
    debug!(files = entries.len(), "scanned cache directory");

    let total: u64 = entries.iter().map(|entry| entry.file_size).sum();
    if !policy::should_evict(total, limit) {
        println!(
            "within budget: {} of {}; nothing to do",
            format_bytes(total),
            format_bytes(limit)
        );
        return Ok(());
    }

    let target = policy::sweep_target(total, limit, policy::normalize_ratio(ratio));
    let mut freed = 0u64;
    let mut victims = Vec::new();
    for entry in &entries {
        if freed >= target {
            break;
        }
        freed += entry.file_size;
        victims.push(entry);
    }

    for entry in &victims {
        if dry_run {
            println!(
                "would delete  {:>12}  {}",
                format_bytes(entry.file_size),
                entry.file_name
            );
        } else {
            let path = paths::cache_file_path(root, &entry.file_name);
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to delete {}", path.display()))?;
            println!(
                "deleted  {:>12}  {}",
                format_bytes(entry.file_size),
                entry.file_name
            );
        }
    }
    println!(
        "{} {} of {} files, freeing {}",
        if dry_run { "selected" } else { "deleted" },
        victims.len(),
        entries.len(),
        format_bytes(freed)
    );
    Ok(())
}

fn run_key(url: &str, dense: bool) {
    let key = CacheKey::derive(url);
    if dense {
        println!("{}", paths::dense_file_name(&key));
    } else {
        println!("{}", key.stem());
    }
}
