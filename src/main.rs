//! spaceforce - see where your disk space goes.
//!
//! Usage:
//!   spaceforce [PATH]            Scan and print a size tree
//!   spaceforce scan [PATH]       Scan with display options
//!   spaceforce export [PATH]     Export scan to JSON
//!   spaceforce --help            Show help

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, eyre};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use spaceforce_core::{
    DEFAULT_PARALLEL_DEPTH, DEFAULT_READ_TIMEOUT_MS, DEFAULT_WORKERS, FileNode, ScanConfig,
    ScanOutcome,
};
use spaceforce_scan::{ScanProgress, Scanner, progress_channel};

#[derive(Parser)]
#[command(
    name = "spaceforce",
    version,
    about = "See where your disk space goes",
    long_about = "spaceforce walks a directory tree with a bounded number of concurrent \
                  reads, skipping network volumes, cloud-synced folders and other \
                  filesystems by default.\n\n\
                  Press Ctrl-C during a scan to stop early and print what was found."
)]
struct Cli {
    /// Path to scan (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    #[command(flatten)]
    options: ScanOptions,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Scan and show a size tree
    Scan {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        options: ScanOptions,

        /// Maximum depth to display
        #[arg(short, long, default_value = "3")]
        depth: u32,

        /// Show all entries (no depth limit on display)
        #[arg(short, long)]
        all: bool,

        /// Number of top entries to show per directory
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,
    },

    /// Export scan results to JSON
    Export {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        options: ScanOptions,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Exclusion and concurrency options shared by every command.
#[derive(Args, Clone, Debug)]
struct ScanOptions {
    /// Skip network mounts and cloud-synced folders
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    skip_network: bool,

    /// Stay on the filesystem of the scanned path
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    one_filesystem: bool,

    /// Include hidden entries (names starting with '.')
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    hidden: bool,

    /// Maximum concurrent directory reads
    #[arg(short = 'j', long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Give up on a directory listing after this many milliseconds
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Directories shallower than this are scanned concurrently
    #[arg(long, default_value_t = DEFAULT_PARALLEL_DEPTH)]
    parallel_depth: u32,

    /// Skip entries whose name matches this glob (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    ignore: Vec<String>,
}

impl ScanOptions {
    fn to_config(&self, path: &Path) -> Result<ScanConfig> {
        ScanConfig::builder()
            .root(path)
            .skip_network(self.skip_network)
            .one_filesystem(self.one_filesystem)
            .include_hidden(self.hidden)
            .workers(self.workers)
            .read_timeout_ms(self.timeout_ms)
            .parallel_depth(self.parallel_depth)
            .ignore_patterns(self.ignore.clone())
            .build()
            .context("Invalid scan options")
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = match cli.command {
        Some(Command::Scan {
            path,
            options,
            depth,
            all,
            top,
        }) => runtime.block_on(run_scan(&path, &options, if all { None } else { Some(depth) }, top)),
        Some(Command::Export {
            path,
            options,
            output,
        }) => runtime.block_on(run_export(&path, &options, output)),
        None => runtime.block_on(run_scan(&cli.path, &cli.options, Some(3), 10)),
    };

    // Abandoned directory reads may still be parked in the blocking pool;
    // don't wait for them.
    runtime.shutdown_background();
    result
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run a scan with live progress on stderr. Ctrl-C stops it early.
async fn scan_with_progress(config: &ScanConfig) -> ScanOutcome {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping scan");
                cancel.cancel();
            }
        })
    };

    let (tx, mut rx) = progress_channel();
    let interactive = std::io::stderr().is_terminal();
    let printer = tokio::spawn(async move {
        let mut printed = false;
        while let Some(progress) = rx.recv().await {
            if interactive {
                eprint!("\r\x1b[2K{}", progress_line(&progress));
                printed = true;
            }
        }
        if printed {
            eprintln!();
        }
    });

    let outcome = Scanner::new().scan(config, cancel, Some(tx)).await;

    let _ = printer.await;
    ctrl_c.abort();
    outcome
}

fn progress_line(progress: &ScanProgress) -> String {
    let done = match progress.fraction() {
        Some(fraction) => format!(" ({:.0}%)", fraction * 100.0),
        None => String::new(),
    };
    format!(
        "{} items ({} files), {}{}, {:.0} files/s, {}/s - {}",
        progress.total_items(),
        progress.files_scanned,
        format_size(progress.bytes_scanned),
        done,
        progress.files_per_second(),
        format_size(progress.bytes_per_second() as u64),
        truncate(&progress.current_path.display().to_string(), 60)
    )
}

/// Run a scan and display a summary tree.
async fn run_scan(path: &Path, options: &ScanOptions, max_depth: Option<u32>, top_n: usize) -> Result<()> {
    let config = options.to_config(path)?;

    eprintln!("Scanning {}...", path.display());
    let mut outcome = scan_with_progress(&config).await;

    let Some(mut root) = outcome.root.take() else {
        return Err(root_error(&outcome));
    };
    root.sort_children_by_size();

    let total = root.total_size();

    println!();
    println!("{}", "─".repeat(60));
    println!(" {} - {}", outcome.root_path.display(), format_size(total));
    println!(
        " {} files, {} directories",
        outcome.stats.total_files, outcome.stats.total_dirs
    );
    println!(
        " {} in {:.2}s",
        if outcome.completed { "Scanned" } else { "Cancelled" },
        outcome.scan_duration.as_secs_f64()
    );
    println!("{}", "─".repeat(60));
    println!();

    print_node(&root, 0, max_depth.unwrap_or(u32::MAX), top_n, total);

    let types = outcome.stats.types_by_size();
    if !types.is_empty() {
        println!();
        println!("Largest file types:");
        for (tag, stats) in types.iter().take(5) {
            println!(
                "  {:<16} {:>10}  {} file(s)",
                tag,
                format_size(stats.total_size),
                stats.file_count
            );
        }
    }

    if !outcome.skipped.is_empty() {
        println!();
        println!("Skipped {} path(s):", outcome.skipped.len());
        for skip in outcome.skipped.iter().take(top_n) {
            println!("  {skip}");
        }
        if outcome.placeholders_skipped > 0 {
            println!("  ({} cloud placeholder(s) not downloaded)", outcome.placeholders_skipped);
        }
    }

    if outcome.has_errors() {
        println!();
        println!("{} error(s) during scan", outcome.errors.len());
    }

    Ok(())
}

/// Export scan results to JSON.
async fn run_export(path: &Path, options: &ScanOptions, output: Option<PathBuf>) -> Result<()> {
    let config = options.to_config(path)?;

    eprintln!("Scanning {}...", path.display());
    let outcome = scan_with_progress(&config).await;
    if outcome.root.is_none() {
        return Err(root_error(&outcome));
    }

    let json = serde_json::to_string_pretty(&outcome)?;

    match output {
        Some(output_path) => {
            std::fs::write(&output_path, json)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

fn root_error(outcome: &ScanOutcome) -> color_eyre::Report {
    let cause = outcome
        .errors
        .first()
        .map_or("unknown error", |e| e.message.as_str());
    eyre!("Cannot scan {}: {}", outcome.root_path.display(), cause)
}

/// Print a node and its children.
fn print_node(node: &FileNode, depth: u32, max_depth: u32, top_n: usize, root_size: u64) {
    let indent = "  ".repeat(depth as usize);
    let size = node.total_size();
    let ratio = if root_size > 0 {
        size as f64 / root_size as f64 * 100.0
    } else {
        0.0
    };

    let bar = make_bar(ratio / 100.0, 10);

    let name = if depth == 0 {
        node.path.display().to_string()
    } else {
        node.name.to_string()
    };

    let dir_marker = if node.is_dir() { "/" } else { "" };

    println!(
        "{}{}{:<40} {:>10} {:>5.1}% {}",
        indent,
        if node.is_dir() { "▼ " } else { "  " },
        truncate(&format!("{}{}", name, dir_marker), 40),
        format_size(size),
        ratio,
        bar
    );

    if node.is_dir() && depth < max_depth {
        for child in node.children.iter().take(top_n) {
            print_node(child, depth + 1, max_depth, top_n, root_size);
        }

        let remaining = node.children.len().saturating_sub(top_n);
        if remaining > 0 {
            let indent = "  ".repeat((depth + 1) as usize);
            println!("{}  ... and {} more", indent, remaining);
        }
    }
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
