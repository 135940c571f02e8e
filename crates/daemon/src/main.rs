//! Filebay Daemon
//!
//! Sandboxed remote file-management service and its command-line client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;

use daemon::client::Client;
use daemon::config::Config;
use daemon::files::Sandbox;
use daemon::router::Router;
use daemon::server::Server;
use protocol::messages::ListResponse;

/// Filebay - sandboxed remote file management.
#[derive(Parser, Debug)]
#[command(name = "filebay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the filebay daemon
    Serve,

    /// List a directory on a running daemon
    Ls {
        /// Directory to list, relative to the served root (default: the root)
        #[arg(default_value = "")]
        path: String,

        /// Only show entries whose name contains this term
        #[arg(long, short)]
        search: Option<String>,

        /// Descend into subdirectories
        #[arg(long, short)]
        recursive: bool,

        /// Daemon address (default: the configured listen address)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Download a file from the daemon
    Get {
        /// Remote path to download
        remote: String,

        /// Local destination (default: the remote file name in the current directory)
        local: Option<PathBuf>,

        /// Daemon address (default: the configured listen address)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Upload a local file into a directory on the daemon
    Put {
        /// Local file to upload
        local: PathBuf,

        /// Remote directory to upload into ("" for the root)
        remote_dir: String,

        /// Daemon address (default: the configured listen address)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Delete a file or directory tree on the daemon
    Rm {
        /// Remote path to delete
        path: String,

        /// Daemon address (default: the configured listen address)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Move or rename an entry on the daemon
    Mv {
        /// Source path
        source: String,

        /// Destination path or directory
        dest: String,

        /// Daemon address (default: the configured listen address)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Copy an entry on the daemon
    Cp {
        /// Source path
        source: String,

        /// Destination path or directory
        dest: String,

        /// Daemon address (default: the configured listen address)
        #[arg(long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Initialize tracing; only the daemon writes log files
    let level = effective_log_level(&config.daemon.log_level, cli.verbose);
    let log_dir = match &cli.command {
        Commands::Serve if !config.daemon.log_dir.as_os_str().is_empty() => {
            Some(config.daemon.log_dir.clone())
        }
        _ => None,
    };
    let _log_guard = init_tracing(level, log_dir.as_deref());

    match cli.command {
        Commands::Serve => run_serve(config).await,
        Commands::Ls {
            path,
            search,
            recursive,
            addr,
        } => {
            let mut client = connect(addr, &config).await?;
            let response = client.list(&path, search, recursive).await?;
            print_listing(&response);
            Ok(())
        }
        Commands::Get {
            remote,
            local,
            addr,
        } => {
            let local = local.unwrap_or_else(|| PathBuf::from(infer_download_name(&remote)));
            let mut client = connect(addr, &config).await?;
            let bytes = client.download(&remote, &local).await?;
            println!(
                "Downloaded {} ({}) to {}",
                remote,
                format_size(bytes),
                local.display()
            );
            Ok(())
        }
        Commands::Put {
            local,
            remote_dir,
            addr,
        } => {
            let mut client = connect(addr, &config).await?;
            let (path, size) = client.upload(&local, &remote_dir).await?;
            println!("Uploaded {} ({})", path, format_size(size));
            Ok(())
        }
        Commands::Rm { path, addr } => {
            let mut client = connect(addr, &config).await?;
            client.delete(&path).await?;
            println!("Deleted {}", path);
            Ok(())
        }
        Commands::Mv { source, dest, addr } => {
            let mut client = connect(addr, &config).await?;
            let moved_to = client.move_entry(&source, &dest).await?;
            println!("Moved {} to {}", source, moved_to);
            Ok(())
        }
        Commands::Cp { source, dest, addr } => {
            let mut client = connect(addr, &config).await?;
            let copied_to = client.copy_entry(&source, &dest).await?;
            println!("Copied {} to {}", source, copied_to);
            Ok(())
        }
    }
}

/// Run the daemon: validate configuration, open the sandbox, serve until
/// a shutdown signal arrives.
async fn run_serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let sandbox = Sandbox::new(&config.files.root)
        .with_context(|| {
            format!(
                "cannot open root directory: {}",
                config.files.root.display()
            )
        })?
        .case_insensitive(config.files.case_insensitive);

    let router = Router::new(
        sandbox,
        config.files.max_upload_size,
        config.server.max_chunk_size,
    );

    let server = Server::bind(&config.server.listen_addr, router)
        .await
        .with_context(|| format!("cannot listen on {}", config.server.listen_addr))?;

    tracing::info!(
        addr = %config.server.listen_addr,
        root = %config.files.root.display(),
        "filebay daemon started"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Received shutdown signal");
        signal_token.cancel();
    });

    server.run(shutdown).await;

    tracing::info!("filebay daemon stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
}

/// Connect to a running daemon, preferring an explicit --addr over the config.
async fn connect(addr: Option<String>, config: &Config) -> anyhow::Result<Client> {
    let addr = addr.unwrap_or_else(|| config.server.listen_addr.clone());
    Client::connect_with_timeout(&addr, Duration::from_secs(5))
        .await
        .with_context(|| format!("cannot connect to daemon at {}", addr))
}

/// Pick the log level: the config value, raised by repeated -v flags.
fn effective_log_level(config_level: &str, verbose: u8) -> &str {
    match verbose {
        0 => config_level,
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize the tracing subscriber.
///
/// With a log directory set, output goes to a daily-rolling file and the
/// returned guard must stay alive for the rest of the process.
fn init_tracing(level: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "filebay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(level)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(level).init();
            None
        }
    }
}

/// Print a listing response as a formatted ASCII table.
fn print_listing(response: &ListResponse) {
    if response.entries.is_empty() {
        println!("Empty directory.");
        println!(
            "{} file(s), {} dir(s)",
            response.file_count, response.directory_count
        );
        return;
    }

    // Calculate column widths
    let name_width = response
        .entries
        .iter()
        .map(|e| e.name.len())
        .max()
        .unwrap_or(4)
        .max(4);
    let kind_width = response
        .entries
        .iter()
        .map(|e| e.kind.len())
        .max()
        .unwrap_or(4)
        .max(4);

    // Print header
    println!(
        "{:<name_width$}  {:<kind_width$}  {:>10}  {:>12}",
        "NAME",
        "KIND",
        "SIZE",
        "MODIFIED",
        name_width = name_width,
        kind_width = kind_width
    );
    println!("{}", "-".repeat(name_width + kind_width + 28));

    // Print rows
    for entry in &response.entries {
        let size = entry
            .size
            .map(format_size)
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<name_width$}  {:<kind_width$}  {:>10}  {:>12}",
            truncate_str(&entry.name, name_width),
            entry.kind,
            size,
            format_relative_time(entry.modified),
            name_width = name_width,
            kind_width = kind_width
        );
    }

    println!();
    println!(
        "{} file(s), {} dir(s)",
        response.file_count, response.directory_count
    );
}

/// Format a byte count as a human-readable size (B/KB/MB/GB/TB).
fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

/// Format a Unix timestamp as relative time (e.g., "5m ago").
fn format_relative_time(timestamp: u64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let elapsed = now.saturating_sub(timestamp);

    if elapsed < 60 {
        format!("{}s ago", elapsed)
    } else if elapsed < 3600 {
        format!("{}m ago", elapsed / 60)
    } else if elapsed < 86400 {
        format!("{}h ago", elapsed / 3600)
    } else {
        format!("{}d ago", elapsed / 86400)
    }
}

/// Pick a local file name for a download from the remote path.
fn infer_download_name(remote: &str) -> String {
    remote
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or("download")
        .to_string()
}

/// Truncate a string to a maximum length, adding "..." if truncated.
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len.saturating_sub(3)])
    }
}
