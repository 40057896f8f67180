use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use nodevisor_process::{validate_process_id, ProcHandle, StaleProcessReaper};
use nodevisor_process_file::ProcessFileManager;

mod config;

use config::{parse_duration, ProcctlConfig};

/// Inspect and terminate processes through nodevisor process handles
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether a process is still running
    Inspect { pid: u32 },

    /// Print the environment of a process, one NAME=VALUE per line
    Environ { pid: u32 },

    /// Terminate a process
    Terminate {
        pid: u32,

        /// Exit code to assign (Windows only; Linux reports SIGKILL)
        #[arg(long, default_value = "1")]
        exit_code: u32,
    },

    /// Poll a process until it exits
    Watch {
        pid: u32,

        #[arg(long, value_parser = parse_duration, default_value = "200ms")]
        interval: Duration,

        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Terminate a stale supervised process recorded in a PID file
    Reap {
        /// Explicit PID file path
        #[arg(long, value_name = "FILE", conflicts_with = "id")]
        pid_file: Option<PathBuf>,

        /// Component ID whose PID file is resolved from the configuration
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ProcctlConfig::load_from_file(path)?,
        None => ProcctlConfig::default(),
    };

    let level = if args.debug { "debug" } else { config.log_level.as_str() };
    initialize_logging(level)?;

    match args.command {
        Command::Inspect { pid } => inspect(pid),
        Command::Environ { pid } => environ(pid),
        Command::Terminate { pid, exit_code } => terminate(pid, exit_code),
        Command::Watch {
            pid,
            interval,
            timeout,
        } => watch(pid, interval, timeout).await,
        Command::Reap { pid_file, id } => reap(&config, pid_file, id).await,
    }
}

fn initialize_logging(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

fn open(pid: u32) -> Result<ProcHandle> {
    ProcHandle::open(pid).with_context(|| format!("Failed to open process {}", pid))
}

fn inspect(pid: u32) -> Result<()> {
    let handle = open(pid)?;
    let state = handle.state();
    let terminated = handle.is_terminated();
    handle.close()?;

    println!("pid:        {}", pid);
    println!("handle:     {}", state);
    println!("terminated: {}", terminated?);
    Ok(())
}

fn environ(pid: u32) -> Result<()> {
    let handle = open(pid)?;
    let env = handle.environ();
    handle.close()?;

    for entry in env.with_context(|| format!("Failed to read environment of {}", pid))? {
        println!("{}", entry);
    }
    Ok(())
}

fn terminate(pid: u32, exit_code: u32) -> Result<()> {
    let handle = open(pid)?;
    let result = handle.terminate(exit_code);
    handle.close()?;

    match result {
        Ok(()) => info!(pid, exit_code, "Termination requested"),
        Err(e) if e.is_already_done() => info!(pid, "Process already exited"),
        Err(e) => return Err(e).context("Termination failed"),
    }
    Ok(())
}

async fn watch(pid: u32, interval: Duration, timeout: Option<Duration>) -> Result<()> {
    let handle = open(pid)?;
    let result = tokio::select! {
        result = poll_until_terminated(&handle, interval, timeout) => result,
        _ = shutdown_signal() => {
            info!("Watch interrupted");
            Ok(())
        }
    };
    handle.close()?;
    result
}

async fn poll_until_terminated(
    handle: &ProcHandle,
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<()> {
    let started = tokio::time::Instant::now();
    loop {
        if handle.is_terminated()? {
            info!(pid = handle.pid(), elapsed = ?started.elapsed(), "Process exited");
            return Ok(());
        }
        if let Some(timeout) = timeout {
            if started.elapsed() >= timeout {
                return Err(anyhow!(
                    "Process {} still running after {:?}",
                    handle.pid(),
                    timeout
                ));
            }
        }
        tokio::time::sleep(interval).await;
    }
}

async fn reap(config: &ProcctlConfig, pid_file: Option<PathBuf>, id: Option<String>) -> Result<()> {
    let path = match (pid_file, id) {
        (Some(path), _) => path,
        (None, Some(id)) => {
            validate_process_id(&id)?;
            ProcessFileManager::new(config.process_file.clone()).generate_pid_file_path(&id)
        }
        (None, None) => return Err(anyhow!("Either --pid-file or --id is required")),
    };

    let span = tracing::info_span!("reaper", pid_file = %path.display());
    let reaper = StaleProcessReaper::new((&config.reaper).into(), span);

    let outcome = reaper
        .reap_pid_file(&path)
        .await
        .with_context(|| format!("Failed to reap {}", path.display()))?;

    println!("{:?}", outcome);
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let (mut sigterm, mut sigint) = match (
            signal::unix::signal(signal::unix::SignalKind::terminate()),
            signal::unix::signal(signal::unix::SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                warn!("Failed to install signal handlers");
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
