use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Test executable for nodevisor process handle E2E testing
///
/// Protocol: prints `ping` on stdout once running, then waits for a line on
/// stdin and exits with `--exit-code`. Closing stdin also ends the wait.
#[derive(Parser, Debug)]
#[command(name = "testexe")]
#[command(about = "Ping-pong child process for process handle testing", long_about = None)]
struct Args {
    /// Exit code to return after the pong
    #[arg(long, default_value = "0")]
    exit_code: i32,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Starting testexe with args: {:?}", args);

    let mut stdout = tokio::io::stdout();
    if stdout.write_all(b"ping\n").await.is_err() || stdout.flush().await.is_err() {
        std::process::exit(2);
    }

    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    match stdin.read_line(&mut line).await {
        Ok(0) => debug!("stdin closed"),
        Ok(_) => debug!("Received pong: {}", line.trim()),
        Err(e) => debug!("stdin read failed: {}", e),
    }

    info!("Exiting with code {}", args.exit_code);
    std::process::exit(args.exit_code);
}
