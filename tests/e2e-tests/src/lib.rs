//! E2E test framework for nodevisor process handles
//!
//! Tests drive the `testexe` binary through a ping-pong protocol: the child
//! prints `ping` once it runs and exits after reading a line from stdin.

use std::env;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

/// Get the path to the TESTEXE (testexe) binary
pub fn get_testexe_path() -> PathBuf {
    let mut path = env::current_exe()
        .expect("Failed to get current exe path")
        .parent()
        .expect("Failed to get parent dir")
        .to_path_buf();

    // If we're in deps/, go up one level
    if path.ends_with("deps") {
        path.pop();
    }

    path.push(format!("testexe{}", env::consts::EXE_SUFFIX));

    if !path.exists() {
        panic!("TESTEXE binary not found at: {}", path.display());
    }

    path
}

/// Install a test subscriber once per test binary.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default, Clone)]
pub struct StartOptions {
    /// Extra environment entries for the child
    pub env: Vec<(String, String)>,
    /// Exit code the child returns after the pong
    pub exit_code: i32,
}

/// A running `testexe` child. Killed and reaped on drop if still alive.
pub struct PingPong {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl PingPong {
    pub fn start(options: StartOptions) -> io::Result<Self> {
        let mut child = Command::new(get_testexe_path())
            .arg("--exit-code")
            .arg(options.exit_code.to_string())
            .envs(options.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| io::Error::other("child stdout not captured"))?;

        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Block until the child reports that it is running.
    pub fn await_ping(&mut self) -> io::Result<()> {
        let mut line = String::new();
        self.stdout.read_line(&mut line)?;
        match line.trim() {
            "ping" => Ok(()),
            other => Err(io::Error::other(format!("expected ping, got {:?}", other))),
        }
    }

    /// Let the child exit.
    pub fn send_pong(&mut self) -> io::Result<()> {
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("pong already sent"))?;
        stdin.write_all(b"pong\n")?;
        stdin.flush()
    }

    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        drop(self.stdin.take());
        self.child.wait()
    }
}

impl Drop for PingPong {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Start a child and wait for its ping.
pub fn start_ready(options: StartOptions) -> PingPong {
    let mut ping_pong = PingPong::start(options).expect("Failed to start testexe");
    ping_pong.await_ping().expect("testexe did not ping");
    ping_pong
}
