//! Bounded subprocess execution shared by all adapters.
//!
//! One primitive owns the whole child lifecycle: spawn, stream capture,
//! deadline race, and forced termination. Every exit path (completion,
//! process error, deadline expiry) releases the child; a timed-out agent
//! process must never outlive the call that started it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

/// A subprocess invocation with an absolute deadline.
#[derive(Debug, Clone)]
pub struct BoundedCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    stdin: Option<String>,
    timeout: Duration,
}

impl BoundedCommand {
    /// Creates a command with a default 60 second deadline.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            stdin: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Adds environment variable overrides on top of the parent environment.
    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Writes `input` to the child's stdin after spawning.
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Sets the deadline after which the child is forcibly terminated.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the command to completion or deadline.
    ///
    /// Never returns an error: spawn and wait failures are encoded as
    /// [`ProcessOutcome::Failed`], deadline expiry as
    /// [`ProcessOutcome::TimedOut`] with whatever output the child
    /// produced before it was killed.
    pub async fn run(&self) -> ProcessOutcome {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ProcessOutcome::Failed {
                    message: format!("Failed to spawn {}: {}", self.program, e),
                }
            }
        };

        if let Some(ref input) = self.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!("Failed to write stdin to {}: {}", self.program, e);
                }
                stdin.shutdown().await.ok();
            }
        }

        let stdout_handle = drain(child.stdout.take());
        let stderr_handle = drain(child.stderr.take());

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => ProcessOutcome::Completed {
                exit_code: status.code().unwrap_or(-1),
                stdout: collect(stdout_handle).await,
                stderr: collect(stderr_handle).await,
            },
            Ok(Err(e)) => ProcessOutcome::Failed {
                message: format!("Process error: {}", e),
            },
            Err(_) => {
                // Deadline expired: kill and reap so nothing is orphaned.
                child.kill().await.ok();
                ProcessOutcome::TimedOut {
                    stdout: collect(stdout_handle).await,
                    stderr: collect(stderr_handle).await,
                }
            }
        }
    }
}

fn drain<R>(reader: Option<R>) -> Option<JoinHandle<String>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    reader.map(|mut reader| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).to_string()
        })
    })
}

async fn collect(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

/// Terminal state of a bounded subprocess.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// The child exited on its own before the deadline.
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// The deadline expired and the child was killed.
    TimedOut { stdout: String, stderr: String },
    /// The child could not be spawned or waited on.
    Failed { message: String },
}
