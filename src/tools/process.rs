// src/tools/process.rs

//! Cancellable provider process execution
//!
//! Every provider is a separate binary. The runner spawns it with stdin
//! nulled, relays its output to the log line by line, and polls the child
//! so a cancelled job kills the process instead of waiting it out.

use crate::error::{Error, Result};
use crate::job::CancelToken;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// How often a running child is checked for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Lines of stderr kept for error messages
const STDERR_TAIL_LINES: usize = 20;

/// Captured result of a finished provider process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Runs provider binaries to completion
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    cancel: CancelToken,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            timeout: None,
        }
    }

    /// Kill providers running longer than `timeout` (unbounded by default)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run `program` and fail unless it exits successfully
    pub fn run<I, S>(&self, tool: &str, program: &Path, args: I) -> Result<ProcessOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.spawn_and_wait(tool, program, args)?;
        if output.status.success() {
            debug!("{} completed successfully", tool);
            Ok(output)
        } else {
            Err(Error::ToolFailed {
                tool: tool.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: tail(&output.stderr),
            })
        }
    }

    fn spawn_and_wait<I, S>(&self, tool: &str, program: &Path, args: I) -> Result<ProcessOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.cancel.check()?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!("Running {:?}", command);

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ToolNotFound(format!("{tool} ({})", program.display()))
            } else {
                Error::Io(e)
            }
        })?;

        // Drain both pipes on their own threads so a chatty provider
        // never blocks on a full pipe while we poll.
        let stdout = child.stdout.take().map(|s| relay(tool.to_string(), s, false));
        let stderr = child.stderr.take().map(|s| relay(tool.to_string(), s, true));

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
                break status;
            }
            if self.cancel.is_cancelled() {
                warn!("Killing {} after cancellation", tool);
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Cancelled);
            }
            if let Some(limit) = self.timeout
                && started.elapsed() >= limit
            {
                warn!("Killing {} after {}s", tool, limit.as_secs());
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::ToolFailed {
                    tool: tool.to_string(),
                    code: -1,
                    stderr: format!("timed out after {} seconds", limit.as_secs()),
                });
            }
        };

        Ok(ProcessOutput {
            status,
            stdout: join(stdout),
            stderr: join(stderr),
        })
    }
}

/// Log each line of a child pipe and collect it
fn relay<R: Read + Send + 'static>(tool: String, pipe: R, is_stderr: bool) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut collected = String::new();
        for line in BufReader::new(pipe).lines().map_while(|l| l.ok()) {
            if is_stderr {
                warn!("[{}] {}", tool, line);
            } else {
                debug!("[{}] {}", tool, line);
            }
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Log how long a provider step took
pub fn log_elapsed(what: &str, started: Instant) {
    info!("{} finished in {:.1}s", what, started.elapsed().as_secs_f64());
}
