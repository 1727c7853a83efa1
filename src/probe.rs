//! Probe runs: execute a command once with a fixed stdin payload and capture
//! its stdout within a time budget.

use crate::error::ProbeError;
use crate::process::{read_all, shell, terminate};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Child;

/// Outcome of one probe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The command exited within the time budget.
    Completed {
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        exit_code: Option<i32>,
    },
    /// The command was still running when the budget ran out and was killed.
    TimedOut,
}

impl ProbeResult {
    pub fn timed_out(&self) -> bool {
        matches!(self, ProbeResult::TimedOut)
    }

    /// Number of stdout bytes captured, or `None` after a timeout.
    pub fn stdout_len(&self) -> Option<usize> {
        match self {
            ProbeResult::Completed { stdout, .. } => Some(stdout.len()),
            ProbeResult::TimedOut => None,
        }
    }
}

/// Something that can run a command once with a given stdin payload.
///
/// [`ShellProbe`] is the real implementation. Every call must start from a
/// fresh process: output sizes are sampled independently per prefix.
#[async_trait(?Send)]
pub trait Probe {
    /// Run `command_line` with `stdin` (or a null stdin for `None`), giving up
    /// after `timeout`.
    async fn run(
        &self,
        command_line: &str,
        stdin: Option<&str>,
        timeout: Duration,
    ) -> Result<ProbeResult, ProbeError>;
}

/// Runs probes through the platform shell.
#[derive(Debug, Clone, Default)]
pub struct ShellProbe {
    workdir: Option<PathBuf>,
}

impl ShellProbe {
    /// Probe in the current working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe with every command rooted in `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: Some(dir.into()),
        }
    }
}

#[async_trait(?Send)]
impl Probe for ShellProbe {
    async fn run(
        &self,
        command_line: &str,
        stdin: Option<&str>,
        timeout: Duration,
    ) -> Result<ProbeResult, ProbeError> {
        let started = Instant::now();
        let mut child = shell(command_line, self.workdir.as_deref())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                command: command_line.to_string(),
                source,
            })?;

        // Feed stdin from its own task: a child that never reads must not
        // block the timeout below on a full pipe.
        let writer = match (stdin, child.stdin.take()) {
            (Some(payload), Some(mut pipe)) => {
                let payload = payload.as_bytes().to_vec();
                Some(tokio::spawn(async move {
                    // The child may exit without reading everything; that is
                    // its business, not a probe failure.
                    let _ = pipe.write_all(&payload).await;
                }))
            }
            _ => None,
        };

        let outcome = tokio::time::timeout(timeout, collect(&mut child)).await;
        if let Some(writer) = writer {
            writer.abort();
        }

        match outcome {
            Ok(Ok((stdout, stderr, exit_code))) => {
                tracing::debug!(
                    command = command_line,
                    stdout_bytes = stdout.len(),
                    ?exit_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "probe completed"
                );
                Ok(ProbeResult::Completed {
                    stdout,
                    stderr,
                    exit_code,
                })
            }
            Ok(Err(source)) => Err(ProbeError::Io {
                command: command_line.to_string(),
                source,
            }),
            Err(_) => {
                if let Err(err) = terminate(&mut child).await {
                    tracing::warn!(command = command_line, error = %err, "failed to kill timed-out probe");
                }
                tracing::debug!(
                    command = command_line,
                    timeout_ms = timeout.as_millis() as u64,
                    "probe timed out"
                );
                Ok(ProbeResult::TimedOut)
            }
        }
    }
}

/// Read stdout and stderr to end of stream and wait for exit.
async fn collect(child: &mut Child) -> std::io::Result<(Vec<u8>, Vec<u8>, Option<i32>)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (stdout, stderr) = tokio::try_join!(read_all(stdout), read_all(stderr))?;
    let status = child.wait().await?;
    Ok((stdout, stderr, status.code()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let result = ShellProbe::new()
            .run("echo hello; exit 2", None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(
            result,
            ProbeResult::Completed {
                stdout: b"hello\n".to_vec(),
                stderr: Vec::new(),
                exit_code: Some(2),
            }
        );
    }

    #[tokio::test]
    async fn test_feeds_stdin_payload() {
        let result = ShellProbe::new()
            .run("cat", Some("a\nb\n"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.stdout_len(), Some(4));
    }

    #[tokio::test]
    async fn test_no_stdin_reads_eof() {
        let result = ShellProbe::new()
            .run("cat", None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.stdout_len(), Some(0));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let started = Instant::now();
        let result = ShellProbe::new()
            .run("sleep 30", None, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(result.timed_out());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timeout_kills_background_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let result = ShellProbe::in_dir(dir.path())
            .run("(sleep 0.3; touch survived) & wait", None, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(result.timed_out());

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(
            !dir.path().join("survived").exists(),
            "a descendant of the timed-out command kept running"
        );
    }

    #[tokio::test]
    async fn test_child_ignoring_large_stdin_still_times_out() {
        let payload = "x".repeat(1 << 20);
        let result = ShellProbe::new()
            .run("sleep 30", Some(&payload), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(result.timed_out());
    }

    #[tokio::test]
    async fn test_probe_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), "12345").unwrap();
        let result = ShellProbe::in_dir(dir.path())
            .run("cat data.txt", None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.stdout_len(), Some(5));
    }
}
