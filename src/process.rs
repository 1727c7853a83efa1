use crate::error::ExecError;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Build a shell invocation for `command_line`, rooted in `workdir` when given.
///
/// On unix the shell leads its own process group, so [`kill_group`] reaches
/// everything it forks. Children are also killed when their handle is dropped.
pub(crate) fn shell(command_line: &str, workdir: Option<&Path>) -> Command {
    #[cfg(windows)]
    let mut process = {
        let mut process = Command::new("cmd");
        process.arg("/C").arg(command_line);
        process
    };
    #[cfg(not(windows))]
    let mut process = {
        let mut process = Command::new("sh");
        process.arg("-c").arg(command_line);
        process
    };

    if let Some(dir) = workdir {
        process.current_dir(dir);
    }
    #[cfg(unix)]
    process.process_group(0);
    process.kill_on_drop(true);
    process
}

/// Send SIGKILL to the process group led by `pid`. A group that is already
/// gone is not an error.
#[cfg(unix)]
pub(crate) fn kill_group(pid: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).map_err(io::Error::other)?;
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_group(_pid: u32) -> io::Result<()> {
    Ok(())
}

/// Kill `child` and everything it started, then reap it.
pub(crate) async fn terminate(child: &mut Child) -> io::Result<()> {
    if let Some(pid) = child.id() {
        kill_group(pid)?;
    }
    child.kill().await
}

/// Read a pipe to end of stream. A missing pipe reads as empty.
pub(crate) async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

/// A command running live with its stdin and stdout held by the engine.
///
/// stderr is collected on a background task so a chatty child cannot block
/// on a full stderr pipe while the engine waits for stdout.
pub(crate) struct LiveProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    stderr: JoinHandle<io::Result<Vec<u8>>>,
}

impl LiveProcess {
    pub fn spawn(command_line: &str, workdir: Option<&Path>) -> Result<Self, ExecError> {
        let mut child = shell(command_line, workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: command_line.to_string(),
                source,
            })?;

        let pipe_unavailable = |pipe| ExecError::PipeUnavailable {
            command: command_line.to_string(),
            pipe,
        };
        let stdin = child.stdin.take().ok_or_else(|| pipe_unavailable("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| pipe_unavailable("stdout"))?;
        let stderr = tokio::spawn(read_all(child.stderr.take()));

        Ok(LiveProcess {
            child,
            stdin: Some(stdin),
            stdout,
            stderr,
        })
    }

    /// Write data to the program's stdin and flush it.
    pub async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin already closed"))?;
        stdin.write_all(data).await?;
        stdin.flush().await
    }

    /// Close stdin so the program sees end of input.
    pub fn close_input(&mut self) {
        self.stdin.take();
    }

    /// Read whatever stdout has available, up to `buffer.len()` bytes.
    /// Returns 0 at end of stream.
    pub async fn read_chunk(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buffer).await
    }

    /// Wait for the program to exit and return its status and stderr.
    pub async fn wait(mut self) -> io::Result<(ExitStatus, Vec<u8>)> {
        self.close_input();
        let status = self.child.wait().await?;
        let stderr = (&mut self.stderr).await.map_err(io::Error::other)??;
        Ok((status, stderr))
    }
}

impl Drop for LiveProcess {
    fn drop(&mut self) {
        // Only set while the shell has not been reaped, i.e. the run was
        // abandoned before `wait`.
        if let Some(pid) = self.child.id() {
            if let Err(err) = kill_group(pid) {
                tracing::warn!(pid, error = %err, "failed to kill abandoned process group");
            }
        }
        self.stderr.abort();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_and_read_back() {
        let mut process = LiveProcess::spawn("head -n 1", None).unwrap();
        process.send(b"ping\n").await.unwrap();

        let mut buffer = [0u8; 16];
        let n = process.read_chunk(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..n], b"ping\n");

        let (status, stderr) = process.wait().await.unwrap();
        assert!(status.success());
        assert!(stderr.is_empty());
    }

    #[tokio::test]
    async fn test_stderr_is_collected() {
        let process = LiveProcess::spawn("echo oops >&2; exit 3", None).unwrap();
        let (status, stderr) = process.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
        assert_eq!(stderr, b"oops\n");
    }

    #[tokio::test]
    async fn test_runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let mut process = LiveProcess::spawn("cat marker.txt", Some(dir.path())).unwrap();
        let mut buffer = [0u8; 16];
        let n = process.read_chunk(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..n], b"here");
        assert!(process.wait().await.unwrap().0.success());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let mut process = LiveProcess::spawn("cat", None).unwrap();
        process.close_input();
        let err = process.send(b"late\n").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(process.wait().await.unwrap().0.success());
    }

    #[tokio::test]
    async fn test_dropping_abandons_whole_group() {
        let dir = tempfile::tempdir().unwrap();
        let process =
            LiveProcess::spawn("(sleep 0.3; touch survived) & wait", Some(dir.path())).unwrap();
        drop(process);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(!dir.path().join("survived").exists());
    }

    #[tokio::test]
    async fn test_terminate_reaps_child() {
        let mut child = shell("sleep 30 & sleep 30", None).spawn().unwrap();
        terminate(&mut child).await.unwrap();
        assert!(child.id().is_none());
        assert!(child.try_wait().unwrap().is_some());
    }
}
