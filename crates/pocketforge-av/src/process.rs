//! Spawning and supervising the encoder process.
//!
//! [`EncoderBackend`] is the seam between the orchestrator and the OS: the
//! real [`FfmpegBackend`] spawns ffmpeg through [`EncoderCommand`], tests
//! substitute scripted fakes.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::progress::split_lines;
use crate::tools::{locate_encoder, ToolsConfig};
use crate::{Error, Result};

/// Buffered output lines per process before readers apply backpressure.
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Read size for the stdout/stderr pipes.
const READ_CHUNK: usize = 4096;

/// A running encoder process.
#[async_trait]
pub trait EncoderProcess: Send {
    /// Next line of combined stdout/stderr output, `None` once both streams
    /// are closed. Cancel-safe.
    async fn next_line(&mut self) -> Option<String>;

    /// Wait for the process to exit. Returns the exit code, or `None` if it
    /// was terminated by a signal. Cancel-safe.
    async fn wait(&mut self) -> Result<Option<i32>>;

    /// Terminate the process and wait until it is gone.
    async fn kill(&mut self) -> Result<()>;
}

/// Factory for encoder processes.
#[async_trait]
pub trait EncoderBackend: Send + Sync {
    /// Resolve the encoder executable.
    fn locate(&self) -> Result<PathBuf>;

    /// Start the encoder with the given arguments.
    async fn spawn(&self, program: &Path, args: &[String]) -> Result<Box<dyn EncoderProcess>>;
}

/// Backend running the real ffmpeg binary.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    tools: ToolsConfig,
}

impl FfmpegBackend {
    /// Create a backend using the given lookup configuration.
    pub fn new(tools: ToolsConfig) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl EncoderBackend for FfmpegBackend {
    fn locate(&self) -> Result<PathBuf> {
        locate_encoder(&self.tools)
    }

    async fn spawn(&self, program: &Path, args: &[String]) -> Result<Box<dyn EncoderProcess>> {
        let process = EncoderCommand::new(program.to_path_buf())
            .args(args.iter().cloned())
            .spawn()?;
        Ok(Box::new(process))
    }
}

/// A builder for launching an external tool with streamed output.
///
/// # Example
///
/// ```no_run
/// use pocketforge_av::{EncoderCommand, EncoderProcess};
/// use std::path::PathBuf;
///
/// # async fn example() -> pocketforge_av::Result<()> {
/// let mut process = EncoderCommand::new(PathBuf::from("ffmpeg"))
///     .arg("-version")
///     .spawn()?;
/// while let Some(line) = process.next_line().await {
///     println!("{line}");
/// }
/// let code = process.wait().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EncoderCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl EncoderCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Spawn the process with both output pipes merged into one line stream.
    ///
    /// The child is killed if the returned handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpawnFailed`] if the OS refuses to start the process.
    pub fn spawn(&self) -> Result<SpawnedProcess> {
        let program_name = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn_failed(program_name.clone(), e))?;

        tracing::debug!(tool = %program_name, pid = ?child.id(), "Spawned encoder process");

        let (tx, lines) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, tx)));
        }

        Ok(SpawnedProcess {
            tool: program_name,
            child,
            lines,
            readers,
        })
    }
}

/// Handle to a process started by [`EncoderCommand::spawn`].
#[derive(Debug)]
pub struct SpawnedProcess {
    tool: String,
    child: Child,
    lines: mpsc::Receiver<String>,
    readers: Vec<JoinHandle<()>>,
}

impl SpawnedProcess {
    async fn join_readers(&mut self) {
        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }
    }
}

#[async_trait]
impl EncoderProcess for SpawnedProcess {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        self.join_readers().await;
        Ok(status.code())
    }

    async fn kill(&mut self) -> Result<()> {
        tracing::debug!(tool = %self.tool, pid = ?self.child.id(), "Killing encoder process");
        self.child.kill().await?;
        // A grandchild may still hold the pipes open; don't wait on EOF.
        for reader in self.readers.drain(..) {
            reader.abort();
            let _ = reader.await;
        }
        Ok(())
    }
}

/// Read `reader` to EOF, sending each complete line.
async fn forward_lines<R>(mut reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut partial = Vec::new();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in split_lines(&mut partial, &buf[..n]) {
                    if tx.send(line).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Error reading encoder output: {e}");
                break;
            }
        }
    }

    if !partial.is_empty() {
        let _ = tx
            .send(String::from_utf8_lossy(&partial).into_owned())
            .await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> EncoderCommand {
        let mut cmd = EncoderCommand::new(PathBuf::from("sh"));
        cmd.args(["-c", script]);
        cmd
    }

    #[tokio::test]
    async fn streams_both_pipes() {
        let mut process = sh("echo out-line; echo err-line 1>&2").spawn().unwrap();

        let mut lines = Vec::new();
        while let Some(line) = process.next_line().await {
            lines.push(line);
        }
        lines.sort();

        assert_eq!(lines, vec!["err-line".to_string(), "out-line".to_string()]);
        assert_eq!(process.wait().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn reports_exit_code() {
        let mut process = sh("exit 3").spawn().unwrap();
        while process.next_line().await.is_some() {}
        assert_eq!(process.wait().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn unterminated_last_line_is_delivered() {
        let mut process = sh("printf 'no newline'").spawn().unwrap();
        assert_eq!(process.next_line().await.as_deref(), Some("no newline"));
        assert_eq!(process.next_line().await, None);
    }

    #[tokio::test]
    async fn kill_terminates_long_running_process() {
        let mut process = sh("exec sleep 30").spawn().unwrap();

        tokio::time::timeout(Duration::from_secs(5), process.kill())
            .await
            .expect("kill should not hang")
            .unwrap();

        assert_eq!(process.next_line().await, None);
    }

    #[tokio::test]
    async fn spawn_nonexistent_tool() {
        let result = EncoderCommand::new(PathBuf::from("nonexistent_tool_xyz_12345")).spawn();
        assert!(matches!(result, Err(Error::SpawnFailed { .. })));
    }

    #[tokio::test]
    async fn backend_spawns_through_trait() {
        let backend = FfmpegBackend::default();
        let mut process = backend
            .spawn(
                Path::new("sh"),
                &["-c".to_string(), "echo hello".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(process.next_line().await.as_deref(), Some("hello"));
        assert_eq!(process.wait().await.unwrap(), Some(0));
    }
}
