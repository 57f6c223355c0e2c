//! In-process execution host: child processes feeding a capped output buffer.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;

use super::{BufferSnapshot, ExecutionBackend, RunOutcome};
use crate::buffer::OutputBuffer;
use crate::error::BackendError;

const STDERR_OPEN: &str = "\x1b[31m";
const STDERR_CLOSE: &str = "\x1b[0m";

/// The process currently attached to the buffer.
struct Running {
    id: u64,
    pid: Option<u32>,
    kill_tx: oneshot::Sender<()>,
}

pub struct LocalBackend {
    buffer: Arc<Mutex<OutputBuffer>>,
    running: Arc<Mutex<Option<Running>>>,
    next_id: AtomicU64,
    python: String,
    temp_dir: PathBuf,
}

impl LocalBackend {
    pub fn new(python_executable: impl Into<String>, max_buffer_chars: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(OutputBuffer::new(max_buffer_chars))),
            running: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            python: python_executable.into(),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Directory for `run_code` snippets.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    fn append(&self, text: &str) {
        self.buffer.lock().append(text);
    }

    /// Spawn `cmd`, replacing whatever was running. `cleanup` is removed once
    /// the process has exited.
    fn start(&self, mut cmd: Command, cleanup: Option<PathBuf>) -> Result<RunOutcome, BackendError> {
        if let Some(previous) = self.running.lock().take() {
            tracing::debug!(pid = ?previous.pid, "killing previous process");
            let _ = previous.kill_tx.send(());
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let msg = format!("Error executing command: {e}");
                self.append(&msg);
                if let Some(path) = cleanup {
                    let _ = std::fs::remove_file(path);
                }
                return Err(BackendError::Rejected(msg));
            }
        };

        let pid = child.id();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (kill_tx, kill_rx) = oneshot::channel();
        *self.running.lock() = Some(Running { id, pid, kill_tx });
        tracing::info!(?pid, "process started");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let buffer = self.buffer.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            let out_pump = stdout.map(|s| tokio::spawn(pump(s, buffer.clone(), false)));
            let err_pump = stderr.map(|s| tokio::spawn(pump(s, buffer.clone(), true)));

            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };

            // Drain remaining output before the exit line
            for pump in [out_pump, err_pump].into_iter().flatten() {
                let _ = pump.await;
            }

            match status {
                Ok(status) => {
                    let code = exit_code(&status);
                    tracing::info!(?pid, code, "process exited");
                    buffer
                        .lock()
                        .append(&format!("\nProcess exited with code {code}\n"));
                }
                Err(e) => {
                    tracing::warn!(?pid, error = %e, "failed to wait for process");
                    buffer
                        .lock()
                        .append(&format!("\nError in output processing: {e}\n"));
                }
            }

            {
                let mut slot = running.lock();
                if slot.as_ref().is_some_and(|r| r.id == id) {
                    *slot = None;
                }
            }

            if let Some(path) = cleanup
                && let Err(e) = tokio::fs::remove_file(&path).await
            {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove snippet file");
            }
        });

        Ok(RunOutcome { pid })
    }
}

/// Copy a child stream into the buffer line by line. Stderr lines are wrapped
/// in the error colour.
async fn pump<R: AsyncRead + Unpin>(stream: R, buffer: Arc<Mutex<OutputBuffer>>, is_stderr: bool) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let mut buf = buffer.lock();
                if is_stderr {
                    buf.append(&format!("{STDERR_OPEN}{text}{STDERR_CLOSE}"));
                } else {
                    buf.append(&text);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "output stream closed");
                break;
            }
        }
    }
}

/// Exit code, or the negated signal number for signal deaths.
fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    async fn run_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
    ) -> Result<RunOutcome, BackendError> {
        let mut cmd = shell_command(command);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        self.start(cmd, None)
    }

    async fn run_file(
        &self,
        path: &str,
        working_dir: Option<&str>,
    ) -> Result<RunOutcome, BackendError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            let msg = format!("File not found: {path}");
            self.append(&msg);
            return Err(BackendError::Rejected(msg));
        }
        // Absolute so the path survives the switch to the file's directory
        let absolute = std::path::absolute(path)?;
        let mut cmd = Command::new(&self.python);
        cmd.arg(&absolute);
        match working_dir {
            Some(dir) => {
                cmd.current_dir(dir);
            }
            None => {
                if let Some(parent) = absolute.parent() {
                    cmd.current_dir(parent);
                }
            }
        }
        self.start(cmd, None)
    }

    async fn run_code(
        &self,
        code: &str,
        working_dir: Option<&str>,
    ) -> Result<RunOutcome, BackendError> {
        let snippet = self.temp_dir.join(format!("snippet_{}.py", uuid::Uuid::new_v4()));
        tokio::fs::write(&snippet, code).await?;
        let mut cmd = Command::new(&self.python);
        cmd.arg(&snippet);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        self.start(cmd, Some(snippet))
    }

    async fn fetch_buffer(&self) -> Result<BufferSnapshot, BackendError> {
        Ok(BufferSnapshot {
            status: "success".to_string(),
            buffer: self.buffer.lock().snapshot(),
        })
    }

    async fn clear(&self) -> Result<(), BackendError> {
        self.buffer.lock().clear();
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> Result<bool, BackendError> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn kill(&self) -> Result<bool, BackendError> {
        let Some(running) = self.running.lock().take() else {
            return Ok(false);
        };
        tracing::info!(pid = ?running.pid, "terminating process on request");
        let _ = running.kill_tx.send(());
        self.append("\nProcess terminated by user\n");
        Ok(true)
    }
}
