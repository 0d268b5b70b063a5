//! Helpers for running collaborator processes with timeouts and bounded output.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Fail on timeout or non-zero exit, naming `label` in the error.
    pub fn ensure_success(&self, label: &str, timeout: Duration) -> Result<()> {
        if self.timed_out {
            return Err(anyhow!("{label} timed out after {timeout:?}"));
        }
        if !self.status.success() {
            let stderr = self.stderr_text();
            return Err(anyhow!(
                "{label} failed with status {:?}: {}",
                self.status.code(),
                stderr.trim()
            ));
        }
        Ok(())
    }
}

/// How long to keep draining output after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Stdin is written and output is read on helper threads, so the deadline covers the whole
/// call. On Unix the child leads its own process group and a timeout kills the group. Output
/// pipes still held open after that by escaped descendants are abandoned after a short grace.
/// `output_limit_bytes` bounds the amount of stdout/stderr stored in memory (bytes beyond this
/// are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let deadline = Instant::now() + timeout;
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout = StreamCapture::spawn(stdout, output_limit_bytes);
    let stderr = StreamCapture::spawn(stderr, output_limit_bytes);

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let input = input.to_vec();
        // Detached: a killed child closes the pipe and the write fails.
        thread::spawn(move || {
            if let Err(e) = child_stdin.write_all(&input) {
                debug!(err = %e, "child closed stdin early");
            }
        });
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_tree(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    let drain = deadline
        .saturating_duration_since(Instant::now())
        .max(DRAIN_GRACE);
    let (stdout, stdout_truncated) = stdout.finish(drain).context("collect stdout")?;
    let (stderr, stderr_truncated) = stderr.finish(DRAIN_GRACE).context("collect stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Kill the child and, on Unix, every process in its group.
fn kill_tree(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let group = Pid::from_raw(child.id() as i32);
        match killpg(group, Signal::SIGKILL) {
            Ok(()) => return Ok(()),
            Err(e) => warn!(err = %e, "failed to kill process group, killing child only"),
        }
    }
    child.kill().context("kill command")
}

#[derive(Debug, Default)]
struct Captured {
    buf: Vec<u8>,
    truncated: usize,
}

/// Output collected by a reader thread, readable even if the pipe never closes.
struct StreamCapture {
    captured: Arc<Mutex<Captured>>,
    done: Receiver<Result<()>>,
}

impl StreamCapture {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&captured);
        thread::spawn(move || {
            // The receiver may be gone after a timeout; nothing to report then.
            let _ = tx.send(read_stream_limited(reader, limit, &sink));
        });
        Self { captured, done }
    }

    /// Wait up to `wait` for end of stream, then take whatever was read.
    fn finish(self, wait: Duration) -> Result<(Vec<u8>, usize)> {
        match self.done.recv_timeout(wait) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                warn!("output pipe still open after child exit, abandoning reader");
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("output reader thread panicked"));
            }
        }
        let mut guard = self
            .captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let captured = std::mem::take(&mut *guard);
        Ok((captured.buf, captured.truncated))
    }
}

fn read_stream_limited<R: Read>(
    mut reader: R,
    limit: usize,
    captured: &Mutex<Captured>,
) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut out = captured.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = limit.saturating_sub(out.buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            out.buf.extend_from_slice(&chunk[..keep]);
            out.truncated += n.saturating_sub(keep);
        } else {
            out.truncated += n;
        }
    }

    Ok(())
}
