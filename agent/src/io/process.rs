//! Child process execution with a timeout and bounded output capture.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long the output readers may keep draining once the child has exited.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    /// A leftover process kept the pipes open; whatever was still unread is lost.
    pub capture_abandoned: bool,
}

impl CommandOutput {
    /// Stdout then stderr as text, with truncation notices where bytes were dropped.
    pub fn combined(&self) -> String {
        let mut buf = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            buf.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        buf.push_str(&String::from_utf8_lossy(&self.stderr));
        if self.stderr_truncated > 0 {
            buf.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        if self.capture_abandoned {
            buf.push_str("\n[output capture abandoned: pipes held open by a leftover process]\n");
        }
        buf
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

type StreamResult = (Stream, Result<(Vec<u8>, usize)>);

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// On unix the child leads its own process group; on timeout the whole group is killed and
/// `timed_out` is set. Processes that outlive the child and keep its pipes open are killed
/// after a short grace period, so the call never blocks much past `timeout`.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };
    let pid = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (tx, rx) = mpsc::channel();
    spawn_reader(stdout, Stream::Stdout, output_limit_bytes, tx.clone());
    spawn_reader(stderr, Stream::Stderr, output_limit_bytes, tx);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing process group"
            );
            timed_out = true;
            kill_process_group(pid);
            if let Err(err) = child.kill() {
                debug!(err = %err, "kill command after group kill");
            }
            child.wait().context("wait command after kill")?
        }
    };

    let mut collected = Collected::default();
    if !collected.drain(&rx, READER_GRACE)? {
        warn!("output pipes still open after exit, killing leftover processes");
        kill_process_group(pid);
        if !collected.drain(&rx, READER_GRACE)? {
            warn!("abandoning output readers");
        }
    }
    let capture_abandoned = !collected.is_complete();
    let (stdout, stdout_truncated) = collected.stdout.unwrap_or_default();
    let (stderr, stderr_truncated) = collected.stderr.unwrap_or_default();

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, capture_abandoned, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        capture_abandoned,
    })
}

#[derive(Default)]
struct Collected {
    stdout: Option<(Vec<u8>, usize)>,
    stderr: Option<(Vec<u8>, usize)>,
}

impl Collected {
    fn is_complete(&self) -> bool {
        self.stdout.is_some() && self.stderr.is_some()
    }

    /// Receive reader results for up to `grace`. Returns whether both streams finished.
    fn drain(&mut self, rx: &Receiver<StreamResult>, grace: Duration) -> Result<bool> {
        let deadline = Instant::now() + grace;
        while !self.is_complete() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((Stream::Stdout, result)) => {
                    self.stdout = Some(result.context("read stdout")?);
                }
                Ok((Stream::Stderr, result)) => {
                    self.stderr = Some(result.context("read stderr")?);
                }
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("output reader thread panicked"));
                }
            }
        }
        Ok(true)
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    stream: Stream,
    limit: usize,
    tx: Sender<StreamResult>,
) {
    thread::spawn(move || {
        let result = read_stream_limited(reader, limit);
        // The receiver is gone once the caller abandoned capture.
        let _ = tx.send((stream, result));
    });
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!(err = %err, "kill process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
