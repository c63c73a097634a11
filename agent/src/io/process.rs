//! Child processes with a deadline and capped output capture.

use std::fmt::Write as _;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

const READ_CHUNK: usize = 8 * 1024;
/// How long the readers may keep draining once the child is reaped.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

type CaptureResult = Receiver<Result<CapturedStream>>;

/// Bytes kept from one output stream, plus how many were discarded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CapturedStream {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

impl CapturedStream {
    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "--- {name} ---");
        out.push_str(&String::from_utf8_lossy(&self.bytes));
        if self.dropped > 0 {
            let _ = write!(out, "\n[{name}: {} bytes dropped]", self.dropped);
        }
        out.push('\n');
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: CapturedStream,
    pub stderr: CapturedStream,
    /// The child was killed at the deadline.
    pub timed_out: bool,
}

impl CommandOutput {
    /// Both streams as text, for executor logs.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        self.stdout.render("stdout", &mut out);
        self.stderr.render("stderr", &mut out);
        if self.timed_out {
            out.push_str("[killed at deadline]\n");
        }
        out
    }
}

/// Spawn `cmd`, write `stdin` to it, and wait at most `timeout`.
///
/// Both pipes are drained on their own threads while the child runs. Each
/// stream keeps its first `output_limit_bytes` bytes. A descendant that
/// outlives the child can hold the pipes open; such a stream is abandoned
/// after a short grace period so the deadline still holds.
#[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64, output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    debug!(pid = child.id(), "child spawned");

    let stdout_reader = spawn_capture(child.stdout.take(), output_limit_bytes, "stdout")?;
    let stderr_reader = spawn_capture(child.stderr.take(), output_limit_bytes, "stderr")?;

    if let Some(input) = stdin {
        feed_stdin(&mut child, input)?;
    }

    let (status, timed_out) = wait_or_kill(&mut child, timeout)?;
    let drain_until = Instant::now() + DRAIN_GRACE;
    let stdout = collect(&stdout_reader, drain_until, "stdout")?;
    let stderr = collect(&stderr_reader, drain_until, "stderr")?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "child output capped"
        );
    }

    debug!(exit_code = ?status.code(), timed_out, "child finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn spawn_capture<R: Read + Send + 'static>(
    pipe: Option<R>,
    limit: usize,
    name: &str,
) -> Result<CaptureResult> {
    let pipe = pipe.ok_or_else(|| anyhow!("{name} was not piped"))?;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone only if the stream was abandoned.
        let _ = tx.send(capture(pipe, limit));
    });
    Ok(rx)
}

/// Write all of `input` and close the pipe.
fn feed_stdin(child: &mut Child, input: &[u8]) -> Result<()> {
    let mut pipe = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    // A child may exit without reading; its exit status is the real signal.
    if let Err(err) = pipe.write_all(input) {
        warn!(err = %err, "child stdin closed early");
    }
    Ok(())
}

fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for child")? {
        return Ok((status, false));
    }
    warn!(timeout_ms = timeout.as_millis() as u64, "deadline reached, killing child");
    child.kill().context("kill child")?;
    let status = child.wait().context("reap killed child")?;
    Ok((status, true))
}

fn collect(reader: &CaptureResult, until: Instant, name: &str) -> Result<CapturedStream> {
    match reader.recv_timeout(until.saturating_duration_since(Instant::now())) {
        Ok(captured) => captured.with_context(|| format!("collect {name}")),
        Err(RecvTimeoutError::Timeout) => {
            warn!(stream = name, "pipe held open past child exit, output abandoned");
            Ok(CapturedStream::default())
        }
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("{name} capture thread panicked")),
    }
}

/// Read to EOF, keeping at most `limit` bytes.
fn capture<R: Read>(mut reader: R, limit: usize) -> Result<CapturedStream> {
    let mut captured = CapturedStream::default();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let read = reader.read(&mut chunk).context("read child output")?;
        if read == 0 {
            return Ok(captured);
        }
        let keep = read.min(limit.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.dropped += read - keep;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn echoes_stdin_to_stdout() {
        let output =
            run_command_with_timeout(sh("cat"), Some(b"prompt"), Duration::from_secs(5), 1024)
                .expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout.bytes, b"prompt");
        assert!(!output.timed_out);
    }

    #[test]
    fn caps_each_stream() {
        let output = run_command_with_timeout(
            sh("printf 'abcdefghij'; printf 'xy' >&2"),
            None,
            Duration::from_secs(5),
            4,
        )
        .expect("run");
        assert_eq!(output.stdout.bytes, b"abcd");
        assert_eq!(output.stdout.dropped, 6);
        assert_eq!(output.stderr.bytes, b"xy");
        assert!(output.transcript().contains("[stdout: 6 bytes dropped]"));
    }

    #[test]
    fn kills_at_deadline() {
        let output =
            run_command_with_timeout(sh("exec sleep 5"), None, Duration::from_millis(100), 1024)
                .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
        assert!(output.transcript().contains("[killed at deadline]"));
    }

    #[test]
    fn deadline_holds_when_a_grandchild_keeps_the_pipes() {
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 5; true"),
            None,
            Duration::from_millis(100),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn background_descendant_does_not_block_a_clean_exit() {
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 5 &"),
            None,
            Duration::from_secs(5),
            1024,
        )
        .expect("run");
        assert!(output.status.success());
        assert!(!output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
