//! Standard stream plumbing: pipes or pty slave, drain and feed tasks
//!
//! Drain tasks run from the moment the pipes exist, so a child writing more
//! than the OS pipe buffer never blocks on a reader that is not there yet.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::Stdio;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::termios::{tcgetattr, SpecialCharacterIndices};
use nix::unistd::pipe2;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{Feeder, PtyMode};
use crate::error::StartError;

const READ_CHUNK: usize = 8192;

/// Terminal end-of-input character when the slave does not report one
const DEFAULT_VEOF: u8 = 0x04;

/// Process-facing ends, handed to the OS process builder
pub(crate) struct ChildStdio {
    pub(crate) stdin: OwnedFd,
    pub(crate) stdout: OwnedFd,
    pub(crate) stderr: OwnedFd,
}

impl ChildStdio {
    /// Convert into `(stdin, stdout, stderr)` for the process builder
    pub(crate) fn into_stdio(self) -> (Stdio, Stdio, Stdio) {
        (
            Stdio::from(self.stdin),
            Stdio::from(self.stdout),
            Stdio::from(self.stderr),
        )
    }
}

/// Captured output bytes, complete once every drain has been joined
#[derive(Debug, Default)]
pub(crate) struct Captured {
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
}

/// Caller-facing stream state of one execution
pub(crate) struct Pipes {
    slave: Option<OwnedFd>,
    master: Option<OwnedFd>,
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    discard: Option<JoinHandle<Vec<u8>>>,
    feed: Option<JoinHandle<()>>,
    stop: CancellationToken,
    wait_delay: Duration,
}

impl Pipes {
    /// Allocate the three streams and start drain/feed tasks
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn open(
        mode: PtyMode,
        feeders: &[Feeder],
        wait_delay: Duration,
    ) -> Result<(Self, ChildStdio), StartError> {
        let (master, slave) = if mode.any() {
            let (master, slave) = proctor_pty::open()?.into_parts();
            fcntl(master.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
                .map_err(|errno| StartError::Pipes(errno.into()))?;
            (Some(master), Some(slave))
        } else {
            (None, None)
        };

        let (stdin_child, stdin_sink) = match &slave {
            Some(slave) if mode.stdin => (dup(slave)?, None),
            _ => {
                let (reader, writer) = os_pipe()?;
                (reader, Some(writer))
            }
        };
        let (stdout_child, stdout_source) = match &slave {
            Some(slave) if mode.stdout => (dup(slave)?, None),
            _ => {
                let (reader, writer) = os_pipe()?;
                (writer, Some(reader))
            }
        };
        let (stderr_child, stderr_source) = match &slave {
            Some(slave) if mode.stderr => (dup(slave)?, None),
            _ => {
                let (reader, writer) = os_pipe()?;
                (writer, Some(reader))
            }
        };

        let stop = CancellationToken::new();
        let mut pipes = Self {
            slave,
            master: None,
            stdout: None,
            stderr: None,
            discard: None,
            feed: None,
            stop: stop.clone(),
            wait_delay,
        };

        if let Some(reader) = stdout_source {
            pipes.stdout = Some(spawn_drain(pipe_reader(reader)?, "stdout", &stop));
        }
        if let Some(reader) = stderr_source {
            pipes.stderr = Some(spawn_drain(pipe_reader(reader)?, "stderr", &stop));
        }

        if let Some(master) = master {
            // One master serves every pty-backed stream; with both stdout and
            // stderr on the pty their output is interleaved into stdout.
            let reader = pty_reader(&master)?;
            if mode.stdout {
                pipes.stdout = Some(spawn_drain(reader, "pty", &stop));
            } else if mode.stderr {
                pipes.stderr = Some(spawn_drain(reader, "pty", &stop));
            } else {
                pipes.discard = Some(spawn_drain(reader, "pty", &stop));
            }

            if mode.stdin {
                // Closing our handle does not end a terminal's input, so the
                // feed finishes with the end-of-input character instead.
                let eof = pipes.slave.as_ref().map_or(DEFAULT_VEOF, end_of_input);
                let sink = pty_writer(&master)?;
                pipes.feed = Some(spawn_feed(sink, feeders.to_vec(), Some(eof), &stop));
            }
            pipes.master = Some(master);
        }

        if let Some(writer) = stdin_sink {
            if feeders.is_empty() {
                // No feeder: closing right away gives the child an immediate EOF.
                drop(writer);
            } else {
                let sink =
                    pipe::Sender::from_file(File::from(writer)).map_err(StartError::Pipes)?;
                pipes.feed = Some(spawn_feed(sink, feeders.to_vec(), None, &stop));
            }
        }

        let stdio = ChildStdio {
            stdin: stdin_child,
            stdout: stdout_child,
            stderr: stderr_child,
        };

        Ok((pipes, stdio))
    }

    /// Close process-facing ends, join every task, close caller-facing ends
    ///
    /// Call once the process has exited: tasks still running after the wait
    /// delay are stopped and keep what they read so far.
    pub(crate) async fn finalize(mut self) -> Captured {
        drop(self.slave.take());

        let stop = self.stop.clone();
        let delay = self.wait_delay;
        let expiry = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            stop.cancel();
        });

        let stdout = join(self.stdout.take(), "stdout").await;
        let stderr = join(self.stderr.take(), "stderr").await;
        join(self.discard.take(), "pty").await;
        if let Some(feed) = self.feed.take() {
            if let Err(e) = feed.await {
                warn!(error = %e, "Stdin feed task failed");
            }
        }
        expiry.abort();

        drop(self.master.take());

        Captured { stdout, stderr }
    }
}

impl Drop for Pipes {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn os_pipe() -> Result<(OwnedFd, OwnedFd), StartError> {
    pipe2(OFlag::O_CLOEXEC).map_err(|errno| StartError::Pipes(errno.into()))
}

fn dup(fd: &OwnedFd) -> Result<OwnedFd, StartError> {
    fd.try_clone().map_err(StartError::Pipes)
}

fn pipe_reader(fd: OwnedFd) -> Result<pipe::Receiver, StartError> {
    pipe::Receiver::from_file(File::from(fd)).map_err(StartError::Pipes)
}

// The pty master is not a FIFO, hence the unchecked constructors; it was
// switched to non-blocking mode right after allocation.
fn pty_reader(master: &OwnedFd) -> Result<pipe::Receiver, StartError> {
    pipe::Receiver::from_file_unchecked(File::from(dup(master)?)).map_err(StartError::Pipes)
}

fn pty_writer(master: &OwnedFd) -> Result<pipe::Sender, StartError> {
    pipe::Sender::from_file_unchecked(File::from(dup(master)?)).map_err(StartError::Pipes)
}

fn spawn_drain<R>(reader: R, stream: &'static str, stop: &CancellationToken) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(drain(reader, stream, stop.clone()))
}

fn spawn_feed<W>(
    sink: W,
    feeders: Vec<Feeder>,
    eof: Option<u8>,
    stop: &CancellationToken,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(feed(sink, feeders, eof, stop.clone()))
}

/// VEOF of the slave's line discipline
fn end_of_input(slave: &OwnedFd) -> u8 {
    match tcgetattr(slave) {
        Ok(termios) => match termios.control_chars[SpecialCharacterIndices::VEOF as usize] {
            0 => DEFAULT_VEOF,
            veof => veof,
        },
        Err(e) => {
            debug!(error = %e, "Failed reading terminal attributes");
            DEFAULT_VEOF
        }
    }
}

/// Read `reader` to end-of-stream
async fn drain<R>(mut reader: R, stream: &'static str, stop: CancellationToken) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                warn!(stream, bytes = captured.len(), "Output still open after wait delay, stopped draining");
                break;
            }
            read = reader.read(&mut chunk) => match read {
                Ok(0) => break,
                Ok(n) => captured.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // A pty master reports EIO once every slave handle is closed.
                Err(e) if e.raw_os_error() == Some(Errno::EIO as i32) => break,
                Err(e) => {
                    warn!(stream, error = %e, "Failed draining output");
                    break;
                }
            },
        }
    }

    debug!(stream, bytes = captured.len(), "Drained output");
    captured
}

/// Copy every feeder's reader into `sink`, in order, then close it
///
/// With `eof` set the sink is a terminal: input is ended by writing the
/// end-of-input character, twice when the last line is unterminated (the
/// first one only flushes that line to the reader).
async fn feed<W>(mut sink: W, feeders: Vec<Feeder>, eof: Option<u8>, stop: CancellationToken)
where
    W: AsyncWrite + Unpin,
{
    let mut last = None;

    for factory in feeders {
        let mut reader = factory();
        tokio::select! {
            _ = stop.cancelled() => return,
            copied = copy(&mut reader, &mut sink, &mut last) => match copied {
                Ok(bytes) => debug!(bytes, "Fed stdin"),
                Err(e) => {
                    // Usually the child exited without reading everything.
                    debug!(error = %e, "Stopped feeding stdin");
                    return;
                }
            },
        }
    }

    if let Some(eof) = eof {
        let count = if matches!(last, Some(byte) if byte != b'\n') { 2 } else { 1 };
        if let Err(e) = sink.write_all(&[eof, eof][..count]).await {
            debug!(error = %e, "Failed ending terminal input");
        }
    }

    if let Err(e) = sink.shutdown().await {
        debug!(error = %e, "Failed closing stdin");
    }
}

/// `tokio::io::copy` that remembers the last byte written
async fn copy<R, W>(reader: &mut R, sink: &mut W, last: &mut Option<u8>) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut total = 0;

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        sink.write_all(&chunk[..n]).await?;
        *last = Some(chunk[n - 1]);
        total += n as u64;
    }
}

async fn join(task: Option<JoinHandle<Vec<u8>>>, stream: &'static str) -> Vec<u8> {
    match task {
        Some(task) => task.await.unwrap_or_else(|e| {
            warn!(stream, error = %e, "Drain task failed");
            vec![]
        }),
        None => vec![],
    }
}
