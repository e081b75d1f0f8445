//! Child supervision: exit, deadline, cancellation and signal delivery
//!
//! The supervisor task is the only owner of the OS child handle. Signals are
//! delivered from inside its loop, so a request is never sent to a pid that
//! has already been reaped (and possibly reused).

use std::process::ExitStatus;
use std::time::Duration;

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::context::{ExecContext, Interruption};
use crate::error::SignalError;

/// SIGKILL escalation delay after the group was sent SIGTERM
pub const KILL_GRACE: Duration = Duration::from_millis(200);

/// Signal delivery request, answered by the supervisor
#[derive(Debug)]
pub(crate) struct SignalRequest {
    pub(crate) signal: Signal,
    pub(crate) reply: oneshot::Sender<Result<(), SignalError>>,
}

/// How the child ended
#[derive(Debug)]
pub(crate) struct Exit {
    /// OS status; None when waiting on the child itself failed
    pub(crate) status: Option<ExitStatus>,
    /// Set when the context gave up before the child exited
    pub(crate) interruption: Option<Interruption>,
}

/// Wait for `child`, terminating it if the context expires first
pub(crate) async fn supervise(
    mut child: Child,
    context: &ExecContext,
    mut requests: mpsc::UnboundedReceiver<SignalRequest>,
) -> Exit {
    let pid = child.id();
    let mut interruption = None;
    let mut kill_at: Option<Instant> = None;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(request) = requests.recv() => {
                let delivered = deliver(&child, request.signal);
                let _ = request.reply.send(delivered);
            }
            _ = sleep_until(context.deadline()), if interruption.is_none() => {
                interruption = Some(Interruption::Timeout);
                kill_at = Some(terminate(pid));
            }
            _ = context.token().cancelled(), if interruption.is_none() => {
                interruption = Some(Interruption::Cancelled);
                kill_at = Some(terminate(pid));
            }
            _ = sleep_until(kill_at.unwrap_or_else(Instant::now)), if kill_at.is_some() => {
                kill_at = None;
                escalate(&mut child, pid);
            }
        }
    };

    // Anything still queued is answered by dropping its reply channel.
    requests.close();

    let status = match status {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(pid, error = %e, "Failed waiting for process");
            None
        }
    };

    debug!(pid, ?status, ?interruption, "Process terminated");

    Exit {
        status,
        interruption,
    }
}

fn deliver(child: &Child, signal: Signal) -> Result<(), SignalError> {
    // `id()` is None once the child has been reaped.
    let pid = child.id().ok_or(SignalError::ProcessDone)?;
    debug!(pid, ?signal, "Sending signal");
    kill(as_pid(pid), signal).map_err(SignalError::Os)
}

/// Ask the whole process group to stop; returns when to escalate
fn terminate(pid: Option<u32>) -> Instant {
    if let Some(pid) = pid {
        warn!(pid, "Context expired, sending SIGTERM to process group");
        if let Err(e) = killpg(as_pid(pid), Signal::SIGTERM) {
            debug!(pid, error = %e, "Failed to send SIGTERM to process group");
        }
    }
    Instant::now() + KILL_GRACE
}

fn escalate(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        warn!(pid, "Process survived SIGTERM, sending SIGKILL");
        if let Err(e) = killpg(as_pid(pid), Signal::SIGKILL) {
            debug!(pid, error = %e, "Failed to send SIGKILL to process group");
        }
    }
    if let Err(e) = child.start_kill() {
        debug!(?pid, error = %e, "Failed to kill process");
    }
}

#[allow(clippy::cast_possible_wrap)]
fn as_pid(pid: u32) -> Pid {
    Pid::from_raw(pid as i32)
}
