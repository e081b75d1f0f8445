//! Execution result and exit classification

use std::borrow::Cow;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;
use serde::{Serialize, Serializer};

use crate::context::Interruption;
use crate::error::{ProcessError, Result};

/// Exit code reported when the process produced no normal exit status
pub const NO_EXIT_CODE: i32 = -1;

/// Consolidated outcome of one execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    /// Exit code, or [`NO_EXIT_CODE`] when signaled, timed out, cancelled or never started
    pub exit_code: i32,
    /// Captured stdout, exactly as written
    #[serde(serialize_with = "lossy_text")]
    pub stdout: Vec<u8>,
    /// Captured stderr, exactly as written
    #[serde(serialize_with = "lossy_text")]
    pub stderr: Vec<u8>,
    /// Signal that terminated the process, if any
    #[serde(serialize_with = "signal_name")]
    pub signal: Option<Signal>,
    /// Environment the process ran with, as `NAME=value`
    pub environ: Vec<String>,
}

impl ExecResult {
    /// Result of a command that never produced an exit status
    pub(crate) fn degenerate(environ: Vec<String>) -> Self {
        Self {
            exit_code: NO_EXIT_CODE,
            stdout: Vec::new(),
            stderr: Vec::new(),
            signal: None,
            environ,
        }
    }

    /// Captured stdout as text, invalid UTF-8 replaced
    pub fn stdout_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Captured stderr as text, invalid UTF-8 replaced
    pub fn stderr_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Whether the process exited normally with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.signal.is_none()
    }
}

impl fmt::Display for ExecResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ExitCode: {}", self.exit_code)?;
        match self.signal {
            Some(signal) => writeln!(f, "Signal: {}", signal.as_str())?,
            None => writeln!(f, "Signal: none")?,
        }
        writeln!(f, "Stdout:\n{}", self.stdout_str())?;
        writeln!(f, "Stderr:\n{}", self.stderr_str())?;
        write!(f, "Env:\n{}", self.environ.join("\n"))
    }
}

fn signal_name<S: Serializer>(signal: &Option<Signal>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match signal {
        Some(signal) => serializer.serialize_some(signal.as_str()),
        None => serializer.serialize_none(),
    }
}

fn lossy_text<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

/// Exit code, signal and classification of a finished process
#[derive(Debug, Clone)]
pub(crate) struct Classification {
    pub(crate) exit_code: i32,
    pub(crate) signal: Option<Signal>,
    pub(crate) outcome: Result<()>,
}

/// Classify a terminated process
///
/// Context interruptions outrank the OS status: they explain why the
/// caller gave up, whatever the child reported afterwards.
pub(crate) fn classify(status: Option<ExitStatus>, interruption: Option<Interruption>) -> Classification {
    let interrupted = |error| Classification {
        exit_code: NO_EXIT_CODE,
        signal: None,
        outcome: Err(error),
    };

    match interruption {
        Some(Interruption::Timeout) => return interrupted(ProcessError::ExecutionTimeout),
        Some(Interruption::Cancelled) => return interrupted(ProcessError::ExecutionCancelled),
        None => {}
    }

    let Some(status) = status else {
        return interrupted(ProcessError::ExecutionFailed);
    };

    if let Some(raw) = status.signal() {
        return Classification {
            exit_code: NO_EXIT_CODE,
            signal: Signal::try_from(raw).ok(),
            outcome: Err(ProcessError::ExecutionSignaled),
        };
    }

    let exit_code = status.code().unwrap_or(NO_EXIT_CODE);
    Classification {
        exit_code,
        signal: None,
        outcome: if exit_code == 0 {
            Ok(())
        } else {
            Err(ProcessError::ExecutionFailed)
        },
    }
}
