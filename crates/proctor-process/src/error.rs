//! Error types for command execution
//!
//! Every classification is a variant of [`ProcessError`]. Variants that have
//! an underlying cause chain it through `source()`, and [`ProcessError::is`]
//! answers "is this downstream of classification X" without dropping the
//! original OS-level error.

use std::io;
use std::sync::Arc;

use nix::errno::Errno;
use proctor_pty::PtyError;
use thiserror::Error;

/// Classification tags, one per sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The deadline expired before the process exited
    ExecutionTimeout,
    /// The caller's token was cancelled before the process exited
    ExecutionCancelled,
    /// The process exited with a non-zero code
    ExecutionFailed,
    /// The process was terminated by an uncaught signal
    ExecutionSignaled,
    /// `run` was called twice
    AlreadyStarted,
    /// `wait` or `signal` was called before `run`
    NotStarted,
    /// Pipes, pty or the process itself could not be started
    FailedStarting,
    /// The command has already produced its result
    AlreadyFinished,
    /// A signal could not be delivered
    FailedSendingSignal,
    /// Pseudo-terminal allocation failed
    PtyFailure,
}

/// Command execution errors
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    /// Command timed out
    #[error("command timed out")]
    ExecutionTimeout,

    /// Command cancelled by the caller
    #[error("command execution cancelled")]
    ExecutionCancelled,

    /// Command exited with a non-zero code
    #[error("command returned a non-zero exit code")]
    ExecutionFailed,

    /// Command terminated by a signal
    #[error("command execution signalled")]
    ExecutionSignaled,

    /// Double `run`
    #[error("command has already been started (double `run`)")]
    AlreadyStarted,

    /// `wait`/`signal` before `run`
    #[error("command has not been started (call `run` first)")]
    NotStarted,

    /// Command could not be started
    #[error("command failed starting: {0}")]
    FailedStarting(#[source] Arc<StartError>),

    /// Command already finished
    #[error("command is already finished")]
    AlreadyFinished,

    /// Signal could not be delivered
    #[error("failed sending signal: {0}")]
    FailedSendingSignal(#[source] SignalError),
}

impl ProcessError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ExecutionTimeout => ErrorKind::ExecutionTimeout,
            Self::ExecutionCancelled => ErrorKind::ExecutionCancelled,
            Self::ExecutionFailed => ErrorKind::ExecutionFailed,
            Self::ExecutionSignaled => ErrorKind::ExecutionSignaled,
            Self::AlreadyStarted => ErrorKind::AlreadyStarted,
            Self::NotStarted => ErrorKind::NotStarted,
            Self::FailedStarting(_) => ErrorKind::FailedStarting,
            Self::AlreadyFinished => ErrorKind::AlreadyFinished,
            Self::FailedSendingSignal(_) => ErrorKind::FailedSendingSignal,
        }
    }

    /// Whether this error is, or is caused by, the given classification
    ///
    /// A start failure caused by pty allocation answers both
    /// `FailedStarting` and `PtyFailure`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        if self.kind() == kind {
            return true;
        }

        match self {
            Self::FailedStarting(cause) => cause.kind() == Some(kind),
            _ => false,
        }
    }

    pub(crate) fn starting(cause: StartError) -> Self {
        Self::FailedStarting(Arc::new(cause))
    }
}

/// Why a command could not be started
#[derive(Debug, Error)]
pub enum StartError {
    /// Standard stream pipes could not be created
    #[error("failed allocating pipes: {0}")]
    Pipes(#[source] io::Error),

    /// The pseudo-terminal could not be allocated
    #[error(transparent)]
    Pty(#[from] PtyError),

    /// The OS refused to start the process
    #[error("failed spawning `{program}`: {source}")]
    Spawn {
        /// Program that was executed
        program: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl StartError {
    fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Pty(_) => Some(ErrorKind::PtyFailure),
            Self::Pipes(_) | Self::Spawn { .. } => None,
        }
    }
}

/// Why a signal could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The process has already exited
    #[error("process already finished")]
    ProcessDone,

    /// No process was ever started
    #[error("no process was started")]
    NoProcess,

    /// Delivery failed at the OS level
    #[error(transparent)]
    Os(#[from] Errno),
}

/// Result type for command operations
pub type Result<T> = std::result::Result<T, ProcessError>;
