//! Derived execution context: caller cancellation plus a deadline

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why the context gave up on the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interruption {
    /// The deadline expired
    Timeout,
    /// The caller cancelled
    Cancelled,
}

/// Child of the caller's token with its own deadline
#[derive(Debug, Clone)]
pub(crate) struct ExecContext {
    token: CancellationToken,
    deadline: Instant,
}

impl ExecContext {
    pub(crate) fn derive(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            token: parent.child_token(),
            deadline: Instant::now() + timeout,
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Current interruption, if any; only meaningful before [`Self::cancel`]
    pub(crate) fn interruption(&self) -> Option<Interruption> {
        if Instant::now() >= self.deadline {
            Some(Interruption::Timeout)
        } else if self.token.is_cancelled() {
            Some(Interruption::Cancelled)
        } else {
            None
        }
    }

    /// Release the context; never reaches the caller's token
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }
}
