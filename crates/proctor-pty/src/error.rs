//! Error types for pty allocation

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Pty allocation errors
///
/// Every variant is a pty failure; the variant names the step that failed
/// and carries the underlying system error.
#[derive(Debug, Error)]
pub enum PtyError {
    /// The multiplexer device could not be opened
    #[error("pty failure: opening multiplexer {}: {source}", path.display())]
    OpenMultiplexer {
        /// Multiplexer device path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The slave identifier could not be queried from the master
    #[error("pty failure: resolving slave name: {0}")]
    SlaveName(#[source] Errno),

    /// Access to the slave could not be granted
    #[error("pty failure: granting slave: {0}")]
    Grant(#[source] Errno),

    /// The slave could not be unlocked
    #[error("pty failure: unlocking slave: {0}")]
    Unlock(#[source] Errno),

    /// The slave device could not be opened
    #[error("pty failure: opening slave {}: {source}", path.display())]
    OpenSlave {
        /// Slave device path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// No allocation routine exists for this platform
    #[error("pty failure: unsupported platform")]
    Unsupported,
}

/// Result type for pty operations
pub type Result<T> = std::result::Result<T, PtyError>;
