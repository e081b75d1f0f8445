//! # proctor-process
//!
//! **Purpose**: One-shot child process execution for CLI test harnesses
//!
//! Runs a command once, bounded by a timeout and a caller cancellation
//! token, captures its output and classifies how it ended.
//!
//! ## Features
//!
//! - **Run / Wait / Signal**: Non-blocking start, a single result, signal delivery
//! - **Classified Termination**: Timeout, cancellation, signal or non-zero exit
//! - **Complete Output**: stdout/stderr drained concurrently, never truncated
//! - **Pseudo-terminals**: Any of stdin/stdout/stderr attached to a pty
//! - **Environment Control**: Inherit, blacklist (or `*` for all) and override
//! - **Wrappers**: Run the command through another program
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use proctor_process::{CancellationToken, Command, CommandConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CommandConfig::new("ls")
//!     .args(["-la"])
//!     .timeout(Duration::from_secs(5))
//!     .env("LC_ALL", "C");
//!
//! let command = proctor_process::Command::new(config);
//! command.run(&CancellationToken::new()).await?;
//!
//! let (result, outcome) = command.wait().await;
//! println!("{}", result.expect("started"));
//! outcome?;
//! # Ok(())
//! # }
//! ```

#![cfg(unix)]

pub mod command;
pub mod config;
mod context;
pub mod error;
pub mod invocation;
mod pipes;
pub mod result;
mod supervisor;

pub use command::{Command, CommandState};
pub use config::{
    CommandConfig, FeedReader, Feeder, PtyMode, DEFAULT_TIMEOUT, DEFAULT_WAIT_DELAY, ENV_WILDCARD,
};
pub use error::{ErrorKind, ProcessError, Result, SignalError, StartError};
pub use invocation::{resolve_environ, Invocation};
pub use result::{ExecResult, NO_EXIT_CODE};
pub use supervisor::KILL_GRACE;

pub use nix::sys::signal::Signal;
pub use tokio_util::sync::CancellationToken;
