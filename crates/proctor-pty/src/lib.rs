//! # proctor-pty
//!
//! Pseudo-terminal pair allocation for proctor.
//!
//! Opens a connected master/slave pair through the platform's raw system
//! calls: open the multiplexer, query the slave name, unlock the slave, then
//! open the slave without letting it become the caller's controlling
//! terminal. A failure at any step closes the master before the error is
//! returned, so nothing leaks on the failure path.
//!
//! ```rust,no_run
//! use std::io::Write;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pair = proctor_pty::open()?;
//! let (mut master, _slave) = pair.into_files();
//! master.write_all(b"ping\n")?;
//! # Ok(())
//! # }
//! ```

#![cfg(unix)]

pub mod error;
pub mod pair;
mod sys;

pub use error::{PtyError, Result};
pub use pair::PtyPair;

/// Allocate a pseudo-terminal pair
///
/// The caller owns both handles and closes them by dropping the pair.
pub fn open() -> Result<PtyPair> {
    sys::open()
}

/// Allocate a pair from an explicit multiplexer and slave directory
///
/// Useful with a private devpts instance, whose multiplexer lives at
/// `<mount>/ptmx` and whose slaves live under `<mount>`.
#[cfg(target_os = "linux")]
pub fn open_at(
    multiplexer: impl AsRef<std::path::Path>,
    slave_dir: impl AsRef<std::path::Path>,
) -> Result<PtyPair> {
    sys::open_at(multiplexer.as_ref(), slave_dir.as_ref())
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn test_master_to_slave_round_trip() {
        let pair = open().unwrap();
        assert!(pair.slave_path().to_string_lossy().starts_with("/dev/"));

        let (mut master, mut slave) = pair.into_files();
        master.write_all(b"ping\n").unwrap();

        let mut buf = [0u8; 64];
        let n = slave.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping\n");
    }

    #[test]
    fn test_slave_to_master_round_trip() {
        let pair = open().unwrap();
        let (mut master, mut slave) = pair.into_files();
        slave.write_all(b"pong\n").unwrap();

        let mut buf = [0u8; 64];
        let n = master.read(&mut buf).unwrap();
        // Output post-processing turns the newline into CRLF.
        assert_eq!(&buf[..n], b"pong\r\n");
    }

    #[test]
    fn test_slave_clones_share_the_device() {
        let pair = open().unwrap();
        let clone = pair.try_clone_slave().unwrap();
        let (mut master, slave) = pair.into_files();
        drop(slave);

        let mut clone = std::fs::File::from(clone);
        master.write_all(b"still open\n").unwrap();

        let mut buf = [0u8; 64];
        let n = clone.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"still open\n");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_multiplexer_is_reported() {
        let err = open_at("/nonexistent/ptmx", "/dev/pts").unwrap_err();
        assert!(matches!(err, PtyError::OpenMultiplexer { .. }));
        assert!(err.to_string().starts_with("pty failure"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_slave_dir_is_reported() {
        let err = open_at("/dev/ptmx", "/nonexistent/pts").unwrap_err();
        match err {
            PtyError::OpenSlave { path, .. } => {
                assert!(path.starts_with("/nonexistent/pts"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
