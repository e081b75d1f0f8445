//! Linux allocation through the ptmx multiplexer and the devpts ioctls

#![allow(unsafe_code)]

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::libc;
use tracing::debug;

use crate::error::{PtyError, Result};
use crate::pair::PtyPair;

pub(crate) const MULTIPLEXER: &str = "/dev/ptmx";
pub(crate) const SLAVE_DIR: &str = "/dev/pts";

nix::ioctl_read_bad!(tiocgptn, libc::TIOCGPTN, libc::c_uint);
nix::ioctl_write_ptr_bad!(tiocsptlck, libc::TIOCSPTLCK, libc::c_int);

/// Allocate a pair from `multiplexer`, resolving slaves under `slave_dir`
///
/// The master is held as an `OwnedFd` from the first step on, so any early
/// return closes it.
pub(crate) fn open_at(multiplexer: &Path, slave_dir: &Path) -> Result<PtyPair> {
    let master: OwnedFd = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(multiplexer)
        .map_err(|source| PtyError::OpenMultiplexer {
            path: multiplexer.to_path_buf(),
            source,
        })?
        .into();

    let mut unit: libc::c_uint = 0;
    // SAFETY: `master` is an open multiplexer descriptor and `unit` outlives the call.
    unsafe { tiocgptn(master.as_raw_fd(), &mut unit) }.map_err(PtyError::SlaveName)?;
    let slave_path = slave_dir.join(unit.to_string());

    let unlock: libc::c_int = 0;
    // SAFETY: same descriptor; the kernel only reads `unlock`.
    unsafe { tiocsptlck(master.as_raw_fd(), &unlock) }.map_err(PtyError::Unlock)?;

    // O_NOCTTY: the slave must not become our controlling terminal.
    let slave: OwnedFd = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(&slave_path)
        .map_err(|source| PtyError::OpenSlave {
            path: slave_path.clone(),
            source,
        })?
        .into();

    debug!(
        master = master.as_raw_fd(),
        slave = %slave_path.display(),
        "Allocated pty pair"
    );

    Ok(PtyPair::new(master, slave, slave_path))
}

pub(crate) fn open() -> Result<PtyPair> {
    open_at(Path::new(MULTIPLEXER), Path::new(SLAVE_DIR))
}
