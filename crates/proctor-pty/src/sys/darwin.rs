//! macOS allocation through `posix_openpt` and the grant/unlock calls

#![allow(unsafe_code)]

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::libc;
use nix::pty::{grantpt, posix_openpt, ptsname, unlockpt};
use tracing::debug;

use crate::error::{PtyError, Result};
use crate::pair::PtyPair;

const MULTIPLEXER: &str = "/dev/ptmx";

pub(crate) fn open() -> Result<PtyPair> {
    // `PtyMaster` closes itself on drop, which covers every early return below.
    let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).map_err(|errno| {
        PtyError::OpenMultiplexer {
            path: PathBuf::from(MULTIPLEXER),
            source: errno.into(),
        }
    })?;
    fcntl(master.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(|errno| {
        PtyError::OpenMultiplexer {
            path: PathBuf::from(MULTIPLEXER),
            source: errno.into(),
        }
    })?;

    // SAFETY: ptsname uses a static buffer; the name is copied out before
    // anything else can call it from this function.
    let slave_path = PathBuf::from(unsafe { ptsname(&master) }.map_err(PtyError::SlaveName)?);

    grantpt(&master).map_err(PtyError::Grant)?;
    unlockpt(&master).map_err(PtyError::Unlock)?;

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

    // SAFETY: the descriptor comes straight out of `PtyMaster`, which gives up ownership.
    let master = unsafe { OwnedFd::from_raw_fd(master.into_raw_fd()) };

    debug!(
        master = master.as_raw_fd(),
        slave = %slave_path.display(),
        "Allocated pty pair"
    );

    Ok(PtyPair::new(master, slave, slave_path))
}
