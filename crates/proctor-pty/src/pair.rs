//! Allocated master/slave pair

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::{Path, PathBuf};

/// A connected pseudo-terminal pair
///
/// Bytes written to the master are read from the slave and the other way
/// around. Both handles are closed when the pair (or the parts taken out of
/// it) are dropped.
#[derive(Debug)]
pub struct PtyPair {
    master: OwnedFd,
    slave: OwnedFd,
    slave_path: PathBuf,
}

impl PtyPair {
    pub(crate) fn new(master: OwnedFd, slave: OwnedFd, slave_path: PathBuf) -> Self {
        Self {
            master,
            slave,
            slave_path,
        }
    }

    /// Borrow the master handle
    pub fn master(&self) -> BorrowedFd<'_> {
        self.master.as_fd()
    }

    /// Borrow the slave handle
    pub fn slave(&self) -> BorrowedFd<'_> {
        self.slave.as_fd()
    }

    /// Device path of the slave (for example `/dev/pts/3`)
    pub fn slave_path(&self) -> &Path {
        &self.slave_path
    }

    /// Duplicate the slave handle, typically once per child stream
    pub fn try_clone_slave(&self) -> io::Result<OwnedFd> {
        self.slave.try_clone()
    }

    /// Split into `(master, slave)`
    pub fn into_parts(self) -> (OwnedFd, OwnedFd) {
        (self.master, self.slave)
    }

    /// Split into blocking `(master, slave)` files
    pub fn into_files(self) -> (File, File) {
        (File::from(self.master), File::from(self.slave))
    }

    /// Close both handles, slave first
    pub fn close(self) {
        let (master, slave) = self.into_parts();
        drop(slave);
        drop(master);
    }
}
