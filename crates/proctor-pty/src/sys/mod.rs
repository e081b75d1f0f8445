//! Platform allocation routines, one per platform behind `open()`

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod darwin;

#[cfg(target_os = "linux")]
pub(crate) use linux::{open, open_at};

#[cfg(target_os = "macos")]
pub(crate) use darwin::open;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub(crate) fn open() -> crate::error::Result<crate::pair::PtyPair> {
    Err(crate::error::PtyError::Unsupported)
}
