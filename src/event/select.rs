//! Readiness Primitive
//!
//! Thin wrappers over `select(2)`. The loop builds three descriptor sets
//! (read, write, except) from its registered file events, blocks until one
//! of them is ready or the timeout passes, then tests each descriptor.
//!
//! Only descriptors in `0..FD_SETSIZE` fit in a set; the loop rejects
//! anything else at registration.

use crate::event::event_loop::EventError;
use crate::event::mask::Mask;
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::RawFd;
use std::ptr;

/// Returns true if `fd` can be stored in an `fd_set`.
pub(crate) fn fd_in_range(fd: RawFd) -> bool {
    fd >= 0 && (fd as usize) < libc::FD_SETSIZE as usize
}

/// A descriptor set for `select(2)`.
pub(crate) struct FdSet(libc::fd_set);

impl FdSet {
    /// Creates an empty set.
    pub(crate) fn new() -> Self {
        let mut raw = MaybeUninit::<libc::fd_set>::uninit();
        unsafe {
            libc::FD_ZERO(raw.as_mut_ptr());
            Self(raw.assume_init())
        }
    }

    /// Adds `fd`. The caller guarantees it is in range.
    pub(crate) fn insert(&mut self, fd: RawFd) {
        debug_assert!(fd_in_range(fd));
        unsafe { libc::FD_SET(fd, &mut self.0) };
    }

    /// Removes `fd`.
    pub(crate) fn remove(&mut self, fd: RawFd) {
        debug_assert!(fd_in_range(fd));
        unsafe { libc::FD_CLR(fd, &mut self.0) };
    }

    /// Returns true if `fd` is in the set.
    pub(crate) fn contains(&self, fd: RawFd) -> bool {
        debug_assert!(fd_in_range(fd));
        unsafe { libc::FD_ISSET(fd, &self.0) }
    }
}

/// Blocks in `select(2)` until a descriptor in one of the sets is ready or
/// `timeout_ms` passes (`None` waits forever).
///
/// # Returns
///
/// The number of ready descriptors. An interrupted wait reports zero.
pub(crate) fn select(
    nfds: RawFd,
    read: &mut FdSet,
    write: &mut FdSet,
    except: &mut FdSet,
    timeout_ms: Option<u64>,
) -> io::Result<usize> {
    let mut tv = timeout_ms.map(|ms| libc::timeval {
        tv_sec: (ms / 1000) as libc::time_t,
        tv_usec: ((ms % 1000) * 1000) as libc::suseconds_t,
    });
    let tvp = match tv.as_mut() {
        Some(tv) => tv as *mut libc::timeval,
        None => ptr::null_mut(),
    };

    let rc = unsafe { libc::select(nfds, &mut read.0, &mut write.0, &mut except.0, tvp) };

    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(0);
        }
        return Err(err);
    }

    Ok(rc as usize)
}

/// Waits up to `timeout_ms` milliseconds for `fd` to become ready for any
/// condition in `mask`.
///
/// This is independent of any event loop.
///
/// # Returns
///
/// The subset of `mask` that is ready, or an empty mask on timeout.
///
/// # Example
///
/// ```
/// use emberkv::event::{wait, Mask};
/// use std::os::fd::AsRawFd;
/// use std::os::unix::net::UnixStream;
///
/// let (a, _b) = UnixStream::pair().unwrap();
///
/// // Nothing to read yet, but the socket buffer has room
/// assert_eq!(wait(a.as_raw_fd(), Mask::READABLE, 10).unwrap(), Mask::NONE);
/// assert_eq!(wait(a.as_raw_fd(), Mask::WRITABLE, 10).unwrap(), Mask::WRITABLE);
/// ```
pub fn wait(fd: RawFd, mask: Mask, timeout_ms: u64) -> Result<Mask, EventError> {
    if !fd_in_range(fd) {
        return Err(EventError::FdOutOfRange(fd));
    }

    let mut rfds = FdSet::new();
    let mut wfds = FdSet::new();
    let mut efds = FdSet::new();

    if mask.contains(Mask::READABLE) {
        rfds.insert(fd);
    }
    if mask.contains(Mask::WRITABLE) {
        wfds.insert(fd);
    }
    if mask.contains(Mask::EXCEPTION) {
        efds.insert(fd);
    }

    let ready = select(fd + 1, &mut rfds, &mut wfds, &mut efds, Some(timeout_ms))
        .map_err(EventError::WaitFailed)?;
    if ready == 0 {
        return Ok(Mask::NONE);
    }

    let mut result = Mask::NONE;
    if rfds.contains(fd) {
        result |= Mask::READABLE;
    }
    if wfds.contains(fd) {
        result |= Mask::WRITABLE;
    }
    if efds.contains(fd) {
        result |= Mask::EXCEPTION;
    }
    Ok(result & mask)
}
