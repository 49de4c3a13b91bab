//! Interest masks and processing flags.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Readiness conditions a file event is interested in (or that were
/// reported ready).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mask(u8);

impl Mask {
    /// No condition.
    pub const NONE: Mask = Mask(0);
    /// Data can be read without blocking.
    pub const READABLE: Mask = Mask(1);
    /// Data can be written without blocking.
    pub const WRITABLE: Mask = Mask(2);
    /// An exceptional condition (out-of-band data) is pending.
    pub const EXCEPTION: Mask = Mask(4);

    /// Every condition.
    pub const ALL: Mask = Mask(1 | 2 | 4);

    /// Returns the raw bit value.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Builds a mask from raw bits, dropping unknown ones.
    pub const fn from_bits_truncate(bits: u8) -> Mask {
        Mask(bits & Self::ALL.0)
    }

    /// Returns true if no condition is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every condition in `other` is set in `self`.
    pub const fn contains(self, other: Mask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if `self` and `other` share a condition.
    pub const fn intersects(self, other: Mask) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Mask {
    type Output = Mask;

    fn bitor(self, rhs: Mask) -> Mask {
        Mask(self.0 | rhs.0)
    }
}

impl BitOrAssign for Mask {
    fn bitor_assign(&mut self, rhs: Mask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Mask {
    type Output = Mask;

    fn bitand(self, rhs: Mask) -> Mask {
        Mask(self.0 & rhs.0)
    }
}

impl Not for Mask {
    type Output = Mask;

    fn not(self) -> Mask {
        Mask(!self.0 & Self::ALL.0)
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }

        let mut first = true;
        for (flag, name) in [
            (Mask::READABLE, "READABLE"),
            (Mask::WRITABLE, "WRITABLE"),
            (Mask::EXCEPTION, "EXCEPTION"),
        ] {
            if self.contains(flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Which kinds of events a call to
/// [`process_events`](crate::event::EventLoop::process_events) handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessFlags(u8);

impl ProcessFlags {
    /// File readiness events.
    pub const FILE_EVENTS: ProcessFlags = ProcessFlags(1);
    /// Timers.
    pub const TIME_EVENTS: ProcessFlags = ProcessFlags(2);
    /// File and time events.
    pub const ALL_EVENTS: ProcessFlags = ProcessFlags(1 | 2);
    /// Never block waiting for readiness.
    pub const DONT_WAIT: ProcessFlags = ProcessFlags(4);

    /// Returns the raw bit value.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every flag in `other` is set in `self`.
    pub const fn contains(self, other: ProcessFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ProcessFlags {
    type Output = ProcessFlags;

    fn bitor(self, rhs: ProcessFlags) -> ProcessFlags {
        ProcessFlags(self.0 | rhs.0)
    }
}
