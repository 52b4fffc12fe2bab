//! Domain newtypes providing compile-time safety and self-documentation.
//!
//! These wrappers keep a thread id from being passed where a logical time is
//! expected, and vice versa.

use std::fmt;

/// Logical thread identifier assigned by the driver.
///
/// Distinct from the operating system's native thread handle — see
/// [`NativeHandle`], which the model only ever compares for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque native thread handle (e.g. a `pthread_t`), as reported by a
/// `clone`/`pthread_create` finish trap and later matched against a
/// `pthread_join` argument.
///
/// Stored as a string because the driver hands it over already resolved to
/// a symbol or a printed register value; the model never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub String);

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical clock value. Monotonically increasing, advanced by a fixed
/// `time_delta` on every event start and stop. Never derived from real time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct LogicalTime(pub u64);

impl LogicalTime {
    pub const ZERO: LogicalTime = LogicalTime(0);

    #[must_use]
    pub fn advance(self, delta: u64) -> LogicalTime {
        LogicalTime(self.0 + delta)
    }

    #[must_use]
    pub fn retreat(self, delta: u64) -> LogicalTime {
        LogicalTime(self.0 - delta)
    }
}

impl fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_display() {
        assert_eq!(ThreadId(3).to_string(), "3");
    }

    #[test]
    fn test_logical_time_advances_and_retreats() {
        let t = LogicalTime::ZERO.advance(1).advance(1);
        assert_eq!(t, LogicalTime(2));
        assert_eq!(t.retreat(1), LogicalTime(1));
    }

    #[test]
    fn test_native_handle_equality() {
        assert_eq!(NativeHandle("0x7f".into()), NativeHandle("0x7f".into()));
        assert_ne!(NativeHandle("0x7f".into()), NativeHandle("0x80".into()));
    }
}
