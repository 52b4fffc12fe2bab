//! The immutable-after-creation record describing one synchronization
//! occurrence, plus its mutable lifecycle status and timestamps.

use std::fmt;

use crate::domain::{LogicalTime, NativeHandle, ThreadId};

/// Whether an event is a traced function call or a watched memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Function,
    Access,
}

/// Lifecycle status of an [`Event`].
///
/// `started -> waiting -> finished | aborted` for function events;
/// `started -> finished` atomically (within one admission) for access
/// events. `Finished` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Started,
    Waiting,
    Finished,
    Aborted,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventStatus::Started => "started",
            EventStatus::Waiting => "waiting",
            EventStatus::Finished => "finished",
            EventStatus::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// Identity of a thread freshly created by a `clone`-like primitive,
/// supplied by the driver at the *finish* of the creation call (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewThread {
    pub driver_tid: ThreadId,
    pub native_handle: NativeHandle,
}

/// One occurrence of a traced synchronization operation.
///
/// Only `status`, `stop_time` and `new_thread` may change after
/// construction — everything else describes the occurrence as observed at
/// entry.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub kind: EventKind,
    pub thread: ThreadId,
    pub arg1: Option<String>,
    pub arg2: Option<String>,
    pub value: Option<String>,
    pub filename: String,
    pub line: String,
    pub backtrace: String,
    pub opaque: bool,

    pub status: EventStatus,
    pub start_time: LogicalTime,
    pub stop_time: LogicalTime,

    pub new_thread: Option<NewThread>,
}

/// Sentinel used for source location fields the driver could not resolve.
pub const UNKNOWN_LOCATION: &str = "?";

impl Event {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: EventKind,
        thread: ThreadId,
        arg1: Option<String>,
        arg2: Option<String>,
        value: Option<String>,
        filename: impl Into<String>,
        line: impl Into<String>,
        backtrace: impl Into<String>,
        opaque: bool,
        start_time: LogicalTime,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            thread,
            arg1,
            arg2,
            value,
            filename: filename.into(),
            line: line.into(),
            backtrace: backtrace.into(),
            opaque,
            status: EventStatus::Started,
            start_time,
            stop_time: start_time,
            new_thread: None,
        }
    }

    /// Full diagnostic rendering: `"<name> <arg1> thread <tid> time <start>
    /// status <status>"` (spec §4.2).
    #[must_use]
    pub fn diagnostic_string(&self) -> String {
        format!(
            "{} {} thread {} time {} status {}",
            self.name,
            self.arg1.as_deref().unwrap_or(""),
            self.thread,
            self.start_time,
            self.status
        )
    }
}

/// Short form used by the text view: `"<name> <arg1>"`.
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.arg1.as_deref().unwrap_or(""))
    }
}
