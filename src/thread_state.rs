//! Per-thread state tracked by the model: `thread -> {events, locks,
//! native_handle}` (spec §3 "Per-thread state").

use std::collections::BTreeMap;

use crate::domain::{NativeHandle, ThreadId};
use crate::event::Event;
use crate::stack::Stack;

/// `events.top()` is the innermost unfinished event on this thread.
/// `locks` holds acquired-but-not-yet-released mutex-lock events in LIFO
/// order. `native_handle` is set once, when the creator's thread-start
/// event resolves.
#[derive(Debug, Default)]
pub struct ThreadState {
    pub events: Stack<Event>,
    pub locks: Stack<Event>,
    pub native_handle: Option<NativeHandle>,
}

/// `BTreeMap` keeps threads ordered ascending by id, which both the text
/// view (fixed column order) and `link_threads`'s join search rely on.
pub type PendEvents = BTreeMap<ThreadId, ThreadState>;
