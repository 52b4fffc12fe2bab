//! Chrome Trace Event Format renderer: accumulates JSON trace-event objects
//! in memory and flushes them as `{"traceEvents": [...]}` on close (spec
//! §4.4.2, §9 "Streaming Chrome output" — buffering is the acknowledged
//! baseline, not yet streamed).

use std::io::Write;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::{LogicalTime, ThreadId, ViewError};
use crate::event::{EventKind, EventStatus};
use crate::thread_state::PendEvents;
use crate::view::{Scope, View, ViewArgs};

#[derive(Debug, Serialize)]
struct ChromeEvent {
    cat: String,
    name: String,
    pid: u32,
    tid: u64,
    ph: &'static str,
    id: u64,
    ts: u64,
    args: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<char>,
}

#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeEvent>,
}

pub struct Chrome<W: Write> {
    writer: W,
    events: Vec<ChromeEvent>,
    next_id: u64,
}

impl<W: Write> Chrome<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer, events: Vec::new(), next_id: 0 }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// A B/E or s/f pair sharing one freshly allocated id.
    #[allow(clippy::too_many_arguments)]
    fn json_slice(
        &mut self,
        category: &str,
        name: &str,
        start_thread: ThreadId,
        stop_thread: ThreadId,
        start: LogicalTime,
        stop: LogicalTime,
        start_args: Map<String, Value>,
        dep_slice: bool,
    ) -> Result<(), ViewError> {
        if !dep_slice && start_thread != stop_thread {
            return Err(ViewError::GroupThreadMismatch(start_thread, stop_thread));
        }
        let id = self.next_id();
        let (start_phase, stop_phase) = if dep_slice { ("s", "f") } else { ("B", "E") };
        self.events.push(chrome_event(
            name, category, start_thread, start_phase, start, start_args, id, None,
        ));
        self.events.push(chrome_event(
            name,
            category,
            stop_thread,
            stop_phase,
            stop,
            Map::new(),
            id,
            None,
        ));
        Ok(())
    }

    fn category_for(kind: EventKind, name: &str) -> &'static str {
        if kind == EventKind::Access {
            return "access";
        }
        if name.starts_with("GOMP_") {
            "OpenMP"
        } else if name.starts_with("pthread_") {
            "POSIX threads"
        } else if name.starts_with("sem_") {
            "POSIX semaphores"
        } else {
            "unknown"
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn chrome_event(
    name: &str,
    category: &str,
    thread: ThreadId,
    phase: &'static str,
    ts: LogicalTime,
    args: Map<String, Value>,
    id: u64,
    scope: Option<char>,
) -> ChromeEvent {
    ChromeEvent { cat: category.to_string(), name: name.to_string(), pid: 1, tid: thread.0, ph: phase, id, ts: ts.0, args, s: scope }
}

fn opt_string_to_json(value: Option<&str>) -> Value {
    match value {
        Some(s) => Value::String(s.to_string()),
        None => Value::Null,
    }
}

impl<W: Write> View for Chrome<W> {
    fn timestamp(&mut self, pend_events: &PendEvents) -> Result<(), ViewError> {
        for state in pend_events.values() {
            if state.events.empty() {
                continue;
            }
            let event = state.events.top().expect("checked non-empty above");
            if !matches!(event.status, EventStatus::Finished | EventStatus::Aborted) {
                continue;
            }
            let category = Self::category_for(event.kind, &event.name);
            let mut args = Map::new();
            args.insert("argument1".to_string(), opt_string_to_json(event.arg1.as_deref()));
            args.insert("argument2".to_string(), opt_string_to_json(event.arg2.as_deref()));
            args.insert("value".to_string(), opt_string_to_json(event.value.as_deref()));
            args.insert("source".to_string(), Value::String(event.filename.clone()));
            args.insert("line".to_string(), Value::String(event.line.clone()));
            args.insert("stacktrace".to_string(), Value::String(event.backtrace.clone()));

            self.json_slice(
                category,
                &event.name,
                event.thread,
                event.thread,
                event.start_time,
                event.stop_time,
                args,
                false,
            )?;
        }
        Ok(())
    }

    fn link(
        &mut self,
        category: &str,
        name: &str,
        start_time: LogicalTime,
        start_thread: ThreadId,
        stop_time: LogicalTime,
        stop_thread: ThreadId,
        args: ViewArgs,
    ) -> Result<(), ViewError> {
        let args = args.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        self.json_slice(category, name, start_thread, stop_thread, start_time, stop_time, args, true)
    }

    fn group(
        &mut self,
        category: &str,
        name: &str,
        start_time: LogicalTime,
        start_thread: ThreadId,
        stop_time: LogicalTime,
        stop_thread: ThreadId,
        args: ViewArgs,
    ) -> Result<(), ViewError> {
        let args = args.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        self.json_slice(category, name, start_thread, stop_thread, start_time, stop_time, args, false)
    }

    fn mark(
        &mut self,
        name: &str,
        category: &str,
        scope: Scope,
        time: LogicalTime,
        thread: ThreadId,
    ) -> Result<(), ViewError> {
        let scope_char = match scope {
            Scope::Global => 'g',
            Scope::Process => 'p',
            Scope::Thread => 't',
        };
        let id = self.next_id();
        self.events.push(chrome_event(
            name,
            category,
            thread,
            "I",
            time,
            Map::new(),
            id,
            Some(scope_char),
        ));
        Ok(())
    }

    fn close(&mut self) -> Result<(), ViewError> {
        let trace = ChromeTrace { trace_events: std::mem::take(&mut self.events) };
        serde_json::to_writer(&mut self.writer, &trace)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventKind};
    use crate::thread_state::ThreadState;

    fn finished_event(name: &str, thread: ThreadId) -> Event {
        let mut e = Event::new(
            name,
            EventKind::Function,
            thread,
            Some("m".to_string()),
            None,
            None,
            "a.c",
            "1",
            "#0",
            false,
            LogicalTime(0),
        );
        e.status = EventStatus::Finished;
        e.stop_time = LogicalTime(1);
        e
    }

    #[test]
    fn test_timestamp_emits_be_pair_for_finished_event() {
        let mut view = Chrome::new(Vec::new());
        let mut pend = PendEvents::new();
        let mut state = ThreadState::default();
        state.events.push(finished_event("pthread_mutex_lock", ThreadId(1)));
        pend.insert(ThreadId(1), state);
        view.timestamp(&pend).unwrap();
        assert_eq!(view.events.len(), 2);
        assert_eq!(view.events[0].ph, "B");
        assert_eq!(view.events[1].ph, "E");
        assert_eq!(view.events[0].id, view.events[1].id);
        assert_eq!(view.events[0].cat, "POSIX threads");
    }

    #[test]
    fn test_category_for_access_kind_is_access() {
        assert_eq!(Chrome::<Vec<u8>>::category_for(EventKind::Access, "ACCESS x"), "access");
    }

    #[test]
    fn test_link_emits_sf_pair_across_threads() {
        let mut view = Chrome::new(Vec::new());
        let mut args = ViewArgs::new();
        args.insert("semaphore".to_string(), "s".to_string());
        view.link(
            "synchronization flow",
            "semaphore increment",
            LogicalTime(1),
            ThreadId(1),
            LogicalTime(2),
            ThreadId(2),
            args,
        )
        .unwrap();
        assert_eq!(view.events[0].ph, "s");
        assert_eq!(view.events[0].tid, 1);
        assert_eq!(view.events[1].ph, "f");
        assert_eq!(view.events[1].tid, 2);
        assert_eq!(view.events[0].id, view.events[1].id);
    }

    #[test]
    fn test_group_rejects_mismatched_threads() {
        let mut view = Chrome::new(Vec::new());
        let result = view.group(
            "synchronization flow",
            "locked by m",
            LogicalTime(1),
            ThreadId(1),
            LogicalTime(2),
            ThreadId(2),
            ViewArgs::new(),
        );
        assert!(matches!(result, Err(ViewError::GroupThreadMismatch(_, _))));
    }

    #[test]
    fn test_close_writes_trace_events_key() {
        let mut view = Chrome::new(Vec::new());
        view.mark("Event(s) aborted", "WARNING", Scope::Global, LogicalTime(5), ThreadId(1))
            .unwrap();
        view.close().unwrap();
        let json: Value = serde_json::from_slice(&view.writer).unwrap();
        assert!(json.get("traceEvents").is_some());
        assert_eq!(json["traceEvents"][0]["s"], "g");
    }
}
