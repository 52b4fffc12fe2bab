//! The state machine that ingests driver notifications, maintains
//! per-thread event stacks and rendezvous state, synthesizes derived
//! events, infers causal links and drives a [`View`].
//!
//! Line-for-line grounded in `sp_model.py::SPModel`.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::config::OpaqueConfig;
use crate::domain::{LogicalTime, ModelError, NativeHandle, ThreadId};
use crate::event::{Event, EventKind, EventStatus};
use crate::thread_state::PendEvents;
use crate::view::{Scope, View, ViewArgs};

/// Synchronization time step added to the logical clock on every event
/// start and stop.
const TIME_DELTA: u64 = 1;

const SEM_POST: &str = "sem_post";
const SEM_WAIT: &str = "sem_wait";
const COND_BROADCAST: &str = "pthread_cond_broadcast";
const COND_SIGNAL: &str = "pthread_cond_signal";
const COND_WAIT: &str = "pthread_cond_wait";
const COND_TIMEDWAIT: &str = "pthread_cond_timedwait";
const MUTEX_LOCK: &str = "pthread_mutex_lock";
const MUTEX_TRYLOCK: &str = "pthread_mutex_trylock";
const MUTEX_UNLOCK: &str = "pthread_mutex_unlock";
const BARRIER_WAIT: &str = "pthread_barrier_wait";
const THREAD_JOIN: &str = "pthread_join";

fn is_cond_wait(name: &str) -> bool {
    name == COND_WAIT || name == COND_TIMEDWAIT
}

/// The synchronization-event state machine.
///
/// Owns the [`View`] it drives; dropping the model without calling
/// [`Model::flush`] leaves any in-flight events unterminated in the view's
/// eyes, so `flush` (and then `View::close`) should always be called before
/// the model goes away.
pub struct Model {
    pend_events: PendEvents,
    time: LogicalTime,
    sem_posts: HashMap<String, Event>,
    condvar_signals: HashMap<String, Event>,
    opaque_config: OpaqueConfig,
    view: Box<dyn View>,
    any_aborted: bool,
}

impl Model {
    #[must_use]
    pub fn new(view: Box<dyn View>, opaque_config: OpaqueConfig) -> Self {
        Self {
            pend_events: PendEvents::new(),
            time: LogicalTime::ZERO,
            sem_posts: HashMap::new(),
            condvar_signals: HashMap::new(),
            opaque_config,
            view,
            any_aborted: false,
        }
    }

    fn thread_opaque(&self, thread: ThreadId) -> bool {
        self.pend_events
            .get(&thread)
            .is_some_and(|state| !state.events.empty() && state.events.top().unwrap().opaque)
    }

    fn ensure_thread(&mut self, thread: ThreadId) {
        self.pend_events.entry(thread).or_default();
    }

    /// Admit one entry into a traced primitive.
    ///
    /// Returns `Ok(None)` when admission is refused because `thread`'s top
    /// event is opaque and `generated` is `false` (spec §4.3 "Admission
    /// rule"); the caller makes no further use of a refused event.
    #[allow(clippy::too_many_arguments)]
    pub fn start_event(
        &mut self,
        name: impl Into<String>,
        kind: EventKind,
        thread: ThreadId,
        arg1: Option<String>,
        arg2: Option<String>,
        value: Option<String>,
        filename: impl Into<String>,
        line: impl Into<String>,
        backtrace: impl Into<String>,
        generated: bool,
    ) -> Result<Option<Event>, ModelError> {
        if !generated && self.thread_opaque(thread) {
            return Ok(None);
        }
        let name = name.into();
        let opaque = self.opaque_config.is_opaque(&name);
        let mut event =
            Event::new(name, kind, thread, arg1, arg2, value, filename, line, backtrace, opaque, self.time);
        debug!("start_event: event={}", event.diagnostic_string());
        self.time = self.time.advance(TIME_DELTA);

        self.ensure_thread(thread);
        self.pend_events.get_mut(&thread).expect("just ensured").events.push(event.clone());
        self.view.timestamp(&self.pend_events)?;

        self.generate_event(&event)?;

        if event.kind == EventKind::Access {
            // Access events are atomic: admit and immediately finish them.
            let top = self.pend_events.get(&thread).unwrap().events.top().unwrap().clone();
            event = self.stop_event(top)?;
        } else {
            event.status = EventStatus::Waiting;
            self.set_top_status(thread, EventStatus::Waiting);
        }

        self.links(&event)?;
        Ok(Some(event))
    }

    fn set_top_status(&mut self, thread: ThreadId, status: EventStatus) {
        if let Some(state) = self.pend_events.get_mut(&thread) {
            if let Ok(top) = state.events.pop() {
                let mut top = top;
                top.status = status;
                state.events.push(top);
            }
        }
    }

    /// Stop the event and remove it from the waiting stack.
    pub fn stop_event(&mut self, mut event: Event) -> Result<Event, ModelError> {
        debug!("stop_event: event={}", event.diagnostic_string());
        if event.status == EventStatus::Finished {
            return Err(ModelError::AlreadyFinished(event.to_string()));
        }
        event.status = EventStatus::Finished;
        event.stop_time = self.time;
        self.write_back(&event)?;

        self.generate_event(&event)?;
        self.time = self.time.advance(TIME_DELTA);
        self.view.timestamp(&self.pend_events)?;

        self.link_threads(&event)?;
        self.lock_blocks(&event)?;
        self.drop_event(&event)?;
        Ok(event)
    }

    /// Abort the unfinished event and remove it from the waiting stack.
    pub fn abort_event(&mut self, mut event: Event) -> Result<(), ModelError> {
        info!("abort_event: event={}", event);
        if event.status == EventStatus::Aborted {
            return Err(ModelError::AlreadyAborted(event.to_string()));
        }
        event.status = EventStatus::Aborted;
        event.stop_time = self.time;
        self.write_back(&event)?;
        self.view.timestamp(&self.pend_events)?;
        self.drop_event(&event)?;
        self.any_aborted = true;
        // Aborted events did not finish; no causal links are emitted for them.
        Ok(())
    }

    /// Overwrite the stored copy of `event` in its thread's stack (by
    /// position) with the version carrying updated `status`/`stop_time`.
    fn write_back(&mut self, event: &Event) -> Result<(), ModelError> {
        let state = self.pend_events.get_mut(&event.thread).ok_or(ModelError::StackEmpty)?;
        let top = state.events.pop()?;
        if top.start_time != event.start_time || top.name != event.name {
            // Restore and report: the event being finished/aborted is not
            // the top of its thread's stack.
            state.events.push(top);
            return Err(ModelError::NestingBroken(event.name.clone(), event.thread));
        }
        state.events.push(event.clone());
        Ok(())
    }

    fn drop_event(&mut self, event: &Event) -> Result<(), ModelError> {
        let state = self.pend_events.get_mut(&event.thread).ok_or(ModelError::StackEmpty)?;
        let top = state.events.top()?;
        if top.start_time != event.start_time || top.name != event.name {
            return Err(ModelError::NestingBroken(event.name.clone(), event.thread));
        }
        state.events.pop()?;
        Ok(())
    }

    /// Generate view links between synchronization events.
    fn links(&mut self, event: &Event) -> Result<(), ModelError> {
        if event.name == SEM_POST || event.name == SEM_WAIT {
            self.link_rendezvous(
                event,
                "semaphore increment",
                "semaphore",
                &[SEM_POST],
                &[SEM_WAIT],
                true,
            )?;
        } else if event.name == COND_BROADCAST || event.name == COND_SIGNAL || is_cond_wait(&event.name) {
            self.link_rendezvous(
                event,
                "condition satisfied",
                "condition variable",
                &[COND_BROADCAST, COND_SIGNAL],
                &[COND_WAIT, COND_TIMEDWAIT],
                false,
            )?;
        } else if event.name == MUTEX_UNLOCK {
            self.pend_events_link(event, "lock released", "lock", &[MUTEX_LOCK])?;
        } else if event.name == BARRIER_WAIT {
            self.pend_events_link(event, "barrier reached", "barrier", &[BARRIER_WAIT])?;
        }
        Ok(())
    }

    /// Semaphore/condvar rendezvous: `__link` in `sp_model.py`.
    fn link_rendezvous(
        &mut self,
        event: &Event,
        name: &str,
        arg_label: &str,
        src_names: &[&str],
        to_names: &[&str],
        is_sem: bool,
    ) -> Result<(), ModelError> {
        let key = event.arg1.clone().unwrap_or_default();
        if src_names.contains(&event.name.as_str()) {
            let mut wait_found = false;
            for state in self.pend_events.values() {
                for e in state.events.iter_top_first() {
                    if to_names.contains(&e.name.as_str()) && e.arg1 == event.arg1 {
                        wait_found = true;
                        let mut args = ViewArgs::new();
                        args.insert(arg_label.to_string(), e.arg1.clone().unwrap_or_default());
                        self.view
                            .link(
                                "synchronization flow",
                                name,
                                event.start_time,
                                event.thread,
                                self.time,
                                e.thread,
                                args,
                            )?;
                    }
                }
            }
            if !wait_found {
                let table = if is_sem { &mut self.sem_posts } else { &mut self.condvar_signals };
                table.insert(key, event.clone());
            }
        } else if to_names.contains(&event.name.as_str()) {
            let table = if is_sem { &mut self.sem_posts } else { &mut self.condvar_signals };
            if let Some(from_event) = table.remove(&key) {
                let mut args = ViewArgs::new();
                args.insert(arg_label.to_string(), key);
                self.view
                    .link(
                        "synchronization flow",
                        name,
                        from_event.start_time,
                        from_event.thread,
                        event.start_time,
                        event.thread,
                        args,
                    )?;
            }
        }
        Ok(())
    }

    /// Link pending events, such as barriers and locks: `__pendEventsLink`
    /// in `sp_model.py`.
    fn pend_events_link(
        &mut self,
        event: &Event,
        name: &str,
        arg_label: &str,
        pend_names: &[&str],
    ) -> Result<(), ModelError> {
        let stop_time = event.start_time.advance(TIME_DELTA);
        for state in self.pend_events.values() {
            if state.events.empty() {
                continue;
            }
            let pend_event = state.events.top().expect("checked non-empty");
            if pend_event.start_time == event.start_time && pend_event.thread == event.thread {
                continue;
            }
            if pend_names.contains(&pend_event.name.as_str()) && event.arg1 == pend_event.arg1 {
                let mut args = ViewArgs::new();
                args.insert(arg_label.to_string(), event.arg1.clone().unwrap_or_default());
                self.view
                    .link(
                        "synchronization flow",
                        name,
                        event.start_time,
                        event.thread,
                        stop_time,
                        pend_event.thread,
                        args,
                    )?;
            }
        }
        Ok(())
    }

    /// Thread create and join links: `linkThreads` in `sp_model.py`.
    fn link_threads(&mut self, event: &Event) -> Result<(), ModelError> {
        if let Some(new_thread) = event.new_thread.clone() {
            self.ensure_thread(new_thread.driver_tid);
            self.pend_events.get_mut(&new_thread.driver_tid).unwrap().native_handle =
                Some(new_thread.native_handle.clone());
            let mut args = ViewArgs::new();
            args.insert("native_handle".to_string(), new_thread.native_handle.0.clone());
            self.view
                .link(
                    "synchronization flow",
                    "thread started",
                    event.start_time,
                    event.thread,
                    self.time,
                    new_thread.driver_tid,
                    args,
                )?;
        } else if event.name == THREAD_JOIN && event.status == EventStatus::Finished {
            let handle = NativeHandle(event.arg1.clone().unwrap_or_default());
            let matches: Vec<ThreadId> = self
                .pend_events
                .iter()
                .filter(|(_, state)| state.native_handle.as_ref() == Some(&handle))
                .map(|(tid, _)| *tid)
                .collect();
            if matches.len() != 1 {
                return Err(ModelError::JoinTargetAmbiguous(handle.0, matches.len()));
            }
            let joined = matches[0];
            let mut args = ViewArgs::new();
            args.insert("native_handle".to_string(), handle.0);
            self.view
                .link(
                    "synchronization flow",
                    "thread finished",
                    event.stop_time.retreat(TIME_DELTA),
                    joined,
                    event.stop_time,
                    event.thread,
                    args,
                )?;
        }
        Ok(())
    }

    /// Find lock-unlock pairs and emit lock blocks in the view:
    /// `lockBlocks` in `sp_model.py`.
    fn lock_blocks(&mut self, event: &Event) -> Result<(), ModelError> {
        if event.name == MUTEX_LOCK || event.name == MUTEX_TRYLOCK {
            self.pend_events.get_mut(&event.thread).ok_or(ModelError::StackEmpty)?.locks.push(event.clone());
        } else if event.name == MUTEX_UNLOCK {
            let state = self.pend_events.get_mut(&event.thread).ok_or(ModelError::StackEmpty)?;
            let last_lock = state.locks.pop()?;
            if last_lock.arg1 != event.arg1 {
                return Err(ModelError::LockMismatch(event.thread));
            }
            self.lock_block(&last_lock, event.start_time)?;
        }
        Ok(())
    }

    fn lock_block(&mut self, lock_event: &Event, unlock_start_time: LogicalTime) -> Result<(), ModelError> {
        let mut args = ViewArgs::new();
        let lock_name = lock_event.arg1.clone().unwrap_or_default();
        args.insert("lock".to_string(), lock_name.clone());
        let name = format!("locked by {lock_name}");
        self.view.group(
            "synchronization flow",
            &name,
            lock_event.stop_time,
            lock_event.thread,
            unlock_start_time,
            lock_event.thread,
            args,
        )?;
        Ok(())
    }

    /// Generate new events implied by `event`: `generateEvent` in
    /// `sp_model.py`. Condition-variable waits imply a hidden mutex
    /// unlock on entry and a hidden mutex lock on exit.
    fn generate_event(&mut self, event: &Event) -> Result<(), ModelError> {
        if !is_cond_wait(&event.name) {
            return Ok(());
        }
        let lock_name = event.arg2.clone();
        match event.status {
            EventStatus::Started => {
                if let Some(new_event) = self.start_event(
                    MUTEX_UNLOCK,
                    EventKind::Function,
                    event.thread,
                    lock_name,
                    None,
                    None,
                    event.filename.clone(),
                    event.line.clone(),
                    event.backtrace.clone(),
                    true,
                )? {
                    self.stop_event(new_event)?;
                }
            }
            EventStatus::Finished => {
                let saved_time = self.time;
                self.time = self.time.retreat(TIME_DELTA);
                let new_event = self.start_event(
                    MUTEX_LOCK,
                    EventKind::Function,
                    event.thread,
                    lock_name,
                    None,
                    None,
                    event.filename.clone(),
                    event.line.clone(),
                    event.backtrace.clone(),
                    true,
                )?;
                self.time = saved_time;
                if let Some(new_event) = new_event {
                    self.stop_event(new_event)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Force-finish pending events on exit: `flushPendEvents` in
    /// `sp_model.py`.
    pub fn flush(&mut self) {
        let threads: Vec<ThreadId> = self.pend_events.keys().copied().collect();
        let mut any_aborted_here = false;
        for thread in &threads {
            let events: Vec<Event> =
                self.pend_events.get(thread).unwrap().events.iter_top_first().cloned().collect();
            for event in events {
                if self.abort_event(event).is_ok() {
                    any_aborted_here = true;
                }
            }
        }
        if any_aborted_here {
            warn!("Unfinished events at the shutdown");
        }
        for thread in &threads {
            let locks: Vec<Event> =
                self.pend_events.get(thread).unwrap().locks.iter_top_first().cloned().collect();
            for lock in locks {
                let _ = self.lock_block(&lock, self.time);
            }
        }
        if self.any_aborted {
            let _ = self.view.mark("Event(s) aborted", "WARNING", Scope::Global, self.time, ThreadId(1));
        }
        let _ = self.view.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::Chrome;

    fn new_model() -> Model {
        Model::new(Box::new(Chrome::new(Vec::new())), OpaqueConfig::new())
    }

    fn new_model_with_opaque(name: &str) -> Model {
        let mut config = OpaqueConfig::new();
        config.declare(name, true);
        Model::new(Box::new(Chrome::new(Vec::new())), config)
    }

    #[test]
    fn test_access_event_is_finished_atomically() {
        let mut model = new_model();
        let event = model
            .start_event(
                "ACCESS x",
                EventKind::Access,
                ThreadId(1),
                None,
                None,
                Some("42".to_string()),
                "a.c",
                "5",
                "#0",
                false,
            )
            .unwrap()
            .unwrap();
        assert_eq!(event.status, EventStatus::Finished);
        assert!(event.stop_time > event.start_time);
        assert!(model.pend_events.get(&ThreadId(1)).unwrap().events.empty());
    }

    #[test]
    fn test_opaque_top_suppresses_nested_admission() {
        let mut model = new_model_with_opaque("opaque_fn");
        model
            .start_event(
                "opaque_fn",
                EventKind::Function,
                ThreadId(1),
                None,
                None,
                None,
                "a.c",
                "1",
                "#0",
                false,
            )
            .unwrap();
        let nested = model
            .start_event(
                "pthread_mutex_lock",
                EventKind::Function,
                ThreadId(1),
                Some("m".to_string()),
                None,
                None,
                "a.c",
                "2",
                "#0",
                false,
            )
            .unwrap();
        assert!(nested.is_none());
    }

    #[test]
    fn test_stop_event_rejects_already_finished() {
        let mut model = new_model();
        let event = model
            .start_event(
                "pthread_mutex_lock",
                EventKind::Function,
                ThreadId(1),
                Some("m".to_string()),
                None,
                None,
                "a.c",
                "1",
                "#0",
                false,
            )
            .unwrap()
            .unwrap();
        model.stop_event(event.clone()).unwrap();
        let err = model.stop_event(event).unwrap_err();
        assert!(matches!(err, ModelError::AlreadyFinished(_)));
    }

    #[test]
    fn test_lock_unlock_pairs_emit_a_group() {
        let mut model = new_model();
        let lock = model
            .start_event(
                MUTEX_LOCK,
                EventKind::Function,
                ThreadId(1),
                Some("m".to_string()),
                None,
                None,
                "a.c",
                "1",
                "#0",
                false,
            )
            .unwrap()
            .unwrap();
        model.stop_event(lock).unwrap();
        let unlock = model
            .start_event(
                MUTEX_UNLOCK,
                EventKind::Function,
                ThreadId(1),
                Some("m".to_string()),
                None,
                None,
                "a.c",
                "2",
                "#0",
                false,
            )
            .unwrap()
            .unwrap();
        assert!(model.stop_event(unlock).is_ok());
        assert!(model.pend_events.get(&ThreadId(1)).unwrap().locks.empty());
    }

    #[test]
    fn test_mismatched_unlock_fails_nesting() {
        let mut model = new_model();
        let lock = model
            .start_event(
                MUTEX_LOCK,
                EventKind::Function,
                ThreadId(1),
                Some("m1".to_string()),
                None,
                None,
                "a.c",
                "1",
                "#0",
                false,
            )
            .unwrap()
            .unwrap();
        model.stop_event(lock).unwrap();
        let unlock = model
            .start_event(
                MUTEX_UNLOCK,
                EventKind::Function,
                ThreadId(1),
                Some("m2".to_string()),
                None,
                None,
                "a.c",
                "2",
                "#0",
                false,
            )
            .unwrap()
            .unwrap();
        let err = model.stop_event(unlock).unwrap_err();
        assert!(matches!(err, ModelError::LockMismatch(_)));
    }

    #[test]
    fn test_condwait_synthesizes_unlock_then_lock() {
        let mut model = new_model();
        let wait = model
            .start_event(
                COND_WAIT,
                EventKind::Function,
                ThreadId(1),
                Some("cv".to_string()),
                Some("m".to_string()),
                None,
                "a.c",
                "1",
                "#0",
                false,
            )
            .unwrap()
            .unwrap();
        // the synthesized unlock/lock ran during admission; wait should
        // still be the thread's single pending event.
        assert_eq!(model.pend_events.get(&ThreadId(1)).unwrap().events.size(), 1);
        model.stop_event(wait).unwrap();
        assert!(model.pend_events.get(&ThreadId(1)).unwrap().events.empty());
    }

    #[test]
    fn test_flush_aborts_pending_events() {
        let mut model = new_model();
        model
            .start_event(
                MUTEX_LOCK,
                EventKind::Function,
                ThreadId(1),
                Some("m".to_string()),
                None,
                None,
                "a.c",
                "1",
                "#0",
                false,
            )
            .unwrap();
        model.flush();
        assert!(model.pend_events.get(&ThreadId(1)).unwrap().events.empty());
        assert!(model.any_aborted);
    }
}
