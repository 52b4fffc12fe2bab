//! The contract by which an external debugger layer feeds the model.
//!
//! This module is an *interface*, not an implementation: spec.md scopes the
//! actual breakpoint installation, register reads, symbol lookup and
//! backtrace capture to an external "debugger driver" component (e.g. a GDB
//! Python extension, grounded in `sp_gdb_ctrl.py`). Only the shape the core
//! consumes is specified here.

use crate::model::Model;

/// Error a concrete driver may report while running. Opaque on purpose —
/// the core never inspects the cause, only that the run ended.
#[derive(Debug, thiserror::Error)]
#[error("driver error: {0}")]
pub struct DriverError(pub String);

/// Drives a [`Model`] by observing a target process and translating
/// breakpoint hits into `start_event`/`stop_event`/`abort_event` calls.
///
/// # Multiple program counters
///
/// A single symbol may resolve to more than one program counter (spec §9's
/// open question — e.g. a loader splitting a function into sub-breakpoints
/// for C++11 ABI reasons). A conforming driver remembers the first PC a
/// symbol resolved to and silently ignores hits at any other PC for that
/// symbol: it must not forward a second `start_event` for them, only log a
/// `MultiplePCs` warning. The core performs no disambiguation of its own.
///
/// # Out-of-scope completions
///
/// Some primitives never return to their call site (`pthread_exit`, `exit`)
/// so their finish trap cannot fire. A conforming driver logs this as an
/// `OutOfScope` warning and relies on [`Model::flush`] to reap the event
/// rather than synthesizing a fake `stop_event`.
pub trait Driver {
    /// Run to completion (or until the caller's timeout elapses), feeding
    /// `model` every notification observed, and call [`Model::flush`] on
    /// normal or abnormal termination.
    fn run(&mut self, model: &mut Model) -> Result<(), DriverError>;

    /// Hit counts per installed breakpoint location, keyed by the location
    /// string (e.g. `"pthread_mutex_lock"` or a watch expression). Used for
    /// the end-of-run summary (`sp_gdb_ctrl.py::printSummary`).
    fn breakpoint_hits(&self) -> Vec<(String, u64)> {
        Vec::new()
    }

    /// Read the current value of a watchpoint expression as a string, for
    /// an `access`-kind event's `value` field (`sp_gdb_ctrl.py::SPTraceAccess`).
    /// No-op by default, same as `breakpoint_hits`.
    fn watch_value(&self, _expr: &str) -> Option<String> {
        None
    }
}

/// A driver that observes nothing. Useful for wiring the CLI front-end and
/// for tests that drive a [`Model`] directly instead of through a driver.
#[derive(Debug, Default)]
pub struct NullDriver;

impl Driver for NullDriver {
    fn run(&mut self, model: &mut Model) -> Result<(), DriverError> {
        model.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpaqueConfig;
    use crate::view::Text;

    #[test]
    fn test_null_driver_flushes_and_reports_no_hits() {
        let mut model = Model::new(Box::new(Text::new(Vec::new())), OpaqueConfig::new());
        let mut driver = NullDriver;
        assert!(driver.run(&mut model).is_ok());
        assert!(driver.breakpoint_hits().is_empty());
    }
}
