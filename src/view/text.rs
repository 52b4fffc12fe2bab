//! Columnar text renderer: one line per logical tick, one padded column
//! per driver thread, sorted by thread id ascending (spec §4.4.1).

use std::io::Write;

use unicode_width::UnicodeWidthStr;

use crate::domain::{LogicalTime, ThreadId, ViewError};
use crate::event::EventStatus;
use crate::thread_state::PendEvents;
use crate::view::{Scope, View};

/// Column width in display columns, not bytes — the `│`/`├` glyphs are
/// multibyte in UTF-8 (spec §9 "Unicode widths in text view").
const INITIAL_INDENT: usize = 40;
const GROW_SLACK: usize = 5;

pub struct Text<W: Write> {
    writer: W,
    indent: usize,
}

impl<W: Write> Text<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer, indent: INITIAL_INDENT }
    }

    fn column_for_thread(events: &crate::stack::Stack<crate::event::Event>) -> Option<String> {
        let depth = events.size();
        if depth == 0 {
            return Some(String::new());
        }
        let top = events.top().expect("checked non-empty above");
        match top.status {
            EventStatus::Aborted => None,
            EventStatus::Started => {
                if depth == 1 {
                    Some(top.to_string())
                } else {
                    Some(format!("{}├─{}", "│ ".repeat(depth - 2), top))
                }
            }
            EventStatus::Finished => Some("│ ".repeat(depth - 1)),
            EventStatus::Waiting => Some("│ ".repeat(depth)),
        }
    }

    fn pad_column(&mut self, column: &str) -> String {
        let width = UnicodeWidthStr::width(column);
        let mut empty_columns = self.indent as isize - width as isize;
        if empty_columns <= 0 {
            self.indent += (-empty_columns) as usize + GROW_SLACK;
            empty_columns = self.indent as isize - width as isize;
        }
        format!("{column}{}", " ".repeat(empty_columns as usize))
    }
}

impl<W: Write> View for Text<W> {
    fn timestamp(&mut self, pend_events: &PendEvents) -> Result<(), ViewError> {
        let mut line = String::new();
        for (_thread, state) in pend_events.iter() {
            let Some(column) = Self::column_for_thread(&state.events) else {
                // Any thread whose top event just aborted suppresses the
                // whole row, even columns already built for earlier
                // threads this tick (spec §4.4.1).
                return Ok(());
            };
            line.push_str(&self.pad_column(&column));
        }
        writeln!(self.writer, "{line}")?;
        Ok(())
    }

    fn mark(
        &mut self,
        name: &str,
        category: &str,
        scope: Scope,
        _time: LogicalTime,
        thread: ThreadId,
    ) -> Result<(), ViewError> {
        let scope_str = match scope {
            Scope::Global => "global",
            Scope::Process => "process",
            Scope::Thread => "thread",
        };
        writeln!(self.writer, "{category}: {name} (scope {scope_str}, thread {thread})")?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ViewError> {
        self.writer.flush()?;
        Ok(())
    }
}
