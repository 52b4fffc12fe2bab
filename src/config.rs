//! Opaque-event configuration and output format selection.
//!
//! Grounded in `sp_gdb_ctrl.py::installBreakpoints`, which reads one
//! primitive name per line from a config file and installs an opaque=false
//! breakpoint for each.

use std::collections::HashMap;
use std::io::BufRead;

use crate::domain::ConfigError;

/// Which [`crate::view::View`] implementation the CLI front-end selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Chrome,
}

/// Maps a primitive name to whether it is opaque (spec §6 "Opaque-event
/// declaration"): opaque primitives suppress nested events on the same
/// thread until they finish.
#[derive(Debug, Clone, Default)]
pub struct OpaqueConfig {
    opaque: HashMap<String, bool>,
}

impl OpaqueConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` opaque or not. Later calls for the same name replace
    /// earlier ones.
    pub fn declare(&mut self, name: impl Into<String>, opaque: bool) {
        self.opaque.insert(name.into(), opaque);
    }

    /// Whether `name` was declared opaque. Names never declared default to
    /// non-opaque, matching the original's default (`opaque=False`) for
    /// every function read from the config file.
    #[must_use]
    pub fn is_opaque(&self, name: &str) -> bool {
        self.opaque.get(name).copied().unwrap_or(false)
    }

    /// Parse a newline-delimited config file: one primitive name per line,
    /// blank lines ignored, all entries default to non-opaque — the format
    /// `sp_gdb_ctrl.py::installBreakpoints` reads.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ConfigError> {
        let mut config = Self::new();
        for line in reader.lines() {
            let line = line?;
            let name = line.trim();
            if name.is_empty() {
                continue;
            }
            config.declare(name, false);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_undeclared_names_are_not_opaque() {
        let config = OpaqueConfig::new();
        assert!(!config.is_opaque("pthread_mutex_lock"));
    }

    #[test]
    fn test_declare_marks_opaque() {
        let mut config = OpaqueConfig::new();
        config.declare("malloc", true);
        assert!(config.is_opaque("malloc"));
        assert!(!config.is_opaque("free"));
    }

    #[test]
    fn test_from_reader_parses_one_name_per_line() {
        let reader = Cursor::new("pthread_mutex_lock\npthread_mutex_unlock\n\nsem_post\n");
        let config = OpaqueConfig::from_reader(reader).unwrap();
        assert!(!config.is_opaque("pthread_mutex_lock"));
        assert!(!config.is_opaque("sem_post"));
    }
}
