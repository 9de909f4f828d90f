//! Wire format codecs.
//!
//! Parsers collect non-fatal per-line problems into a [`ParseLog`] instead of
//! failing the whole document; a single malformed record must never take down
//! an otherwise usable feed.

pub mod json;
pub mod legacy;
pub mod vatspy;

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLogEntry {
    pub section: String,
    pub content: String,
    pub message: String,
    /// True when the offending record was dropped from the result.
    pub rejected: bool,
}

/// Side channel for decode warnings.
#[derive(Debug, Default)]
pub struct ParseLog {
    entries: Vec<ParseLogEntry>,
}

impl ParseLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(
        &mut self,
        section: impl Into<String>,
        content: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.entries.push(ParseLogEntry {
            section: section.into(),
            content: content.into(),
            message: message.into(),
            rejected: true,
        });
    }

    pub fn note(
        &mut self,
        section: impl Into<String>,
        content: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.entries.push(ParseLogEntry {
            section: section.into(),
            content: content.into(),
            message: message.into(),
            rejected: false,
        });
    }

    pub fn entries(&self) -> &[ParseLogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes all collected entries to the log, prefixed with the name of the
    /// document they came from.
    pub fn log_all(&self, document: &str) {
        for entry in &self.entries {
            warn!(
                document,
                section = %entry.section,
                rejected = entry.rejected,
                content = %entry.content,
                "{}",
                entry.message
            );
        }
    }
}
