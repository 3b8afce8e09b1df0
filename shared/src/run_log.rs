//! Ordered per-run log.
//!
//! A rebuild run always hands its caller a complete, ordered record of what
//! happened, even when the underlying work failed. Entries are mirrored to
//! `tracing` as they are recorded, so operators see them live while the
//! collected log travels back in the run report.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.entries.push(LogEntry {
            level: LogLevel::Info,
            message,
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.entries.push(LogEntry {
            level: LogLevel::Error,
            message,
        });
    }

    /// Append another log, preserving its internal order.
    pub fn extend(&mut self, other: RunLog) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.level == LogLevel::Error)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_entries_in_order() {
        let mut log = RunLog::new();
        log.info("first");
        log.error("second");
        log.info("third");

        let messages: Vec<&str> = log
            .entries()
            .iter()
            .map(|entry| entry.message.as_str())
            .collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(log.error_count(), 1);
    }

    #[test]
    fn extend_preserves_order() {
        let mut log = RunLog::new();
        log.info("outer");

        let mut inner = RunLog::new();
        inner.info("inner one");
        inner.error("inner two");

        log.extend(inner);
        assert_eq!(log.entries().len(), 3);
        assert_eq!(log.entries()[2].level, LogLevel::Error);
    }

    #[test]
    fn serializes_as_entry_list() {
        let mut log = RunLog::new();
        log.info("hello");

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "level": "info", "message": "hello" }])
        );
    }
}
