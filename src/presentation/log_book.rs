use crate::domain::models::MessageSeverity;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
    pub severity: MessageSeverity,
}

/// Scrolling log shown in the UI. Oldest entries are dropped past capacity.
pub struct LogBook {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBook {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, message: impl Into<String>, severity: MessageSeverity) {
        let timestamp = chrono::Local::now().format("%H:%M:%S").to_string();
        self.push_at(timestamp, message, severity);
    }

    fn push_at(
        &mut self,
        timestamp: String,
        message: impl Into<String>,
        severity: MessageSeverity,
    ) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp,
            message: message.into(),
            severity,
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_drops_oldest() {
        let mut log = LogBook::new(2);
        log.push_at("10:00:00".into(), "first", MessageSeverity::Info);
        log.push_at("10:00:01".into(), "second", MessageSeverity::Info);
        log.push_at("10:00:02".into(), "third", MessageSeverity::Error);

        let messages: Vec<_> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "third"]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let mut log = LogBook::new(0);
        log.push("a", MessageSeverity::Info);
        log.push("b", MessageSeverity::Info);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries().next().unwrap().message, "b");
    }

    #[test]
    fn test_timestamp_format() {
        let mut log = LogBook::new(4);
        log.push("hello", MessageSeverity::Success);
        let entry = log.entries().next().unwrap();
        assert_eq!(entry.timestamp.len(), 8);
        assert_eq!(entry.timestamp.matches(':').count(), 2);
    }
}
