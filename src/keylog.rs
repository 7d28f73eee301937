use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

pub const DEFAULT_LOG_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogKind {
    Char,
    MistakeSent,
    MistakeBackspace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub payload: String,
    pub hold_ms: Option<u64>,
}

impl LogEntry {
    pub fn char(c: char, hold_ms: u64) -> Self {
        Self {
            kind: LogKind::Char,
            payload: c.to_string(),
            hold_ms: Some(hold_ms),
        }
    }

    pub fn mistake_sent(decoy: &str) -> Self {
        Self {
            kind: LogKind::MistakeSent,
            payload: decoy.to_string(),
            hold_ms: None,
        }
    }

    pub fn mistake_backspace(count: usize) -> Self {
        Self {
            kind: LogKind::MistakeBackspace,
            payload: count.to_string(),
            hold_ms: None,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LogKind::Char => write!(f, "CHAR:{}", self.payload)?,
            LogKind::MistakeSent => write!(f, "MISTAKE_SENT:{}", self.payload)?,
            LogKind::MistakeBackspace => write!(f, "MISTAKE_BS:{}", self.payload)?,
        }
        if let Some(hold) = self.hold_ms {
            write!(f, " hold={hold}")?;
        }
        Ok(())
    }
}

/// Fixed-capacity keystroke ring buffer. Once full, each append overwrites
/// the oldest entry.
#[derive(Debug, Clone)]
pub struct KeystrokeLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl KeystrokeLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// All held entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Remove and return all held entries, oldest first.
    pub fn drain(&mut self) -> Vec<LogEntry> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for KeystrokeLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_below_capacity() {
        let mut log = KeystrokeLog::new(4);
        log.append(LogEntry::char('a', 20));
        log.append(LogEntry::mistake_sent("xq"));
        log.append(LogEntry::mistake_backspace(2));

        let lines: Vec<String> = log.entries().iter().map(ToString::to_string).collect();
        assert_eq!(lines, vec!["CHAR:a hold=20", "MISTAKE_SENT:xq", "MISTAKE_BS:2"]);
    }

    #[test]
    fn overwrites_oldest_once_full() {
        let mut log = KeystrokeLog::new(3);
        for (i, c) in "abcde".chars().enumerate() {
            log.append(LogEntry::char(c, i as u64));
        }
        assert_eq!(log.len(), 3);
        let payloads: Vec<String> = log.entries().into_iter().map(|e| e.payload).collect();
        assert_eq!(payloads, vec!["c", "d", "e"]);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let mut log = KeystrokeLog::default();
        assert_eq!(log.capacity(), DEFAULT_LOG_CAPACITY);
        log.append(LogEntry::char('z', 1));
        assert_eq!(log.drain().len(), 1);
        assert!(log.is_empty());
    }
}
