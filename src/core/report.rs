//! Bounded per-table error recording
//!
//! Each table keeps at most a fixed number of error entries. Anything past
//! that limit is only counted, and rendered as "... and N more".

use crate::domain::{ErrorClass, TabportError};

/// Default cap on recorded errors per table
pub const DEFAULT_MAX_RECORDED_ERRORS: usize = 20;

/// A single recorded error with its batch context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    pub class: ErrorClass,
    /// Batch sequence, when the error belongs to one batch
    pub sequence: Option<usize>,
    pub message: String,
}

impl RecordedError {
    pub fn from_error(error: &TabportError, sequence: Option<usize>) -> Self {
        Self {
            class: error.class(),
            sequence,
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for RecordedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sequence {
            Some(seq) => write!(f, "[{}] batch {}: {}", self.class, seq, self.message),
            None => write!(f, "[{}] {}", self.class, self.message),
        }
    }
}

/// Error list that stops storing entries after `limit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedErrors {
    limit: usize,
    entries: Vec<RecordedError>,
    dropped: usize,
}

impl RecordedErrors {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: Vec::new(),
            dropped: 0,
        }
    }

    pub fn record(&mut self, error: &TabportError, sequence: Option<usize>) {
        if self.entries.len() < self.limit {
            self.entries.push(RecordedError::from_error(error, sequence));
        } else {
            self.dropped += 1;
        }
    }

    pub fn entries(&self) -> &[RecordedError] {
        &self.entries
    }

    /// Number of errors that did not fit
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Total errors seen, stored or not
    pub fn total(&self) -> usize {
        self.entries.len() + self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn count_class(&self, class: ErrorClass) -> usize {
        self.entries.iter().filter(|e| e.class == class).count()
    }

    /// Human-readable lines, with a truncation marker when needed
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.entries.iter().map(ToString::to_string).collect();
        if self.dropped > 0 {
            lines.push(format!("... and {} more", self.dropped));
        }
        lines
    }
}

impl Default for RecordedErrors {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDED_ERRORS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_until_limit() {
        let mut errors = RecordedErrors::new(2);
        for i in 0..5 {
            errors.record(&TabportError::Database(format!("boom {i}")), Some(i));
        }

        assert_eq!(errors.entries().len(), 2);
        assert_eq!(errors.dropped(), 3);
        assert_eq!(errors.total(), 5);

        let lines = errors.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "[StorageError] batch 0: Database error: boom 0");
        assert_eq!(lines[2], "... and 3 more");
    }

    #[test]
    fn test_count_class() {
        let mut errors = RecordedErrors::default();
        errors.record(&TabportError::Conflict("dup".into()), Some(1));
        errors.record(&TabportError::integrity("t", "a", "b"), None);

        assert_eq!(errors.count_class(ErrorClass::Conflict), 1);
        assert_eq!(errors.count_class(ErrorClass::Integrity), 1);
        assert!(errors.lines()[1].starts_with("[IntegrityError] Integrity error"));
    }
}
