//! Bounded in-memory history of past generations.
//!
//! Each successful generation is recorded at the front of the history; when the
//! capacity is reached the oldest record is evicted. Records are exposed as MCP
//! resources addressed by their current positional index (0 = most recent), so
//! indices shift as new generations arrive.

use std::collections::VecDeque;
use std::time::SystemTime;

/// Maximum number of characters of the prompt shown in resource labels.
const LABEL_MAX_CHARS: usize = 50;

/// A single cached generation result.
#[derive(Debug, Clone)]
pub struct GenerationRecord {
    /// Prompt that produced this generation.
    pub prompt: String,
    /// Upstream response payload, passed through opaquely.
    pub response: serde_json::Value,
    /// When the generation completed.
    pub created_at: SystemTime,
}

impl GenerationRecord {
    /// Short label for resource listings: the prompt truncated to 50 characters.
    pub fn label(&self) -> String {
        let mut label: String = self.prompt.chars().take(LABEL_MAX_CHARS).collect();
        if self.prompt.chars().count() > LABEL_MAX_CHARS {
            label.push_str("...");
        }
        label
    }
}

/// Bounded, newest-first history of generation records.
#[derive(Debug)]
pub struct GenerationHistory {
    records: VecDeque<GenerationRecord>,
    capacity: usize,
}

impl GenerationHistory {
    /// Create an empty history holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a successful generation at the front of the history.
    ///
    /// Evicts the oldest record when the history is at capacity.
    pub fn record(&mut self, prompt: impl Into<String>, response: serde_json::Value) {
        self.records.push_front(GenerationRecord {
            prompt: prompt.into(),
            response,
            created_at: SystemTime::now(),
        });
        self.records.truncate(self.capacity);
    }

    /// Iterate over records, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &GenerationRecord> {
        self.records.iter()
    }

    /// Look up a record by positional index (0 = most recent).
    pub fn get(&self, index: usize) -> Option<&GenerationRecord> {
        self.records.get(index)
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
