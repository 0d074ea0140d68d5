//! Correlates submit request ids with what was submitted, until the pool answers.
use std::{collections::HashMap, time::Instant};

#[derive(Debug, Clone, Copy)]
pub struct PendingSubmission {
    pub difficulty: u64,
    pub submitted_at: Instant,
}

impl PendingSubmission {
    pub fn new(difficulty: u64) -> Self {
        Self {
            difficulty,
            submitted_at: Instant::now(),
        }
    }

    /// Milliseconds since the submit request was sent.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.submitted_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: HashMap<u64, PendingSubmission>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64, submission: PendingSubmission) {
        self.entries.insert(id, submission);
    }

    /// Removes and returns the entry for `id`, if the request is still outstanding.
    pub fn take(&mut self, id: u64) -> Option<PendingSubmission> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Empties the table, returning the outstanding entries ordered by request id.
    pub fn drain(&mut self) -> Vec<(u64, PendingSubmission)> {
        let mut entries: Vec<_> = self.entries.drain().collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
