//! Bounded working memory with FIFO eviction and secure erasure
//!
//! Holds the most recent interactions in insertion order. When the buffer
//! exceeds its capacity the oldest entry is evicted and its text zeroized
//! before being dropped. `context()` presents the buffer most-recent-first;
//! that reversal happens at read time, storage stays oldest-first.
//!
//! All operations take a short synchronous lock and never suspend.

use super::interaction::Interaction;
use crate::config::WORKING_MAX_SIZE;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Capacity-limited recency buffer.
pub struct WorkingMemory {
    inner: Mutex<WorkingInner>,
}

struct WorkingInner {
    /// front = oldest, back = newest
    entries: VecDeque<Interaction>,
    capacity: usize,
}

impl WorkingMemory {
    /// Create a working memory holding at most `capacity` interactions.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(WorkingInner {
                entries: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    /// Create a working memory with the default capacity.
    pub fn with_default_capacity() -> Self {
        Self::new(WORKING_MAX_SIZE)
    }

    fn lock(&self) -> MutexGuard<'_, WorkingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an interaction, evicting the oldest if over capacity.
    /// Returns the evicted interaction's ID if eviction occurred.
    pub fn append(&self, interaction: Interaction) -> Option<Uuid> {
        let mut inner = self.lock();
        inner.entries.push_back(interaction);

        if inner.entries.len() > inner.capacity {
            inner.entries.pop_front().map(|mut evicted| {
                let id = evicted.id();
                evicted.erase();
                id
            })
        } else {
            None
        }
    }

    /// Current contents, most recent first.
    pub fn context(&self) -> Vec<Interaction> {
        self.lock().entries.iter().rev().cloned().collect()
    }

    /// The `n` most recent interactions, most recent first.
    pub fn recent(&self, n: usize) -> Vec<Interaction> {
        self.lock().entries.iter().rev().take(n).cloned().collect()
    }

    /// Render the buffer oldest-first as conversation turns for prompt assembly.
    pub fn render(&self) -> String {
        let inner = self.lock();
        let mut out = String::new();
        for interaction in &inner.entries {
            out.push_str("User: ");
            out.push_str(interaction.user_msg());
            out.push_str("\nAssistant: ");
            out.push_str(interaction.assistant_msg());
            out.push('\n');
        }
        out
    }

    /// Number of buffered interactions.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Get the capacity.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Clear all entries, securely erasing each one.
    pub fn clear(&self) {
        let mut inner = self.lock();
        for entry in inner.entries.iter_mut() {
            entry.erase();
        }
        inner.entries.clear();
    }
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
