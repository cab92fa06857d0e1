// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dead-letter holder (C10): envelopes that exhausted their retry budget,
//! kept around for inspection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::envelope::Envelope;
use crate::state::epoch_ms;

/// A retry-exhausted envelope with its failure context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub envelope: Envelope,
    pub attempts: u32,
    pub reason: String,
    pub queue: String,
    pub moved_at_ms: u64,
}

/// Bounded dead-letter buffer; oldest entries are evicted first.
pub struct DeadLetterHolder {
    entries: Mutex<VecDeque<DeadLetter>>,
    capacity: usize,
    moved_total: AtomicU64,
}

impl DeadLetterHolder {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
            moved_total: AtomicU64::new(0),
        }
    }

    pub fn push(&self, envelope: Envelope, attempts: u32, reason: &str, queue: &str) {
        self.moved_total.fetch_add(1, Ordering::Relaxed);
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(DeadLetter {
            envelope,
            attempts,
            reason: reason.to_owned(),
            queue: queue.to_owned(),
            moved_at_ms: epoch_ms(),
        });
    }

    /// Snapshot of the held entries, oldest first.
    pub fn list(&self) -> Vec<DeadLetter> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total envelopes ever moved here (eviction does not decrement).
    pub fn moved_total(&self) -> u64 {
        self.moved_total.load(Ordering::Relaxed)
    }
}
