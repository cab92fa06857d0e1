// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-chat monotonic sequence counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

/// Hands out strictly increasing sequence numbers per chat.
///
/// The increment is an atomic read-modify-write, so concurrent callers never
/// see the same value twice and the counter itself introduces no gaps.
pub struct SequenceCounter {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self { counters: RwLock::new(HashMap::new()) }
    }

    /// Increment-and-fetch for `chat`. First value handed out is 1.
    pub async fn next(&self, chat: &str) -> u64 {
        let counter = {
            let counters = self.counters.read().await;
            counters.get(chat).map(Arc::clone)
        };

        let counter = match counter {
            Some(c) => c,
            None => {
                let mut counters = self.counters.write().await;
                Arc::clone(counters.entry(chat.to_owned()).or_default())
            }
        };

        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Last value handed out for `chat`, or 0 if none.
    pub async fn current(&self, chat: &str) -> u64 {
        let counters = self.counters.read().await;
        counters.get(chat).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "sequence_tests.rs"]
mod tests;
