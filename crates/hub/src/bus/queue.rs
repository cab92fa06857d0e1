// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded per-subscription queue with per-item redelivery.
//!
//! Ordered queues hold at most one in-flight item per group: the dispatcher
//! hands out only group heads, and a failed head returns to the front of its
//! group, so order within a group survives redelivery. Unordered queues give
//! every item its own group, which makes all of them dispatchable at once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{Mutex, Notify};

use crate::bus::dlq::DeadLetterHolder;
use crate::envelope::Envelope;
use crate::error::HubError;
use crate::state::epoch_ms;

struct QueueItem {
    envelope: Envelope,
    attempts: u32,
    not_before_ms: u64,
}

/// An item handed to a processor. The group stays in flight until the
/// delivery is completed.
pub struct Delivery {
    pub envelope: Envelope,
    pub attempts: u32,
    group: String,
}

/// Per-item batch outcome reported back by a processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Done; never redelivered.
    Delivered,
    /// Transient failure; redeliver after a delay until the budget runs out.
    Retry(String),
    /// Permanent failure; drop without redelivery.
    Drop(String),
}

struct QueueInner {
    groups: HashMap<String, VecDeque<QueueItem>>,
    inflight: HashSet<String>,
    len: usize,
}

pub struct BusQueue {
    name: String,
    ordered: bool,
    capacity: usize,
    max_attempts: u32,
    redelivery_delay_ms: u64,
    dlq: Arc<DeadLetterHolder>,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl BusQueue {
    pub fn new(
        name: String,
        ordered: bool,
        capacity: usize,
        max_attempts: u32,
        redelivery_delay_ms: u64,
        dlq: Arc<DeadLetterHolder>,
    ) -> Self {
        Self {
            name,
            ordered,
            capacity,
            max_attempts,
            redelivery_delay_ms,
            dlq,
            inner: Mutex::new(QueueInner {
                groups: HashMap::new(),
                inflight: HashSet::new(),
                len: 0,
            }),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue an envelope. Fails with *BusUnavailable* at capacity — the
    /// publisher surfaces that as retryable back-pressure.
    pub async fn enqueue(&self, envelope: Envelope) -> Result<(), HubError> {
        let group = if self.ordered {
            envelope
                .group_id
                .clone()
                .unwrap_or_else(|| envelope.chat_id.clone())
        } else {
            envelope.message_id.clone()
        };

        {
            let mut inner = self.inner.lock().await;
            if inner.len >= self.capacity {
                tracing::warn!(queue = %self.name, "queue at capacity, rejecting publish");
                return Err(HubError::BusUnavailable);
            }
            inner.len += 1;
            inner.groups.entry(group).or_default().push_back(QueueItem {
                envelope,
                attempts: 0,
                not_before_ms: 0,
            });
        }
        // Single consumer per queue: notify_one's stored permit means a
        // wakeup between lock release and the consumer's next await is kept.
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for up to `max` dispatchable items: the head of every group not
    /// currently in flight whose redelivery delay has elapsed. Taken groups
    /// are held in flight until [`complete`](Self::complete).
    pub async fn next_batch(&self, max: usize) -> Vec<Delivery> {
        loop {
            let (batch, next_wake_ms) = {
                let mut inner = self.inner.lock().await;
                let now = epoch_ms();
                let mut batch = Vec::new();
                let mut next_wake: Option<u64> = None;

                let ready: Vec<String> = inner
                    .groups
                    .iter()
                    .filter(|(group, items)| {
                        !inner.inflight.contains(*group)
                            && items.front().is_some_and(|i| i.not_before_ms <= now)
                    })
                    .map(|(group, _)| group.clone())
                    .collect();

                for group in ready.into_iter().take(max) {
                    if let Some(item) =
                        inner.groups.get_mut(&group).and_then(VecDeque::pop_front)
                    {
                        inner.inflight.insert(group.clone());
                        batch.push(Delivery {
                            envelope: item.envelope,
                            attempts: item.attempts,
                            group,
                        });
                    }
                }

                if batch.is_empty() {
                    // Nothing ready: maybe a delayed head to wake up for.
                    for (group, items) in &inner.groups {
                        if inner.inflight.contains(group) {
                            continue;
                        }
                        if let Some(item) = items.front() {
                            next_wake = Some(match next_wake {
                                Some(ms) => ms.min(item.not_before_ms),
                                None => item.not_before_ms,
                            });
                        }
                    }
                }
                (batch, next_wake)
            };

            if !batch.is_empty() {
                return batch;
            }

            match next_wake_ms {
                Some(wake) => {
                    let delay = wake.saturating_sub(epoch_ms()).max(1);
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(std::time::Duration::from_millis(delay)) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    /// Report per-item outcomes for a batch, releasing the groups. Retried
    /// items return to the front of their group with a jittered delay; items
    /// that exhausted the attempt budget move to the dead-letter holder.
    /// Returns how many items were dead-lettered.
    pub async fn complete(&self, results: Vec<(Delivery, ItemOutcome)>) -> usize {
        let mut dead = 0;
        {
            let mut inner = self.inner.lock().await;
            let now = epoch_ms();

            for (delivery, outcome) in results {
                inner.inflight.remove(&delivery.group);
                match outcome {
                    ItemOutcome::Delivered => {
                        inner.len -= 1;
                    }
                    ItemOutcome::Drop(reason) => {
                        tracing::debug!(
                            queue = %self.name,
                            message_id = %delivery.envelope.message_id,
                            reason = %reason,
                            "item dropped"
                        );
                        inner.len -= 1;
                    }
                    ItemOutcome::Retry(reason) => {
                        let attempts = delivery.attempts + 1;
                        if attempts >= self.max_attempts {
                            tracing::warn!(
                                queue = %self.name,
                                message_id = %delivery.envelope.message_id,
                                attempts,
                                reason = %reason,
                                "retry budget exhausted, dead-lettering"
                            );
                            self.dlq.push(delivery.envelope, attempts, &reason, &self.name);
                            inner.len -= 1;
                            dead += 1;
                        } else {
                            let jitter =
                                rand::rng().random_range(0..=self.redelivery_delay_ms / 2);
                            inner
                                .groups
                                .entry(delivery.group)
                                .or_default()
                                .push_front(QueueItem {
                                    envelope: delivery.envelope,
                                    attempts,
                                    not_before_ms: now + self.redelivery_delay_ms + jitter,
                                });
                        }
                    }
                }
            }
            inner.groups.retain(|_, items| !items.is_empty());
        }
        self.notify.notify_one();
        dead
    }

    /// Items currently queued or in flight.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
