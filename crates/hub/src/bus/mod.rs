// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal message bus: a FIFO and a Standard topic, each fanning out
//! to an attribute-filtered egress queue and storage queue.
//!
//! The FIFO topic deduplicates content-derived message ids within a window
//! and its queues preserve order per `groupId`; the Standard topic promises
//! neither. Redelivery and the retry budget live in [`queue::BusQueue`];
//! exhausted items land in the [`dlq::DeadLetterHolder`].

pub mod dlq;
pub mod queue;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::HubConfig;
use crate::envelope::{Attributes, Envelope, MessageType};
use crate::error::HubError;
use dlq::DeadLetterHolder;
use queue::BusQueue;

struct Subscription {
    /// Only envelopes whose `targetChannel` attribute equals this value are
    /// delivered.
    target_channel: String,
    queue: Arc<BusQueue>,
}

impl Subscription {
    fn matches(&self, attributes: &Attributes) -> bool {
        self.target_channel == attributes.target_channel
    }
}

struct Topic {
    name: String,
    subscriptions: Vec<Subscription>,
}

impl Topic {
    /// Fan an envelope out to every subscription whose filter matches its
    /// attributes. An envelope matching no subscription is silently filtered
    /// out.
    async fn fan_out(&self, envelope: &Envelope) -> Result<(), HubError> {
        let attributes = Attributes::of(envelope);
        for sub in &self.subscriptions {
            if sub.matches(&attributes) {
                sub.queue.enqueue(envelope.clone()).await?;
            }
        }
        tracing::debug!(
            topic = %self.name,
            message_id = %envelope.message_id,
            chat_id = %envelope.chat_id,
            "envelope accepted"
        );
        Ok(())
    }
}

/// The two-topic bus plus the queue handles its processors drain.
pub struct MessageBus {
    fifo: Topic,
    standard: Topic,
    dedup_window_ms: u64,
    // FIFO content dedup: message id → reservation expiry (epoch ms).
    dedup: Mutex<HashMap<String, u64>>,
    pub dlq: Arc<DeadLetterHolder>,
    pub egress_fifo: Arc<BusQueue>,
    pub egress_standard: Arc<BusQueue>,
    pub storage_fifo: Arc<BusQueue>,
    pub storage_standard: Arc<BusQueue>,
}

impl MessageBus {
    pub fn new(config: &HubConfig) -> Self {
        let dlq = Arc::new(DeadLetterHolder::new(config.dlq_capacity));

        let make_queue = |name: String, ordered: bool| {
            Arc::new(BusQueue::new(
                name,
                ordered,
                config.queue_capacity,
                config.max_delivery_attempts,
                config.redelivery_delay_ms,
                Arc::clone(&dlq),
            ))
        };

        let egress_fifo = make_queue(format!("{}.egress", config.fifo_topic), true);
        let storage_fifo = make_queue(format!("{}.storage", config.fifo_topic), true);
        let egress_standard = make_queue(format!("{}.egress", config.standard_topic), false);
        let storage_standard = make_queue(format!("{}.storage", config.standard_topic), false);

        let fifo = Topic {
            name: config.fifo_topic.clone(),
            subscriptions: vec![
                Subscription {
                    target_channel: config.session_channel.clone(),
                    queue: Arc::clone(&egress_fifo),
                },
                Subscription {
                    target_channel: config.session_channel.clone(),
                    queue: Arc::clone(&storage_fifo),
                },
            ],
        };
        let standard = Topic {
            name: config.standard_topic.clone(),
            subscriptions: vec![
                Subscription {
                    target_channel: config.session_channel.clone(),
                    queue: Arc::clone(&egress_standard),
                },
                Subscription {
                    target_channel: config.session_channel.clone(),
                    queue: Arc::clone(&storage_standard),
                },
            ],
        };

        Self {
            fifo,
            standard,
            dedup_window_ms: config.dedup_window_ms,
            dedup: Mutex::new(HashMap::new()),
            dlq,
            egress_fifo,
            egress_standard,
            storage_fifo,
            storage_standard,
        }
    }

    /// Reserve a FIFO message id for the dedup window. Returns `false` when
    /// the id is already reserved — the publish collapses into the earlier
    /// one and must not be re-enqueued (nor consume a sequence number).
    pub async fn reserve_dedup(&self, message_id: &str, now_ms: u64) -> bool {
        let mut dedup = self.dedup.lock().await;
        dedup.retain(|_, expires| *expires > now_ms);
        if dedup.contains_key(message_id) {
            return false;
        }
        dedup.insert(message_id.to_owned(), now_ms + self.dedup_window_ms);
        true
    }

    /// Hand an accepted envelope to its topic.
    pub async fn publish(&self, envelope: &Envelope) -> Result<(), HubError> {
        match envelope.message_type {
            MessageType::Fifo => self.fifo.fan_out(envelope).await,
            MessageType::Standard => self.standard.fan_out(envelope).await,
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
