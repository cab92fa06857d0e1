// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical on-bus message types.
//!
//! An [`Envelope`] is owned by whichever stage currently holds it and is
//! never mutated after publish; processors enrich the *outgoing frame*, not
//! the envelope.

use serde::{Deserialize, Serialize};

/// Delivery class of a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Ordered per `groupId`, content-deduplicated within a window.
    Fifo,
    /// Best effort, no ordering promise, rare duplicates.
    Standard,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::Standard => "standard",
        }
    }
}

/// The canonical message shape handed from the publisher to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub message_id: String,
    pub chat_id: String,
    pub principal_id: String,
    pub target_channel: String,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    /// ISO-8601 UTC publish timestamp.
    pub publish_time: String,
    /// Epoch-millis twin of `publish_time`, used for age, sort and TTL math.
    pub publish_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Opaque publisher content. Unknown attributes pass through untouched.
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Envelope age relative to `now_ms`. Zero if the clock went backwards.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.publish_time_ms)
    }
}

/// Routing attributes the bus filters subscriptions on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attributes {
    pub target_channel: String,
    pub chat_id: String,
    pub message_type: MessageType,
    pub publish_time_ms: u64,
}

impl Attributes {
    pub fn of(envelope: &Envelope) -> Self {
        Self {
            target_channel: envelope.target_channel.clone(),
            chat_id: envelope.chat_id.clone(),
            message_type: envelope.message_type,
            publish_time_ms: envelope.publish_time_ms,
        }
    }
}
