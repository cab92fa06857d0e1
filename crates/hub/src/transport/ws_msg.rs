// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket frame types for the session channel.

use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, MessageType};
use crate::error::ErrorBody;

/// Frames the server writes to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake accepted; the session is bound to `chat_ids` for life.
    #[serde(rename_all = "camelCase")]
    Connected { session_id: String, chat_ids: Vec<String> },
    /// Result of a `sendMessage` op, correlated by the client's `ackId`.
    #[serde(rename_all = "camelCase")]
    Ack {
        #[serde(skip_serializing_if = "Option::is_none")]
        ack_id: Option<String>,
        status: AckStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
    },
    /// A delivered message, enriched at the egress processor.
    #[serde(rename_all = "camelCase")]
    Notification {
        message_id: String,
        chat_id: String,
        principal_id: String,
        message_type: MessageType,
        #[serde(skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
        publish_time: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        group_id: Option<String>,
        payload: serde_json::Value,
        received_timestamp: String,
        latency_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Ok,
    Error,
}

impl ServerFrame {
    /// Build a notification frame for an envelope received `now_ms`.
    pub fn notification(envelope: &Envelope, now_ms: u64) -> Self {
        Self::Notification {
            message_id: envelope.message_id.clone(),
            chat_id: envelope.chat_id.clone(),
            principal_id: envelope.principal_id.clone(),
            message_type: envelope.message_type,
            sequence_number: envelope.sequence_number,
            publish_time: envelope.publish_time.clone(),
            group_id: envelope.group_id.clone(),
            payload: envelope.payload.clone(),
            received_timestamp: crate::state::iso8601_ms(now_ms),
            latency_ms: envelope.age_ms(now_ms),
        }
    }
}

/// Operations a client sends on an open session. Only `sendMessage` is
/// routed; anything else draws an error ack.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        #[serde(default)]
        ack_id: Option<String>,
        #[serde(flatten)]
        body: serde_json::Value,
    },
}
