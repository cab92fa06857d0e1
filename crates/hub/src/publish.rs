// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ingress publisher, shared by both publish paths.
//!
//! A2P re-reads the permission store on every request; P2P checks against
//! the session's immutable authorized chat set. Everything downstream of the
//! permission check is identical.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::envelope::{Envelope, MessageType};
use crate::error::HubError;
use crate::state::{epoch_ms, iso8601_ms, Counters, HubState};

/// Validated publish parameters, parsed from either the A2P body or the P2P
/// `sendMessage` frame.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub target_channel: String,
    pub message_type: MessageType,
    pub message_group_id: Option<String>,
    pub generate_sequence: bool,
    pub chat_id: String,
    pub payload: serde_json::Value,
}

impl PublishRequest {
    /// Parse and validate the wire shape.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, HubError> {
        let obj = value.as_object().ok_or(HubError::MalformedBody)?;

        let target_channel = obj
            .get("targetChannel")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or(HubError::MissingField)?
            .to_owned();

        let message_type = match obj.get("messageType").and_then(|v| v.as_str()) {
            Some("fifo") => MessageType::Fifo,
            Some("standard") => MessageType::Standard,
            _ => return Err(HubError::InvalidMessageType),
        };

        let payload = obj.get("payload").ok_or(HubError::MissingField)?;
        if !payload.is_object() {
            return Err(HubError::MissingField);
        }
        let chat_id = payload
            .get("chatId")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or(HubError::MissingField)?
            .to_owned();

        let message_group_id = obj
            .get("messageGroupId")
            .and_then(|v| v.as_str())
            .map(str::to_owned);
        let generate_sequence =
            obj.get("generateSequence").and_then(|v| v.as_bool()).unwrap_or(false);

        Ok(Self {
            target_channel,
            message_type,
            message_group_id,
            generate_sequence,
            chat_id,
            payload: payload.clone(),
        })
    }
}

/// What the publisher hands back on bus accept.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub message_id: String,
    pub message_type: String,
    pub target_channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    pub publish_time: String,
}

/// Validate, authorize, sequence and enqueue one message.
///
/// `session_chats` is `Some` on the P2P path (the session's immutable chat
/// set); `None` makes this an A2P publish that re-reads the permission
/// store.
pub async fn publish(
    state: &HubState,
    principal: &str,
    session_chats: Option<&[String]>,
    body: &serde_json::Value,
) -> Result<PublishReceipt, HubError> {
    let request = PublishRequest::from_value(body)?;

    let permitted = match session_chats {
        Some(chats) => chats.iter().any(|c| c == &request.chat_id),
        None => state.permissions.get(principal, &request.chat_id).await.is_some(),
    };
    if !permitted {
        tracing::debug!(
            principal,
            chat_id = %request.chat_id,
            "publish denied: no permission"
        );
        return Err(HubError::NoPermission);
    }

    let now = epoch_ms();
    let publish_time = iso8601_ms(now);

    let (message_id, group_id) = match request.message_type {
        MessageType::Fifo => {
            let group = request
                .message_group_id
                .clone()
                .unwrap_or_else(|| request.chat_id.clone());
            let id = derive_message_id(
                &request.chat_id,
                &request.target_channel,
                &group,
                &request.payload,
            );
            // Reserve before sequencing so a collapsed duplicate never burns
            // a sequence number.
            if !state.bus.reserve_dedup(&id, now).await {
                Counters::bump(&state.counters.duplicates_collapsed);
                tracing::debug!(message_id = %id, "duplicate publish collapsed");
                return Ok(PublishReceipt {
                    message_id: id,
                    message_type: request.message_type.as_str().to_owned(),
                    target_channel: request.target_channel,
                    message_group_id: Some(group),
                    sequence_number: None,
                    publish_time,
                });
            }
            (id, Some(group))
        }
        MessageType::Standard => (uuid::Uuid::new_v4().to_string(), None),
    };

    let sequence_number = if request.message_type == MessageType::Fifo
        && request.generate_sequence
    {
        Some(state.sequencer.next(&request.chat_id).await)
    } else {
        None
    };

    let envelope = Envelope {
        message_id: message_id.clone(),
        chat_id: request.chat_id,
        principal_id: principal.to_owned(),
        target_channel: request.target_channel.clone(),
        message_type: request.message_type,
        sequence_number,
        publish_time: publish_time.clone(),
        publish_time_ms: now,
        group_id: group_id.clone(),
        payload: request.payload,
    };

    state.bus.publish(&envelope).await?;
    Counters::bump(&state.counters.published);

    Ok(PublishReceipt {
        message_id,
        message_type: envelope.message_type.as_str().to_owned(),
        target_channel: request.target_channel,
        message_group_id: group_id,
        sequence_number,
        publish_time,
    })
}

/// Content-derived FIFO message id: identical payloads to the same chat,
/// channel and group hash to the same id within the dedup window. Publish
/// time and sequence are deliberately excluded so retries collapse.
fn derive_message_id(
    chat: &str,
    channel: &str,
    group: &str,
    payload: &serde_json::Value,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chat.as_bytes());
    hasher.update([0x1f]);
    hasher.update(channel.as_bytes());
    hasher.update([0x1f]);
    hasher.update(group.as_bytes());
    hasher.update([0x1f]);
    hasher.update(payload.to_string().as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
#[path = "publish_tests.rs"]
mod tests;
