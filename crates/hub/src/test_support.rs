// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit tests.

use clap::Parser;

use crate::config::HubConfig;
use crate::envelope::{Envelope, MessageType};
use crate::state::{epoch_ms, iso8601_ms};

/// A config with defaults, suitable for constructing test state.
pub fn test_config() -> HubConfig {
    HubConfig::parse_from(["chathub"])
}

/// An envelope stamped "now" for the default session channel.
pub fn envelope(chat: &str, message_id: &str, message_type: MessageType) -> Envelope {
    envelope_at(chat, message_id, message_type, epoch_ms())
}

pub fn envelope_at(
    chat: &str,
    message_id: &str,
    message_type: MessageType,
    publish_time_ms: u64,
) -> Envelope {
    Envelope {
        message_id: message_id.to_owned(),
        chat_id: chat.to_owned(),
        principal_id: "alice".to_owned(),
        target_channel: "session".to_owned(),
        message_type,
        sequence_number: None,
        publish_time: iso8601_ms(publish_time_ms),
        publish_time_ms,
        group_id: match message_type {
            MessageType::Fifo => Some(chat.to_owned()),
            MessageType::Standard => None,
        },
        payload: serde_json::json!({ "chatId": chat, "text": message_id }),
    }
}
