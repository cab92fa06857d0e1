// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Egress processor: drains a session-channel queue, resolves live
//! recipients and writes frames, reaping endpoints that report gone.
//!
//! FIFO batches contain at most one item per group (the queue guarantees
//! it), so processing a batch concurrently never reorders a chat.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc::error::TrySendError;

use crate::bus::queue::{BusQueue, Delivery, ItemOutcome};
use crate::envelope::Envelope;
use crate::state::{epoch_ms, Counters, HubState};
use crate::transport::ws_msg::ServerFrame;

const EGRESS_BATCH: usize = 16;

/// Spawn the drain loop for one egress queue.
pub fn spawn_egress(state: Arc<HubState>, queue: Arc<BusQueue>) {
    tokio::spawn(async move {
        loop {
            let batch = tokio::select! {
                _ = state.shutdown.cancelled() => break,
                batch = queue.next_batch(EGRESS_BATCH) => batch,
            };

            let results: Vec<(Delivery, ItemOutcome)> = join_all(
                batch.into_iter().map(|delivery| {
                    let state = Arc::clone(&state);
                    async move {
                        let outcome = handle_envelope(&state, &delivery.envelope).await;
                        (delivery, outcome)
                    }
                }),
            )
            .await;

            let dead = queue.complete(results).await;
            for _ in 0..dead {
                Counters::bump(&state.counters.dead_lettered);
            }
        }
        tracing::debug!(queue = %queue.name(), "egress processor stopped");
    });
}

/// Process one envelope: validity checks, recipient resolution, frame writes.
pub(crate) async fn handle_envelope(state: &HubState, envelope: &Envelope) -> ItemOutcome {
    if envelope.chat_id.is_empty() || envelope.publish_time_ms == 0 {
        tracing::warn!(message_id = %envelope.message_id, "malformed envelope on egress queue");
        return ItemOutcome::Drop("malformed".to_owned());
    }

    let now = epoch_ms();
    if envelope.age_ms(now) > state.config.validity_window_ms {
        Counters::bump(&state.counters.expired_dropped);
        tracing::debug!(
            message_id = %envelope.message_id,
            chat_id = %envelope.chat_id,
            age_ms = envelope.age_ms(now),
            "expired envelope dropped"
        );
        return ItemOutcome::Drop("expired".to_owned());
    }

    let sessions = state.registry.lookup_by_chat(&envelope.chat_id).await;
    if sessions.is_empty() {
        tracing::debug!(chat_id = %envelope.chat_id, "no recipients");
        return ItemOutcome::Delivered;
    }

    let frame = ServerFrame::notification(envelope, now);
    let Ok(json) = serde_json::to_string(&frame) else {
        return ItemOutcome::Drop("unserializable frame".to_owned());
    };

    let mut transient = false;
    for session in sessions {
        match session.frames.try_send(json.clone()) {
            Ok(()) => {
                Counters::bump(&state.counters.frames_delivered);
            }
            Err(TrySendError::Closed(_)) => {
                // Endpoint is gone: reap the session, treat the write as done.
                state.registry.drop_session(&session.id).await;
                Counters::bump(&state.counters.endpoints_reaped);
                tracing::info!(
                    session_id = %session.id,
                    chat_id = %envelope.chat_id,
                    "stale endpoint reaped during egress"
                );
            }
            Err(TrySendError::Full(_)) => {
                // Back-pressure on this endpoint: redeliver the whole item.
                transient = true;
                tracing::debug!(
                    session_id = %session.id,
                    message_id = %envelope.message_id,
                    "session buffer full, marking item for redelivery"
                );
            }
        }
    }

    if transient {
        ItemOutcome::Retry("endpoint transient".to_owned())
    } else {
        ItemOutcome::Delivered
    }
}

#[cfg(test)]
#[path = "egress_tests.rs"]
mod tests;
