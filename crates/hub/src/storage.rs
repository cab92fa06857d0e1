// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage processor: drains a storage queue and persists envelopes to
//! the history store with a TTL.
//!
//! Partial batch failures are retried once inline on the unprocessed subset;
//! whatever still fails is handed back as the per-item failure set so the
//! bus redelivers just those envelopes.

use std::collections::HashSet;
use std::sync::Arc;

use crate::bus::queue::{BusQueue, Delivery, ItemOutcome};
use crate::envelope::Envelope;
use crate::state::{Counters, HubState};
use crate::store::history::HistoryRecord;

const STORAGE_BATCH: usize = 10;

/// Spawn the drain loop for one storage queue.
pub fn spawn_storage(state: Arc<HubState>, queue: Arc<BusQueue>) {
    tokio::spawn(async move {
        loop {
            let batch = tokio::select! {
                _ = state.shutdown.cancelled() => break,
                batch = queue.next_batch(STORAGE_BATCH) => batch,
            };

            let results = persist_batch(&state, batch).await;
            let dead = queue.complete(results).await;
            for _ in 0..dead {
                Counters::bump(&state.counters.dead_lettered);
            }
        }
        tracing::debug!(queue = %queue.name(), "storage processor stopped");
    });
}

/// Persist a batch, retrying the failed subset once.
pub(crate) async fn persist_batch(
    state: &HubState,
    batch: Vec<Delivery>,
) -> Vec<(Delivery, ItemOutcome)> {
    let records: Vec<HistoryRecord> =
        batch.iter().map(|d| record_of(state, &d.envelope)).collect();

    let failed = state.history.put_batch(records).await;
    let failed: HashSet<String> = if failed.is_empty() {
        HashSet::new()
    } else {
        tracing::warn!(
            failed = failed.len(),
            "history batch write partially failed, retrying subset"
        );
        let retry: Vec<HistoryRecord> = batch
            .iter()
            .filter(|d| failed.contains(&d.envelope.message_id))
            .map(|d| record_of(state, &d.envelope))
            .collect();
        state.history.put_batch(retry).await.into_iter().collect()
    };

    batch
        .into_iter()
        .map(|delivery| {
            let outcome = if failed.contains(&delivery.envelope.message_id) {
                ItemOutcome::Retry("history store rejected record".to_owned())
            } else {
                Counters::bump(&state.counters.records_stored);
                ItemOutcome::Delivered
            };
            (delivery, outcome)
        })
        .collect()
}

fn record_of(state: &HubState, envelope: &Envelope) -> HistoryRecord {
    HistoryRecord {
        chat_id: envelope.chat_id.clone(),
        message_id: envelope.message_id.clone(),
        publish_time: envelope.publish_time.clone(),
        publish_time_ms: envelope.publish_time_ms,
        // Absent is not null: unsequenced envelopes stay out of the
        // by-sequence index entirely.
        sequence_number: envelope.sequence_number,
        body: envelope.payload.clone(),
        expires_at_ms: envelope.publish_time_ms + state.config.history_ttl_ms(),
    }
}

/// Spawn the periodic sweep that reclaims expired history records.
pub fn spawn_history_reaper(state: Arc<HubState>) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(state.config.reap_interval());
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            let removed = state.history.reap(crate::state::epoch_ms()).await;
            if removed > 0 {
                tracing::debug!(removed, "reaped expired history records");
            }
        }
    });
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
