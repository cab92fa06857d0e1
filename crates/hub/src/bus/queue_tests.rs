// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::{BusQueue, ItemOutcome};
use crate::bus::dlq::DeadLetterHolder;
use crate::envelope::MessageType;
use crate::error::HubError;
use crate::test_support::envelope;

fn queue(ordered: bool, capacity: usize, max_attempts: u32) -> BusQueue {
    BusQueue::new(
        "test.queue".to_owned(),
        ordered,
        capacity,
        max_attempts,
        10, // short redelivery delay keeps tests fast
        Arc::new(DeadLetterHolder::new(16)),
    )
}

#[tokio::test]
async fn delivers_and_completes() -> anyhow::Result<()> {
    let q = queue(true, 100, 3);
    q.enqueue(envelope("chat-a", "m1", MessageType::Fifo)).await?;

    let batch = q.next_batch(10).await;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].envelope.message_id, "m1");

    let results = batch.into_iter().map(|d| (d, ItemOutcome::Delivered)).collect();
    q.complete(results).await;
    assert!(q.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn ordered_queue_holds_one_in_flight_per_group() -> anyhow::Result<()> {
    let q = queue(true, 100, 3);
    q.enqueue(envelope("chat-a", "a1", MessageType::Fifo)).await?;
    q.enqueue(envelope("chat-a", "a2", MessageType::Fifo)).await?;
    q.enqueue(envelope("chat-b", "b1", MessageType::Fifo)).await?;

    // First batch: the head of each group, never two items of one group.
    let batch = q.next_batch(10).await;
    let mut ids: Vec<&str> = batch.iter().map(|d| d.envelope.message_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["a1", "b1"]);

    // chat-a is in flight: a2 must not dispatch yet.
    assert!(tokio::time::timeout(Duration::from_millis(50), q.next_batch(10)).await.is_err());

    let results = batch.into_iter().map(|d| (d, ItemOutcome::Delivered)).collect();
    q.complete(results).await;

    let batch = q.next_batch(10).await;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].envelope.message_id, "a2");
    Ok(())
}

#[tokio::test]
async fn unordered_queue_dispatches_everything_at_once() -> anyhow::Result<()> {
    let q = queue(false, 100, 3);
    for i in 0..5 {
        q.enqueue(envelope("chat-a", &format!("m{i}"), MessageType::Standard)).await?;
    }
    let batch = q.next_batch(10).await;
    assert_eq!(batch.len(), 5, "same chat, but every item has its own group");
    Ok(())
}

#[tokio::test]
async fn failed_head_redelivers_before_its_successor() -> anyhow::Result<()> {
    let q = queue(true, 100, 5);
    q.enqueue(envelope("chat-a", "first", MessageType::Fifo)).await?;
    q.enqueue(envelope("chat-a", "second", MessageType::Fifo)).await?;

    let batch = q.next_batch(10).await;
    assert_eq!(batch[0].envelope.message_id, "first");
    let results = batch
        .into_iter()
        .map(|d| (d, ItemOutcome::Retry("endpoint 5xx".to_owned())))
        .collect();
    q.complete(results).await;

    // The retried head comes back ahead of "second", with attempts bumped.
    let batch = q.next_batch(10).await;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].envelope.message_id, "first");
    assert_eq!(batch[0].attempts, 1);
    Ok(())
}

#[tokio::test]
async fn retry_budget_moves_item_to_dead_letters() -> anyhow::Result<()> {
    let dlq = Arc::new(DeadLetterHolder::new(16));
    let q = BusQueue::new("test.queue".to_owned(), true, 100, 3, 5, Arc::clone(&dlq));
    q.enqueue(envelope("chat-a", "doomed", MessageType::Fifo)).await?;

    let mut dead = 0;
    for _ in 0..3 {
        let batch = q.next_batch(10).await;
        let results = batch
            .into_iter()
            .map(|d| (d, ItemOutcome::Retry("still failing".to_owned())))
            .collect();
        dead += q.complete(results).await;
    }

    assert_eq!(dead, 1);
    assert!(q.is_empty().await);
    let letters = dlq.list();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].envelope.message_id, "doomed");
    assert_eq!(letters[0].attempts, 3);
    assert_eq!(dlq.moved_total(), 1);
    Ok(())
}

#[tokio::test]
async fn dropped_items_are_not_redelivered() -> anyhow::Result<()> {
    let q = queue(true, 100, 3);
    q.enqueue(envelope("chat-a", "stale", MessageType::Fifo)).await?;

    let batch = q.next_batch(10).await;
    let results = batch
        .into_iter()
        .map(|d| (d, ItemOutcome::Drop("expired".to_owned())))
        .collect();
    q.complete(results).await;

    assert!(q.is_empty().await);
    assert!(tokio::time::timeout(Duration::from_millis(50), q.next_batch(10)).await.is_err());
    Ok(())
}

#[tokio::test]
async fn capacity_overflow_is_backpressure() -> anyhow::Result<()> {
    let q = queue(false, 2, 3);
    q.enqueue(envelope("chat-a", "m1", MessageType::Standard)).await?;
    q.enqueue(envelope("chat-a", "m2", MessageType::Standard)).await?;

    let err = q.enqueue(envelope("chat-a", "m3", MessageType::Standard)).await.err();
    assert_eq!(err, Some(HubError::BusUnavailable));
    assert_eq!(q.len().await, 2);
    Ok(())
}
