// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::sync::Arc;

use super::SequenceCounter;

#[tokio::test]
async fn first_value_is_one() {
    let seq = SequenceCounter::new();
    assert_eq!(seq.next("chat-a").await, 1);
    assert_eq!(seq.next("chat-a").await, 2);
}

#[tokio::test]
async fn chats_are_independent() {
    let seq = SequenceCounter::new();
    assert_eq!(seq.next("chat-a").await, 1);
    assert_eq!(seq.next("chat-b").await, 1);
    assert_eq!(seq.next("chat-a").await, 2);
    assert_eq!(seq.current("chat-b").await, 1);
    assert_eq!(seq.current("chat-missing").await, 0);
}

#[tokio::test]
async fn concurrent_callers_see_no_duplicates_or_gaps() -> anyhow::Result<()> {
    let seq = Arc::new(SequenceCounter::new());
    const TASKS: usize = 16;
    const PER_TASK: usize = 50;

    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let seq = Arc::clone(&seq);
        handles.push(tokio::spawn(async move {
            let mut got = Vec::with_capacity(PER_TASK);
            for _ in 0..PER_TASK {
                got.push(seq.next("chat-y").await);
            }
            got
        }));
    }

    let mut all: Vec<u64> = Vec::new();
    for handle in handles {
        all.extend(handle.await?);
    }

    let unique: HashSet<u64> = all.iter().copied().collect();
    assert_eq!(unique.len(), TASKS * PER_TASK, "no value handed out twice");
    assert_eq!(*unique.iter().min().unwrap_or(&0), 1);
    assert_eq!(*unique.iter().max().unwrap_or(&0), (TASKS * PER_TASK) as u64);
    Ok(())
}

#[tokio::test]
async fn per_task_observations_are_strictly_increasing() -> anyhow::Result<()> {
    let seq = Arc::new(SequenceCounter::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let seq = Arc::clone(&seq);
        handles.push(tokio::spawn(async move {
            let mut prev = 0u64;
            for _ in 0..100 {
                let next = seq.next("chat-z").await;
                assert!(next > prev, "expected {next} > {prev}");
                prev = next;
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }
    Ok(())
}
