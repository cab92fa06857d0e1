// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message history store: per-chat records ordered by publish time,
//! with a by-sequence index for gap-fill queries and a TTL contract.
//!
//! Expired records are invisible to readers immediately; the background
//! reaper reclaims them eventually. Readers must not rely on exact
//! reclamation time.

use std::collections::{BTreeMap, HashMap};
use std::collections::btree_map::Entry;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::HubError;

/// A persisted message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub chat_id: String,
    pub message_id: String,
    /// ISO-8601 UTC publish timestamp.
    pub publish_time: String,
    pub publish_time_ms: u64,
    /// Present only when the envelope carried a server-assigned sequence;
    /// unsequenced records never enter the by-sequence index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    pub body: serde_json::Value,
    pub expires_at_ms: u64,
}

#[derive(Default)]
struct ChatHistory {
    // (publish_time_ms, message_id) keeps distinct records with equal
    // timestamps apart while preserving time order.
    by_time: BTreeMap<(u64, String), Arc<HistoryRecord>>,
    by_seq: BTreeMap<u64, Arc<HistoryRecord>>,
}

struct HistoryInner {
    chats: HashMap<String, ChatHistory>,
    total: usize,
}

/// In-process history store with a bounded record count.
pub struct HistoryStore {
    inner: RwLock<HistoryInner>,
    max_records: usize,
}

impl HistoryStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            inner: RwLock::new(HistoryInner { chats: HashMap::new(), total: 0 }),
            max_records,
        }
    }

    /// Write a batch of records. Returns the message ids the store rejected
    /// (capacity exhausted); the caller owns retry semantics for those.
    /// Re-writing an existing record is idempotent and consumes no capacity.
    pub async fn put_batch(&self, records: Vec<HistoryRecord>) -> Vec<String> {
        let mut inner = self.inner.write().await;
        let mut failed = Vec::new();

        for record in records {
            let is_new = inner
                .chats
                .get(&record.chat_id)
                .map(|c| !c.by_time.contains_key(&(record.publish_time_ms, record.message_id.clone())))
                .unwrap_or(true);

            if is_new && inner.total >= self.max_records {
                failed.push(record.message_id);
                continue;
            }

            let record = Arc::new(record);
            let chat = inner.chats.entry(record.chat_id.clone()).or_default();
            if let Some(seq) = record.sequence_number {
                chat.by_seq.insert(seq, Arc::clone(&record));
            }
            chat.by_time
                .insert((record.publish_time_ms, record.message_id.clone()), record);
            if is_new {
                inner.total += 1;
            }
        }

        failed
    }

    /// List records for `chat`, descending by publish time.
    ///
    /// `from_time_ms` bounds the newest record returned (inclusive);
    /// `continuation` resumes a previous page and must be the token handed
    /// back by that page, unchanged.
    pub async fn range(
        &self,
        chat: &str,
        from_time_ms: Option<u64>,
        limit: usize,
        continuation: Option<&str>,
        now_ms: u64,
    ) -> Result<(Vec<HistoryRecord>, Option<String>), HubError> {
        let cursor = match continuation {
            Some(token) => Some(decode_cursor(token)?),
            None => None,
        };

        let inner = self.inner.read().await;
        let Some(history) = inner.chats.get(chat) else {
            return Ok((vec![], None));
        };

        let upper: std::ops::Bound<(u64, String)> = match (&cursor, from_time_ms) {
            // Continuation is exclusive: resume strictly below the last key.
            (Some(c), _) => std::ops::Bound::Excluded(c.clone()),
            (None, Some(ms)) => std::ops::Bound::Included((ms, String::from("\u{10FFFF}"))),
            (None, None) => std::ops::Bound::Unbounded,
        };

        let mut records = Vec::new();
        let mut last_key = None;
        for (key, record) in
            history.by_time.range((std::ops::Bound::Unbounded, upper)).rev()
        {
            if record.expires_at_ms <= now_ms {
                continue;
            }
            records.push((**record).clone());
            last_key = Some(key.clone());
            if records.len() == limit {
                break;
            }
        }

        // Hand back a token only if something below the page might remain.
        let continuation = match last_key {
            Some(key) if records.len() == limit && *history.by_time.keys().next().unwrap_or(&key) < key => {
                Some(encode_cursor(&key))
            }
            _ => None,
        };

        Ok((records, continuation))
    }

    /// Fetch the records carrying exactly the requested sequence numbers.
    /// Sequences that were never stored, or whose records have expired, are
    /// simply absent from the result.
    pub async fn by_sequences(&self, chat: &str, seqs: &[u64], now_ms: u64) -> Vec<HistoryRecord> {
        let inner = self.inner.read().await;
        let Some(history) = inner.chats.get(chat) else {
            return vec![];
        };

        seqs.iter()
            .filter_map(|seq| history.by_seq.get(seq))
            .filter(|record| record.expires_at_ms > now_ms)
            .map(|record| (**record).clone())
            .collect()
    }

    /// Reclaim expired records. Returns how many were removed.
    pub async fn reap(&self, now_ms: u64) -> usize {
        let mut inner = self.inner.write().await;
        let mut removed = 0;

        for history in inner.chats.values_mut() {
            let expired: Vec<(u64, String)> = history
                .by_time
                .iter()
                .filter(|(_, r)| r.expires_at_ms <= now_ms)
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                if let Some(record) = history.by_time.remove(&key) {
                    if let Some(seq) = record.sequence_number {
                        if let Entry::Occupied(entry) = history.by_seq.entry(seq) {
                            if entry.get().message_id == record.message_id {
                                entry.remove();
                            }
                        }
                    }
                    removed += 1;
                }
            }
        }
        inner.chats.retain(|_, c| !c.by_time.is_empty());
        inner.total = inner.total.saturating_sub(removed);
        removed
    }

    /// Records currently held (including expired-but-unreaped ones).
    pub async fn len(&self) -> usize {
        self.inner.read().await.total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn encode_cursor(key: &(u64, String)) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}|{}", key.0, key.1))
}

fn decode_cursor(token: &str) -> Result<(u64, String), HubError> {
    let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| HubError::MalformedBody)?;
    let raw = String::from_utf8(bytes).map_err(|_| HubError::MalformedBody)?;
    let (ms, id) = raw.split_once('|').ok_or(HubError::MalformedBody)?;
    let ms = ms.parse::<u64>().map_err(|_| HubError::MalformedBody)?;
    Ok((ms, id.to_owned()))
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
