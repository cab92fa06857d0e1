// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live session registry.
//!
//! Primary map `sessionId → SessionHandle` plus a secondary index
//! `chatId → set<sessionId>`. Both are mutated under a single write lock, so
//! no reader ever observes the index out of sync with the primary record.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// A live bidirectional session. The egress frame channel is written by the
/// egress processor alone; the WebSocket loop owns the receiving end.
pub struct SessionHandle {
    pub id: String,
    pub principal_id: String,
    /// Authorized chats, immutable for the session's lifetime.
    pub chat_ids: Vec<String>,
    pub opened_at_ms: u64,
    pub frames: mpsc::Sender<String>,
    pub cancel: CancellationToken,
}

struct RegistryInner {
    sessions: HashMap<String, Arc<SessionHandle>>,
    by_chat: HashMap<String, HashSet<String>>,
}

/// Registry of open sessions with a by-chat recipient index.
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                sessions: HashMap::new(),
                by_chat: HashMap::new(),
            }),
        }
    }

    /// Register a session. Replaces any previous entry under the same id
    /// (last writer wins), cancelling the displaced session.
    pub async fn open(&self, handle: SessionHandle) -> Arc<SessionHandle> {
        let handle = Arc::new(handle);
        let mut inner = self.inner.write().await;

        if let Some(old) = inner.sessions.remove(&handle.id) {
            unindex(&mut inner.by_chat, &old);
            old.cancel.cancel();
        }

        for chat in &handle.chat_ids {
            inner.by_chat.entry(chat.clone()).or_default().insert(handle.id.clone());
        }
        inner.sessions.insert(handle.id.clone(), Arc::clone(&handle));
        handle
    }

    /// Clean disconnect. Returns the removed handle, if any.
    pub async fn close(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.remove(session_id).await
    }

    /// Forced removal: stale endpoint reaping or administrative kill. Also
    /// cancels the session so its WebSocket loop tears down.
    pub async fn drop_session(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        let removed = self.remove(session_id).await;
        if let Some(ref handle) = removed {
            handle.cancel.cancel();
            tracing::info!(session_id, "session dropped");
        }
        removed
    }

    /// Sessions currently subscribed to `chat`.
    pub async fn lookup_by_chat(&self, chat: &str) -> Vec<Arc<SessionHandle>> {
        let inner = self.inner.read().await;
        let Some(ids) = inner.by_chat.get(chat) else {
            return vec![];
        };
        ids.iter().filter_map(|id| inner.sessions.get(id)).map(Arc::clone).collect()
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.inner.read().await.sessions.get(session_id).map(Arc::clone)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn remove(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        let mut inner = self.inner.write().await;
        let removed = inner.sessions.remove(session_id);
        if let Some(ref handle) = removed {
            unindex(&mut inner.by_chat, handle);
        }
        removed
    }
}

fn unindex(by_chat: &mut HashMap<String, HashSet<String>>, handle: &SessionHandle) {
    for chat in &handle.chat_ids {
        if let Some(ids) = by_chat.get_mut(chat) {
            ids.remove(&handle.id);
            if ids.is_empty() {
                by_chat.remove(chat);
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
