// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Permission store: `(principal, chat) → role` with a by-chat view.
//!
//! `get` sits on the authorization critical path of every publish, so reads
//! take a shared lock and clone a single record.

use std::collections::{BTreeMap, HashMap, HashSet};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::HubError;
use crate::state::epoch_ms;

/// Role a principal holds within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
    Viewer,
}

impl Role {
    /// Parse a wire role string. Values outside the enumerated set are
    /// rejected at write time.
    pub fn parse(s: &str) -> Result<Self, HubError> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            "viewer" => Ok(Self::Viewer),
            _ => Err(HubError::InvalidRole),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Viewer => "viewer",
        }
    }
}

/// A single grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRecord {
    pub principal_id: String,
    pub chat_id: String,
    pub role: Role,
    pub granted_at: u64,
    pub granted_by: String,
}

/// A page of grants plus an opaque continuation token.
#[derive(Debug, Clone)]
pub struct PermissionPage {
    pub records: Vec<PermissionRecord>,
    pub continuation: Option<String>,
}

struct PermissionInner {
    // Per principal, ordered by chat so pagination is stable.
    by_principal: HashMap<String, BTreeMap<String, PermissionRecord>>,
    // chat → principals, the members-of-a-chat view.
    by_chat: HashMap<String, HashSet<String>>,
}

/// In-process permission store.
pub struct PermissionStore {
    inner: RwLock<PermissionInner>,
}

impl Default for PermissionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PermissionInner {
                by_principal: HashMap::new(),
                by_chat: HashMap::new(),
            }),
        }
    }

    /// Point lookup for `(principal, chat)`.
    pub async fn get(&self, principal: &str, chat: &str) -> Option<PermissionRecord> {
        let inner = self.inner.read().await;
        inner.by_principal.get(principal).and_then(|chats| chats.get(chat)).cloned()
    }

    /// List a principal's grants, paginated. `continuation` is the opaque
    /// token from a previous page and must be passed through unchanged.
    pub async fn list(
        &self,
        principal: &str,
        limit: usize,
        continuation: Option<&str>,
    ) -> Result<PermissionPage, HubError> {
        let after = match continuation {
            Some(token) => Some(decode_cursor(token)?),
            None => None,
        };

        let inner = self.inner.read().await;
        let Some(chats) = inner.by_principal.get(principal) else {
            return Ok(PermissionPage { records: vec![], continuation: None });
        };

        let mut records: Vec<PermissionRecord> = chats
            .iter()
            .filter(|(chat, _)| after.as_deref().is_none_or(|a| chat.as_str() > a))
            .take(limit + 1)
            .map(|(_, rec)| rec.clone())
            .collect();

        let continuation = if records.len() > limit {
            records.truncate(limit);
            records.last().map(|r| encode_cursor(&r.chat_id))
        } else {
            None
        };

        Ok(PermissionPage { records, continuation })
    }

    /// Create or overwrite a grant. Idempotent: re-granting the same role is
    /// a no-op and leaves the existing record untouched; a different role
    /// overwrites with a fresh record.
    pub async fn grant(
        &self,
        principal: &str,
        chat: &str,
        role: Role,
        granted_by: &str,
    ) -> PermissionRecord {
        let mut inner = self.inner.write().await;

        if let Some(existing) =
            inner.by_principal.get(principal).and_then(|chats| chats.get(chat))
        {
            if existing.role == role {
                return existing.clone();
            }
        }

        let record = PermissionRecord {
            principal_id: principal.to_owned(),
            chat_id: chat.to_owned(),
            role,
            granted_at: epoch_ms(),
            granted_by: granted_by.to_owned(),
        };
        inner
            .by_principal
            .entry(principal.to_owned())
            .or_default()
            .insert(chat.to_owned(), record.clone());
        inner.by_chat.entry(chat.to_owned()).or_default().insert(principal.to_owned());
        record
    }

    /// Remove a grant. Returns the removed record, or `None` if absent.
    pub async fn revoke(&self, principal: &str, chat: &str) -> Option<PermissionRecord> {
        let mut inner = self.inner.write().await;
        let removed = inner.by_principal.get_mut(principal).and_then(|chats| chats.remove(chat));
        if removed.is_some() {
            if let Some(principals) = inner.by_chat.get_mut(chat) {
                principals.remove(principal);
                if principals.is_empty() {
                    inner.by_chat.remove(chat);
                }
            }
        }
        removed
    }

    /// Principals holding any role in `chat`.
    pub async fn members_of(&self, chat: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.by_chat.get(chat).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }
}

fn encode_cursor(chat: &str) -> String {
    URL_SAFE_NO_PAD.encode(chat.as_bytes())
}

fn decode_cursor(token: &str) -> Result<String, HubError> {
    let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| HubError::MalformedBody)?;
    String::from_utf8(bytes).map_err(|_| HubError::MalformedBody)
}

#[cfg(test)]
#[path = "permission_tests.rs"]
mod tests;
