// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers: stateless publish, history queries, permission admin,
//! telemetry ingest, health and dead-letter inspection.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::error::HubError;
use crate::publish;
use crate::state::{epoch_ms, CountersSnapshot, HubState};
use crate::store::permission::{PermissionRecord, Role};
use crate::telemetry::{self, TelemetrySample};
use crate::transport::auth::Principal;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub dead_letters: usize,
    pub counters: CountersSnapshot,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub chat_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub start_key: Option<String>,
    #[serde(default)]
    pub from_time: Option<u64>,
    /// Comma-separated sequence numbers; switches to gap-fill mode.
    #[serde(default)]
    pub sequences: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub messages: Vec<crate::store::history::HistoryRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub target_user_id: String,
    pub chat_id: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeQuery {
    pub user_id: String,
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPermissionsQuery {
    pub user_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub start_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsResponse {
    pub permissions: Vec<PermissionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub removed: bool,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub accepted: bool,
}

const DEFAULT_PAGE: usize = 50;
const MAX_PAGE: usize = 100;

// -- Handlers -----------------------------------------------------------------

/// `GET /health`
pub async fn health(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        sessions: s.registry.len().await,
        dead_letters: s.bus.dlq.len(),
        counters: s.counters.snapshot(),
    })
}

/// `POST /publish` — stateless (A2P) publish. Permission is re-read from the
/// store on every call.
pub async fn publish_message(
    State(s): State<Arc<HubState>>,
    Extension(Principal(principal)): Extension<Principal>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(body)) = body else {
        return HubError::MalformedBody.to_http_response("body is not JSON").into_response();
    };

    let published = tokio::time::timeout(
        s.config.publish_timeout(),
        publish::publish(&s, &principal, None, &body),
    )
    .await;

    match published {
        Ok(Ok(receipt)) => Json(receipt).into_response(),
        Ok(Err(code)) => code.to_http_response("publish rejected").into_response(),
        Err(_) => HubError::BusUnavailable
            .to_http_response("publish timed out")
            .into_response(),
    }
}

/// `GET /messages` — history range listing, or gap-fill when `sequences` is
/// present. The caller is re-authorized against the permission store.
pub async fn history_query(
    State(s): State<Arc<HubState>>,
    Extension(Principal(principal)): Extension<Principal>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    if s.permissions.get(&principal, &query.chat_id).await.is_none() {
        return HubError::NoPermission
            .to_http_response("no permission on chat")
            .into_response();
    }

    let now = epoch_ms();

    if let Some(ref csv) = query.sequences {
        let mut seqs = Vec::new();
        for part in csv.split(',') {
            match part.trim().parse::<u64>() {
                Ok(seq) => seqs.push(seq),
                Err(_) => {
                    return HubError::MalformedBody
                        .to_http_response("sequences must be integers")
                        .into_response()
                }
            }
        }
        let messages = s.history.by_sequences(&query.chat_id, &seqs, now).await;
        return Json(HistoryResponse { messages, next_key: None }).into_response();
    }

    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    match s
        .history
        .range(&query.chat_id, query.from_time, limit, query.start_key.as_deref(), now)
        .await
    {
        Ok((messages, next_key)) => {
            Json(HistoryResponse { messages, next_key }).into_response()
        }
        Err(code) => code.to_http_response("invalid history query").into_response(),
    }
}

/// `POST /permissions` — grant or overwrite a role.
pub async fn grant_permission(
    State(s): State<Arc<HubState>>,
    Extension(Principal(principal)): Extension<Principal>,
    body: Result<Json<GrantRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(req)) = body else {
        return HubError::MalformedBody.to_http_response("invalid grant body").into_response();
    };
    let role = match Role::parse(&req.role) {
        Ok(role) => role,
        Err(code) => {
            return code
                .to_http_response(format!("unknown role {:?}", req.role))
                .into_response()
        }
    };

    let record = s.permissions.grant(&req.target_user_id, &req.chat_id, role, &principal).await;
    tracing::info!(
        target_user = %req.target_user_id,
        chat_id = %req.chat_id,
        role = %role.as_str(),
        granted_by = %principal,
        "permission granted"
    );
    Json(record).into_response()
}

/// `DELETE /permissions?userId=&chatId=`
pub async fn revoke_permission(
    State(s): State<Arc<HubState>>,
    Extension(Principal(principal)): Extension<Principal>,
    Query(query): Query<RevokeQuery>,
) -> impl IntoResponse {
    match s.permissions.revoke(&query.user_id, &query.chat_id).await {
        Some(_) => {
            tracing::info!(
                target_user = %query.user_id,
                chat_id = %query.chat_id,
                revoked_by = %principal,
                "permission revoked"
            );
            Json(RevokeResponse { removed: true }).into_response()
        }
        None => HubError::NotFound.to_http_response("no such grant").into_response(),
    }
}

/// `GET /permissions?userId=`
pub async fn list_permissions(
    State(s): State<Arc<HubState>>,
    Query(query): Query<ListPermissionsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    match s.permissions.list(&query.user_id, limit, query.start_key.as_deref()).await {
        Ok(page) => Json(PermissionsResponse {
            permissions: page.records,
            next_key: page.continuation,
        })
        .into_response(),
        Err(code) => code.to_http_response("invalid continuation token").into_response(),
    }
}

/// `POST /metrics` — client latency sample ingest.
pub async fn ingest_metrics(
    State(s): State<Arc<HubState>>,
    Extension(Principal(principal)): Extension<Principal>,
    body: Result<Json<TelemetrySample>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(sample)) = body else {
        return HubError::MalformedBody.to_http_response("invalid sample").into_response();
    };
    match telemetry::record_sample(&s, &principal, &sample) {
        Ok(()) => Json(MetricsResponse { accepted: true }).into_response(),
        Err(code) => code.to_http_response("sample rejected").into_response(),
    }
}

/// `GET /deadletters` — retry-exhausted envelopes held for inspection.
pub async fn list_dead_letters(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(s.bus.dlq.list())
}
