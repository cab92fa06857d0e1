// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::bearer_token;
use crate::error::{ErrorResponse, HubError};
use crate::state::HubState;

/// The verified token subject, injected into authenticated requests.
#[derive(Debug, Clone)]
pub struct Principal(pub String);

/// Axum middleware that verifies the bearer token on every route except
/// `/health` and the WebSocket handshake (which authenticates via its
/// `token` query parameter).
///
/// Verification runs under the configured budget and fails closed on
/// timeout.
pub async fn auth_layer(
    State(state): State<Arc<HubState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/health" || path == "/ws" {
        return next.run(req).await;
    }

    let token = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);
    let Some(token) = token else {
        return deny(HubError::TokenInvalid, "missing bearer token");
    };

    let verified =
        tokio::time::timeout(state.config.verify_timeout(), state.verifier.verify(token)).await;
    match verified {
        Ok(Ok(claims)) => {
            req.extensions_mut().insert(Principal(claims.sub));
            next.run(req).await
        }
        Ok(Err(code)) => deny(code, "token rejected"),
        Err(_) => deny(HubError::TokenInvalid, "token verification timed out"),
    }
}

fn deny(code: HubError, message: &str) -> Response {
    let body = ErrorResponse { error: code.to_error_body(message) };
    (
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::UNAUTHORIZED),
        axum::Json(body),
    )
        .into_response()
}
