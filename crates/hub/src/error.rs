// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kinds surfaced across component boundaries.
///
/// The 4xx codes are permanent (do not retry); the 503-class codes are
/// transient infrastructure faults the caller may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubError {
    TokenInvalid,
    TokenExpired,
    NoPermission,
    MalformedBody,
    MissingField,
    InvalidRole,
    InvalidMessageType,
    NotFound,
    StoreUnavailable,
    BusUnavailable,
    SequencerUnavailable,
    Internal,
}

impl HubError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::TokenInvalid | Self::TokenExpired => 401,
            Self::NoPermission => 403,
            Self::MalformedBody
            | Self::MissingField
            | Self::InvalidRole
            | Self::InvalidMessageType => 400,
            Self::NotFound => 404,
            Self::StoreUnavailable | Self::BusUnavailable | Self::SequencerUnavailable => 503,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::NoPermission => "NO_PERMISSION",
            Self::MalformedBody => "MALFORMED_BODY",
            Self::MissingField => "MISSING_FIELD",
            Self::InvalidRole => "INVALID_ROLE",
            Self::InvalidMessageType => "INVALID_MESSAGE_TYPE",
            Self::NotFound => "NOT_FOUND",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::BusUnavailable => "BUS_UNAVAILABLE",
            Self::SequencerUnavailable => "SEQUENCER_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    /// Whether a caller may retry the operation that produced this error.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable | Self::BusUnavailable | Self::SequencerUnavailable
        )
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for HubError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
