// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telemetry sink: end-to-end latency samples reported by clients,
//! written as structured records for the observability pipeline.

use serde::Deserialize;

use crate::error::HubError;
use crate::state::{Counters, HubState};

/// A client-reported latency sample.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub latency: Option<f64>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Validate and record one sample.
pub fn record_sample(
    state: &HubState,
    principal: &str,
    sample: &TelemetrySample,
) -> Result<(), HubError> {
    let latency = sample.latency.ok_or(HubError::MissingField)?;
    if !latency.is_finite() || latency < 0.0 {
        return Err(HubError::MalformedBody);
    }

    tracing::info!(
        target: "telemetry",
        principal,
        latency_ms = latency,
        message_id = sample.message_id.as_deref().unwrap_or(""),
        chat_id = sample.chat_id.as_deref().unwrap_or(""),
        "latency sample"
    );
    Counters::bump(&state.counters.telemetry_samples);
    Ok(())
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
