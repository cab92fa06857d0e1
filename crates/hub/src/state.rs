// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenVerifier;
use crate::bus::MessageBus;
use crate::config::HubConfig;
use crate::registry::SessionRegistry;
use crate::store::history::HistoryStore;
use crate::store::permission::PermissionStore;
use crate::store::sequence::SequenceCounter;

/// Shared hub state. One per process, passed to every component.
pub struct HubState {
    pub config: HubConfig,
    pub shutdown: CancellationToken,
    pub permissions: PermissionStore,
    pub registry: SessionRegistry,
    pub sequencer: SequenceCounter,
    pub bus: Arc<MessageBus>,
    pub history: Arc<HistoryStore>,
    pub verifier: TokenVerifier,
    pub counters: Counters,
}

impl HubState {
    pub fn new(config: HubConfig, shutdown: CancellationToken) -> Self {
        let bus = Arc::new(MessageBus::new(&config));
        let history = Arc::new(HistoryStore::new(config.history_max_records));
        let verifier = TokenVerifier::from_config(&config);
        Self {
            permissions: PermissionStore::new(),
            registry: SessionRegistry::new(),
            sequencer: SequenceCounter::new(),
            bus,
            history,
            verifier,
            config,
            shutdown,
            counters: Counters::default(),
        }
    }
}

// -- Counters -----------------------------------------------------------------

/// Process-wide event counters, reported by `/health`.
#[derive(Default)]
pub struct Counters {
    pub published: AtomicU64,
    pub duplicates_collapsed: AtomicU64,
    pub expired_dropped: AtomicU64,
    pub frames_delivered: AtomicU64,
    pub endpoints_reaped: AtomicU64,
    pub dead_lettered: AtomicU64,
    pub records_stored: AtomicU64,
    pub telemetry_samples: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountersSnapshot {
    pub published: u64,
    pub duplicates_collapsed: u64,
    pub expired_dropped: u64,
    pub frames_delivered: u64,
    pub endpoints_reaped: u64,
    pub dead_lettered: u64,
    pub records_stored: u64,
    pub telemetry_samples: u64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            published: self.published.load(Ordering::Relaxed),
            duplicates_collapsed: self.duplicates_collapsed.load(Ordering::Relaxed),
            expired_dropped: self.expired_dropped.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            endpoints_reaped: self.endpoints_reaped.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            records_stored: self.records_stored.load(Ordering::Relaxed),
            telemetry_samples: self.telemetry_samples.load(Ordering::Relaxed),
        }
    }
}

// -- Time ---------------------------------------------------------------------

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Render epoch millis as ISO 8601 UTC (e.g. "2026-02-14T01:23:45.678Z").
pub fn iso8601_ms(epoch_ms: u64) -> String {
    let secs = epoch_ms / 1000;
    let millis = epoch_ms % 1000;
    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;
    // Civil calendar from days since epoch (Howard Hinnant's algorithm).
    let days = secs / 86400;
    let z = days as i64 + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{y:04}-{m:02}-{d:02}T{hours:02}:{minutes:02}:{seconds:02}.{millis:03}Z")
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
