// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! chathub: permissioned, chat-scoped notification bus with real-time
//! session fan-out and a TTL-bounded history store.

pub mod auth;
pub mod bus;
pub mod config;
pub mod egress;
pub mod envelope;
pub mod error;
pub mod publish;
pub mod registry;
pub mod state;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
pub mod test_support;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::state::HubState;
use crate::transport::build_router;

/// Run the hub until shutdown.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = Arc::new(HubState::new(config, shutdown.clone()));
    spawn_processors(&state);

    // Ctrl-C triggers a graceful drain.
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    tracing::info!("chathub listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Wire the bus queues to their processors and start the history reaper.
pub fn spawn_processors(state: &Arc<HubState>) {
    egress::spawn_egress(Arc::clone(state), Arc::clone(&state.bus.egress_fifo));
    egress::spawn_egress(Arc::clone(state), Arc::clone(&state.bus.egress_standard));
    storage::spawn_storage(Arc::clone(state), Arc::clone(&state.bus.storage_fifo));
    storage::spawn_storage(Arc::clone(state), Arc::clone(&state.bus.storage_standard));
    storage::spawn_history_reaper(Arc::clone(state));
}
