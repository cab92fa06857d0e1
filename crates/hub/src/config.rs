// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the chathub service.
#[derive(Debug, Clone, clap::Parser)]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "CHATHUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9400, env = "CHATHUB_PORT")]
    pub port: u16,

    /// Base URL of the OIDC token issuer. Unset means every token is denied.
    #[arg(long, env = "ISSUER_URL")]
    pub issuer_url: Option<String>,

    /// Expected token audience. Tokens with no audience claim are accepted.
    #[arg(long, env = "AUDIENCE")]
    pub audience: Option<String>,

    /// Maximum envelope age at the egress processor, in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "VALIDITY_WINDOW_MS")]
    pub validity_window_ms: u64,

    /// History record retention, in days.
    #[arg(long, default_value_t = 30, env = "HISTORY_TTL_DAYS")]
    pub history_ttl_days: u64,

    /// Name of the ordered per-chat topic.
    #[arg(long, default_value = "chat-notify.fifo", env = "FIFO_TOPIC")]
    pub fifo_topic: String,

    /// Name of the best-effort topic.
    #[arg(long, default_value = "chat-notify", env = "STANDARD_TOPIC")]
    pub standard_topic: String,

    /// Target channel served by the real-time session egress.
    #[arg(long, default_value = "session", env = "CHATHUB_SESSION_CHANNEL")]
    pub session_channel: String,

    /// Delivery attempts per envelope before it is dead-lettered.
    #[arg(long, default_value_t = 3, env = "CHATHUB_MAX_DELIVERY_ATTEMPTS")]
    pub max_delivery_attempts: u32,

    /// Maximum queued envelopes per bus queue before publishes are rejected.
    #[arg(long, default_value_t = 10_000, env = "CHATHUB_QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    /// Content-based deduplication window for the FIFO topic, in milliseconds.
    #[arg(long, default_value_t = 300_000, env = "CHATHUB_DEDUP_WINDOW_MS")]
    pub dedup_window_ms: u64,

    /// Base redelivery delay for failed queue items, in milliseconds.
    #[arg(long, default_value_t = 500, env = "CHATHUB_REDELIVERY_DELAY_MS")]
    pub redelivery_delay_ms: u64,

    /// Per-session outbound frame buffer (frames beyond this are a transient
    /// endpoint failure).
    #[arg(long, default_value_t = 256, env = "CHATHUB_SESSION_BUFFER")]
    pub session_buffer: usize,

    /// Maximum records held by the history store across all chats.
    #[arg(long, default_value_t = 100_000, env = "CHATHUB_HISTORY_MAX_RECORDS")]
    pub history_max_records: usize,

    /// Maximum envelopes retained by the dead-letter holder.
    #[arg(long, default_value_t = 1_000, env = "CHATHUB_DLQ_CAPACITY")]
    pub dlq_capacity: usize,

    /// JWKS cache lifetime, in milliseconds.
    #[arg(long, default_value_t = 3_600_000, env = "CHATHUB_JWKS_TTL_MS")]
    pub jwks_ttl_ms: u64,

    /// End-to-end publish budget, in milliseconds.
    #[arg(long, default_value_t = 5_000, env = "CHATHUB_PUBLISH_TIMEOUT_MS")]
    pub publish_timeout_ms: u64,

    /// Token verification budget (including JWKS fetch), in milliseconds.
    #[arg(long, default_value_t = 2_000, env = "CHATHUB_VERIFY_TIMEOUT_MS")]
    pub verify_timeout_ms: u64,

    /// History reaper sweep interval, in milliseconds.
    #[arg(long, default_value_t = 60_000, env = "CHATHUB_REAP_INTERVAL_MS")]
    pub reap_interval_ms: u64,
}

impl HubConfig {
    pub fn history_ttl_ms(&self) -> u64 {
        self.history_ttl_days * 24 * 60 * 60 * 1000
    }

    pub fn publish_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn verify_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn reap_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reap_interval_ms)
    }
}
