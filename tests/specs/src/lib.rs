// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `chathub` binary next to a stub OIDC issuer and exercises
//! the HTTP and WebSocket surfaces over real sockets.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `chathub` binary.
pub fn hub_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("chathub")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

const KID: &str = "spec-key";
const SECRET: &[u8] = b"spec-harness-signing-secret-32b!";

/// A stub OIDC issuer: serves a one-key JWKS and mints matching tokens.
/// Lives on a spawned task until the test runtime shuts down.
pub struct StubIssuer {
    port: u16,
}

impl StubIssuer {
    pub async fn spawn() -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let jwks = serde_json::json!({
            "keys": [{ "kty": "oct", "kid": KID, "alg": "HS256", "k": URL_SAFE_NO_PAD.encode(SECRET) }]
        });
        let router = Router::new().route(
            "/.well-known/jwks.json",
            get(move || {
                let jwks = jwks.clone();
                async move { Json(jwks) }
            }),
        );

        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self { port })
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Mint a token for `principal`, expiring `ttl_secs` from now (negative
    /// for an already-expired token).
    pub fn mint(&self, principal: &str, ttl_secs: i64) -> anyhow::Result<String> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(KID.to_owned());
        let claims = serde_json::json!({
            "sub": principal,
            "iss": self.url(),
            "exp": now + ttl_secs,
        });
        Ok(encode(&header, &claims, &EncodingKey::from_secret(SECRET))?)
    }
}

/// A running `chathub` process that is killed on drop.
pub struct HubProcess {
    child: Child,
    port: u16,
}

impl HubProcess {
    /// Spawn chathub against the given issuer.
    pub fn start(issuer_url: &str) -> anyhow::Result<Self> {
        ensure_crypto();
        let binary = hub_binary();
        anyhow::ensure!(binary.exists(), "chathub binary not found at {}", binary.display());

        let port = free_port()?;
        let child = Command::new(&binary)
            .args([
                "--host",
                "127.0.0.1",
                "--port",
                &port.to_string(),
                "--issuer-url",
                issuer_url,
            ])
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self, token: &str, chat_ids: &str) -> String {
        format!(
            "ws://127.0.0.1:{}/ws?token={token}&chatIds={chat_ids}",
            self.port
        )
    }

    /// Poll `/health` until the hub responds.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/health", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("chathub did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for HubProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
