// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer token verification against the issuer's published key set.
//!
//! Tokens are JWS-signed JSON; the key set is fetched from
//! `{ISSUER_URL}/.well-known/jwks.json` and cached. Verification is
//! fail-closed: no configured issuer, an unknown key, a stale clock or a
//! transport fault all deny.

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::HubConfig;
use crate::error::HubError;

/// Claims the gateway consumes. `sub` is the principal identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    #[serde(default)]
    pub aud: Option<Audience>,
    pub exp: u64,
}

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Self::One(aud) => aud == expected,
            Self::Many(auds) => auds.iter().any(|a| a == expected),
        }
    }
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// JWKS cache with TTL. A `static_keys` cache never refetches (tests seed it
/// directly; production caches the issuer response).
struct KeyCache {
    jwks_url: Option<String>,
    http: reqwest::Client,
    ttl: Duration,
    cached: RwLock<Option<CachedKeys>>,
}

/// Installs the rustls crypto provider used by the JWKS HTTP client.
/// Production installs this in `main` before `HubState` is built; tests
/// construct `KeyCache` directly, so guard it here too. Idempotent.
fn ensure_crypto_provider() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

impl KeyCache {
    fn new(jwks_url: Option<String>, ttl: Duration) -> Self {
        ensure_crypto_provider();
        Self { jwks_url, http: reqwest::Client::new(), ttl, cached: RwLock::new(None) }
    }

    fn with_static(keys: JwkSet) -> Self {
        ensure_crypto_provider();
        Self {
            jwks_url: None,
            http: reqwest::Client::new(),
            ttl: Duration::from_secs(u64::MAX / 2),
            cached: RwLock::new(Some(CachedKeys { keys, fetched_at: Instant::now() })),
        }
    }

    async fn find(&self, kid: Option<&str>) -> Result<Jwk, HubError> {
        {
            let cached = self.cached.read().await;
            if let Some(ref entry) = *cached {
                if entry.fetched_at.elapsed() < self.ttl {
                    return select_key(&entry.keys, kid);
                }
            }
        }

        let Some(ref url) = self.jwks_url else {
            // Static cache expired is unreachable; no URL means nothing to
            // refresh, so whatever is cached is authoritative.
            let cached = self.cached.read().await;
            return match *cached {
                Some(ref entry) => select_key(&entry.keys, kid),
                None => Err(HubError::TokenInvalid),
            };
        };

        tracing::debug!(url = %url, "refreshing issuer key set");
        let keys: JwkSet = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                tracing::warn!(err = %e, "JWKS fetch failed");
                HubError::TokenInvalid
            })?
            .json()
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "JWKS response was not a key set");
                HubError::TokenInvalid
            })?;

        let mut cached = self.cached.write().await;
        *cached = Some(CachedKeys { keys, fetched_at: Instant::now() });
        match *cached {
            Some(ref entry) => select_key(&entry.keys, kid),
            None => Err(HubError::TokenInvalid),
        }
    }
}

fn select_key(keys: &JwkSet, kid: Option<&str>) -> Result<Jwk, HubError> {
    match kid {
        Some(kid) => keys.find(kid).cloned().ok_or(HubError::TokenInvalid),
        // No key id in the header: unambiguous only with a single key.
        None if keys.keys.len() == 1 => Ok(keys.keys[0].clone()),
        None => Err(HubError::TokenInvalid),
    }
}

/// Verifies bearer tokens for the session gateway and the stateless HTTP
/// surface.
pub struct TokenVerifier {
    issuer: Option<String>,
    audience: Option<String>,
    keys: KeyCache,
}

impl TokenVerifier {
    pub fn from_config(config: &HubConfig) -> Self {
        let issuer = config.issuer_url.as_ref().map(|u| u.trim_end_matches('/').to_owned());
        if issuer.is_none() {
            tracing::warn!("no issuer configured; every bearer token will be denied");
        }
        let jwks_url = issuer.as_ref().map(|iss| format!("{iss}/.well-known/jwks.json"));
        Self {
            keys: KeyCache::new(jwks_url, Duration::from_millis(config.jwks_ttl_ms)),
            issuer,
            audience: config.audience.clone(),
        }
    }

    /// Build a verifier over a fixed key set (no network).
    pub fn with_static_keys(
        issuer: impl Into<String>,
        audience: Option<String>,
        keys: JwkSet,
    ) -> Self {
        Self {
            issuer: Some(issuer.into()),
            audience,
            keys: KeyCache::with_static(keys),
        }
    }

    /// Verify a bearer token and return its claims.
    ///
    /// Accepts tokens whose `aud` matches the configured audience and tokens
    /// carrying no audience claim at all (access-token shape); a present but
    /// mismatched audience denies.
    pub async fn verify(&self, token: &str) -> Result<Claims, HubError> {
        let Some(ref issuer) = self.issuer else {
            return Err(HubError::TokenInvalid);
        };

        let header = decode_header(token).map_err(|_| HubError::TokenInvalid)?;
        if !matches!(header.alg, Algorithm::RS256 | Algorithm::HS256) {
            return Err(HubError::TokenInvalid);
        }

        let jwk = self.keys.find(header.kid.as_deref()).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|_| HubError::TokenInvalid)?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Audience is checked by hand below so that a missing claim passes.
        validation.validate_aud = false;

        let data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => HubError::TokenExpired,
            _ => HubError::TokenInvalid,
        })?;

        if let (Some(expected), Some(aud)) = (self.audience.as_deref(), data.claims.aud.as_ref())
        {
            if !aud.contains(expected) {
                return Err(HubError::TokenInvalid);
            }
        }

        Ok(data.claims)
    }
}

/// Extract the token from an `Authorization: Bearer` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ")
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
