//! Key resolution against a published JSON Web Key Set.
//!
//! The [`KeyResolver`] fetches the JWKS document once from the configured URL and
//! serves `kid` lookups from an immutable [`KeySet`] snapshot. A refresh publishes
//! a complete new snapshot; readers see either the old set or the new set, never
//! a mix.
//!
//! # Security
//!
//! - Every served key is pinned to RS256; the `alg` published next to a key is
//!   never trusted
//! - Only RSA signing keys enter the set; other key types are skipped
//! - A corrupt document (duplicate `kid`, unusable RSA material) is rejected as
//!   a whole, so a partial trust set is never retained
//! - HTTPS should be used in production (enforced by deployment config)

use crate::config::Config;
use crate::errors::AuthzError;
use crate::observability::metrics;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Maximum accepted JWKS response size (1 MiB).
pub const MAX_JWKS_RESPONSE_BYTES: usize = 1024 * 1024;

/// Errors raised while fetching or parsing a key set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("no JWKS URL configured")]
    NoUrlConfigured,

    #[error("failed to build JWKS HTTP client: {0}")]
    HttpClient(String),

    #[error("JWKS request failed: {0}")]
    Transport(String),

    #[error("JWKS endpoint returned status {0}")]
    HttpStatus(u16),

    #[error("JWKS response exceeds {0} bytes")]
    ResponseTooLarge(usize),

    #[error("invalid JWKS document: {0}")]
    InvalidDocument(String),

    #[error("invalid key {kid}: {reason}")]
    InvalidKey { kid: String, reason: String },

    #[error("duplicate key id in JWKS: {0}")]
    DuplicateKid(String),

    #[error("JWKS fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Bounded label used for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            FetchError::NoUrlConfigured => "no_url",
            FetchError::HttpClient(_) => "http_client",
            FetchError::Transport(_) => "transport",
            FetchError::HttpStatus(_) => "http_status",
            FetchError::ResponseTooLarge(_) => "too_large",
            FetchError::InvalidDocument(_) => "invalid_document",
            FetchError::InvalidKey { .. } => "invalid_key",
            FetchError::DuplicateKid(_) => "duplicate_kid",
            FetchError::Cancelled => "cancelled",
        }
    }
}

/// JSON Web Key as published by the issuer.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" for keys this resolver serves).
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Published algorithm. Informational only.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// A public key served for signature verification.
///
/// Always RS256; there is no way to construct one for another algorithm.
#[derive(Clone)]
pub struct VerificationKey {
    kid: String,
    decoding_key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Build a key from base64url RSA modulus and exponent.
    pub fn from_rsa_components(
        kid: impl Into<String>,
        n: &str,
        e: &str,
    ) -> Result<Self, FetchError> {
        let kid = kid.into();
        let decoding_key =
            DecodingKey::from_rsa_components(n, e).map_err(|err| FetchError::InvalidKey {
                kid: kid.clone(),
                reason: err.to_string(),
            })?;

        Ok(Self { kid, decoding_key })
    }

    /// Build a key from a PEM-encoded RSA public key.
    pub fn from_rsa_pem(kid: impl Into<String>, pem: &[u8]) -> Result<Self, FetchError> {
        let kid = kid.into();
        let decoding_key = DecodingKey::from_rsa_pem(pem).map_err(|err| FetchError::InvalidKey {
            kid: kid.clone(),
            reason: err.to_string(),
        })?;

        Ok(Self { kid, decoding_key })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The algorithm this key verifies. Always RS256.
    pub fn algorithm(&self) -> Algorithm {
        Algorithm::RS256
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Convert a published JWK.
    ///
    /// Returns `Ok(None)` for keys that cannot back RS256 (non-RSA, encryption keys).
    fn from_jwk(jwk: &Jwk) -> Result<Option<Self>, FetchError> {
        if jwk.kty != "RSA" {
            tracing::warn!(target: "authz.jwks", kty = %jwk.kty, kid = ?jwk.kid, "Skipping non-RSA key");
            return Ok(None);
        }
        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                tracing::warn!(target: "authz.jwks", key_use = %key_use, kid = ?jwk.kid, "Skipping non-signing key");
                return Ok(None);
            }
        }

        let kid = jwk
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| FetchError::InvalidKey {
                kid: String::new(),
                reason: "RSA key missing 'kid'".to_string(),
            })?;
        let n = jwk.n.as_deref().ok_or_else(|| FetchError::InvalidKey {
            kid: kid.to_string(),
            reason: "RSA key missing 'n'".to_string(),
        })?;
        let e = jwk.e.as_deref().ok_or_else(|| FetchError::InvalidKey {
            kid: kid.to_string(),
            reason: "RSA key missing 'e'".to_string(),
        })?;

        if let Some(alg) = jwk.alg.as_deref() {
            if alg != "RS256" {
                tracing::debug!(target: "authz.jwks", kid = %kid, alg = %alg, "Ignoring published alg; key pinned to RS256");
            }
        }

        Self::from_rsa_components(kid, n, e).map(Some)
    }
}

/// An immutable set of verification keys indexed by `kid`.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
}

impl KeySet {
    /// Build a set from keys, rejecting duplicate key IDs.
    pub fn from_keys(keys: impl IntoIterator<Item = VerificationKey>) -> Result<Self, FetchError> {
        let mut map = HashMap::new();
        for key in keys {
            if map.contains_key(key.kid()) {
                return Err(FetchError::DuplicateKid(key.kid().to_string()));
            }
            map.insert(key.kid().to_string(), key);
        }

        Ok(Self { keys: map })
    }

    /// Parse a JWKS document.
    pub fn from_jwks_json(json: &str) -> Result<Self, FetchError> {
        Self::from_jwks_slice(json.as_bytes())
    }

    /// Parse a JWKS document from raw bytes.
    pub fn from_jwks_slice(bytes: &[u8]) -> Result<Self, FetchError> {
        let document: JwksDocument = serde_json::from_slice(bytes)
            .map_err(|e| FetchError::InvalidDocument(e.to_string()))?;

        let mut keys = Vec::with_capacity(document.keys.len());
        for jwk in &document.keys {
            if let Some(key) = VerificationKey::from_jwk(jwk)? {
                keys.push(key);
            }
        }

        Self::from_keys(keys)
    }

    pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.get(kid)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs in sorted order.
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }
}

/// Source of verification keys for the authorizer.
///
/// The validator never talks to the resolver directly; the composition layer
/// hands it whatever implements this trait.
pub trait KeySource: Send + Sync {
    /// Resolve a key ID to a verification key.
    fn lookup(&self, kid: &str) -> Result<VerificationKey, AuthzError>;
}

impl KeySource for KeySet {
    fn lookup(&self, kid: &str) -> Result<VerificationKey, AuthzError> {
        self.get(kid)
            .cloned()
            .ok_or_else(|| AuthzError::KeyNotFound(kid.to_string()))
    }
}

impl<T: KeySource + ?Sized> KeySource for Arc<T> {
    fn lookup(&self, kid: &str) -> Result<VerificationKey, AuthzError> {
        (**self).lookup(kid)
    }
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(crate::config::DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS)
}

/// Resolves key IDs against the most recently fetched key set.
///
/// Lookups clone the current `Arc<KeySet>` out of a watch channel and match
/// against it without holding any lock. Refreshes replace the snapshot
/// wholesale.
pub struct KeyResolver {
    /// URL to the JWKS endpoint. `None` means the resolver can never load keys.
    jwks_url: Option<String>,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Current snapshot; `None` until a fetch succeeds.
    snapshot: watch::Sender<Option<Arc<KeySet>>>,
}

impl fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyResolver")
            .field("jwks_url", &self.jwks_url)
            .field("key_count", &self.snapshot().map(|set| set.len()))
            .finish_non_exhaustive()
    }
}

impl KeyResolver {
    /// Create a resolver without fetching. It stays unavailable until
    /// [`KeyResolver::refresh`] succeeds.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - URL of the published key set, `None` if not configured
    /// * `fetch_timeout` - HTTP timeout for a single fetch
    ///
    /// # Errors
    ///
    /// Returns `FetchError::HttpClient` if the HTTP client cannot be built.
    pub fn new(jwks_url: Option<String>, fetch_timeout: Duration) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| FetchError::HttpClient(e.to_string()))?;

        let (snapshot, _) = watch::channel(None);

        Ok(Self {
            jwks_url: jwks_url.filter(|url| !url.is_empty()),
            http_client,
            snapshot,
        })
    }

    /// Create a resolver serving a fixed key set. No URL is configured.
    pub fn from_key_set(key_set: KeySet) -> Result<Self, FetchError> {
        let resolver = Self::new(None, default_fetch_timeout())?;
        resolver.replace_key_set(key_set);
        Ok(resolver)
    }

    /// Create a resolver from configuration and perform the initial fetch.
    ///
    /// A failed or cancelled fetch does not fail construction: the resolver is
    /// returned in the unavailable state and the error is logged.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::HttpClient` if the HTTP client cannot be built.
    pub async fn connect(config: &Config, cancel: &CancellationToken) -> Result<Self, FetchError> {
        let resolver = Self::new(config.jwks_url.clone(), config.jwks_fetch_timeout)?;
        resolver.initial_fetch(cancel).await;
        Ok(resolver)
    }

    /// Create a resolver for a URL with the default timeout and fetch once.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::HttpClient` if the HTTP client cannot be built.
    pub async fn connect_url(
        jwks_url: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<Self, FetchError> {
        let resolver = Self::new(Some(jwks_url.into()), default_fetch_timeout())?;
        resolver.initial_fetch(cancel).await;
        Ok(resolver)
    }

    async fn initial_fetch(&self, cancel: &CancellationToken) {
        match self.refresh(cancel).await {
            Ok(_) => {}
            Err(FetchError::NoUrlConfigured) => {
                tracing::warn!(target: "authz.jwks", "No JWKS URL configured; all key lookups will fail");
            }
            Err(e) => {
                tracing::error!(target: "authz.jwks", error = %e, "Initial JWKS fetch failed; key resolver unavailable");
            }
        }
    }

    /// Fetch the key set again and publish it.
    ///
    /// On failure or cancellation the current snapshot is left untouched.
    /// No retries are attempted here.
    ///
    /// # Returns
    ///
    /// The number of keys in the newly published set.
    #[instrument(skip_all)]
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<usize, FetchError> {
        let url = self.jwks_url.as_deref().ok_or(FetchError::NoUrlConfigured)?;

        tracing::debug!(target: "authz.jwks", url = %url, "Fetching JWKS");
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FetchError::Cancelled),
            fetched = self.fetch_key_set(url) => fetched,
        };

        match result {
            Ok(key_set) => {
                metrics::record_jwks_fetch("success", None, start.elapsed());
                let key_count = key_set.len();
                self.replace_key_set(key_set);
                Ok(key_count)
            }
            Err(e) => {
                metrics::record_jwks_fetch("error", Some(e.error_type()), start.elapsed());
                tracing::error!(target: "authz.jwks", error = %e, "JWKS fetch failed; keeping previous key set");
                Err(e)
            }
        }
    }

    async fn fetch_key_set(&self, url: &str) -> Result<KeySet, FetchError> {
        let mut response = self.http_client.get(url).send().await.map_err(|e| {
            tracing::error!(target: "authz.jwks", error = %e, "Failed to fetch JWKS");
            FetchError::Transport(e.to_string())
        })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "authz.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let declared_length = response.content_length().unwrap_or(0);
        if declared_length > MAX_JWKS_RESPONSE_BYTES as u64 {
            return Err(FetchError::ResponseTooLarge(MAX_JWKS_RESPONSE_BYTES));
        }

        // Content-Length is absent for chunked responses; the cap is enforced per chunk
        let mut body = Vec::with_capacity(usize::try_from(declared_length).unwrap_or(0));
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
        {
            if body.len().saturating_add(chunk.len()) > MAX_JWKS_RESPONSE_BYTES {
                tracing::error!(
                    target: "authz.jwks",
                    received = body.len().saturating_add(chunk.len()),
                    max_size = MAX_JWKS_RESPONSE_BYTES,
                    "JWKS response exceeds size limit"
                );
                return Err(FetchError::ResponseTooLarge(MAX_JWKS_RESPONSE_BYTES));
            }
            body.extend_from_slice(&chunk);
        }

        KeySet::from_jwks_slice(&body).map_err(|e| {
            tracing::error!(target: "authz.jwks", error = %e, "Failed to parse JWKS response");
            e
        })
    }

    /// Publish a complete key set, replacing the current snapshot atomically.
    pub fn replace_key_set(&self, key_set: KeySet) {
        let key_count = key_set.len();
        self.snapshot.send_replace(Some(Arc::new(key_set)));
        metrics::set_jwks_key_count(key_count);

        tracing::info!(
            target: "authz.jwks",
            key_count = key_count,
            "JWKS key set replaced"
        );
    }

    /// The current snapshot, or `None` if no key set was ever loaded.
    pub fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.snapshot.borrow().clone()
    }

    /// Whether a key set has been loaded.
    pub fn is_available(&self) -> bool {
        self.snapshot.borrow().is_some()
    }

    /// Observe key set replacements.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<KeySet>>> {
        self.snapshot.subscribe()
    }

    pub fn jwks_url(&self) -> Option<&str> {
        self.jwks_url.as_deref()
    }

    /// Get a verification key by key ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::KeySetUnavailable` if no key set was ever loaded.
    /// Returns `AuthzError::KeyNotFound` if the loaded set has no such key.
    #[instrument(skip(self))]
    pub fn lookup(&self, kid: &str) -> Result<VerificationKey, AuthzError> {
        let Some(key_set) = self.snapshot() else {
            tracing::warn!(target: "authz.jwks", "Key lookup with no key set loaded");
            return Err(AuthzError::KeySetUnavailable);
        };

        match key_set.get(kid) {
            Some(key) => {
                tracing::debug!(target: "authz.jwks", "JWKS key found");
                Ok(key.clone())
            }
            None => {
                tracing::debug!(target: "authz.jwks", "Key not found in JWKS");
                Err(AuthzError::KeyNotFound(kid.to_string()))
            }
        }
    }
}

impl KeySource for KeyResolver {
    fn lookup(&self, kid: &str) -> Result<VerificationKey, AuthzError> {
        KeyResolver::lookup(self, kid)
    }
}
