//! JWKS endpoint harness
//!
//! Provides `JwksMockServer`, a wiremock-backed key publishing endpoint for
//! resolver and end-to-end authorization tests.

use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the harness publishes the key set under.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Mock JWKS endpoint.
///
/// # Example
/// ```rust,ignore
/// let server = JwksMockServer::start().await;
/// server.serve_keys(&[rsa_jwk(&primary_key(), "key-1")]).await;
///
/// let resolver = KeyResolver::connect_url(server.jwks_url(), &CancellationToken::new()).await?;
/// assert!(resolver.is_available());
/// ```
pub struct JwksMockServer {
    server: MockServer,
}

impl JwksMockServer {
    /// Start a mock server with nothing mounted. Requests get 404 until a
    /// response is configured.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full URL of the JWKS endpoint.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Replace any mounted responses with a JWKS document holding `keys`.
    pub async fn serve_keys(&self, keys: &[Value]) {
        self.serve_json(crate::crypto_fixtures::jwks_document(keys))
            .await;
    }

    /// Replace any mounted responses with an arbitrary JSON body.
    pub async fn serve_json(&self, body: Value) {
        self.mount(ResponseTemplate::new(200).set_body_json(body))
            .await;
    }

    /// Replace any mounted responses with a raw body.
    pub async fn serve_raw(&self, body: impl Into<Vec<u8>>) {
        self.mount(ResponseTemplate::new(200).set_body_bytes(body.into()))
            .await;
    }

    /// Replace any mounted responses with an error status.
    pub async fn fail_with_status(&self, status: u16) {
        self.mount(ResponseTemplate::new(status)).await;
    }

    /// Replace any mounted responses with a JWKS document delivered after `delay`.
    pub async fn serve_keys_delayed(&self, keys: &[Value], delay: Duration) {
        let body = crate::crypto_fixtures::jwks_document(keys);
        self.mount(
            ResponseTemplate::new(200)
                .set_body_json(body)
                .set_delay(delay),
        )
        .await;
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    async fn mount(&self, response: ResponseTemplate) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }
}
