//! Builder patterns for test tokens
//!
//! Provides a fluent claims builder and signers producing compact tokens with
//! RS256 (the accepted algorithm) or HMAC (for algorithm-confusion tests).

use crate::crypto_fixtures::RsaKeyFixture;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for creating test JWT claims
///
/// Defaults to a token valid for ten minutes carrying the `ReadDevices` grant
/// in `group_policy`.
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::new()
///     .for_subject("device-operator")
///     .with_policy("ManageDeviceSecurity,ReadDevices")
///     .expires_in(3600)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestClaimsBuilder {
    sub: String,
    exp: Option<i64>,
    iat: i64,
    policy: Option<String>,
    extra: Map<String, Value>,
}

impl TestClaimsBuilder {
    /// Create a new claims builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            exp: Some((now + Duration::seconds(600)).timestamp()),
            iat: now.timestamp(),
            policy: Some("ReadDevices".to_string()),
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the `group_policy` claim
    pub fn with_policy(mut self, policy: &str) -> Self {
        self.policy = Some(policy.to_string());
        self
    }

    /// Omit the `group_policy` claim
    pub fn without_policy(mut self) -> Self {
        self.policy = None;
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set expiration to an absolute Unix timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = Some(timestamp);
        self
    }

    /// Omit the `exp` claim
    pub fn without_exp(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Add an arbitrary claim. Overrides any built-in claim of the same name.
    pub fn with_claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(name.to_string(), value.into());
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("iat".to_string(), json!(self.iat));
        claims.insert("authorized".to_string(), json!(true));
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        if let Some(policy) = self.policy {
            claims.insert("group_policy".to_string(), json!(policy));
        }
        claims.extend(self.extra);

        Value::Object(claims)
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn header(alg: Algorithm, kid: &str) -> Header {
    let mut header = Header::new(alg);
    if !kid.is_empty() {
        header.kid = Some(kid.to_string());
    }
    header
}

/// Sign claims with RS256 using a fixture's private key.
///
/// An empty `kid` produces a header without `kid`.
pub fn sign_rs256(fixture: &RsaKeyFixture, kid: &str, claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(fixture.private_pem.as_bytes())
        .expect("fixture private key should parse");
    encode(&header(Algorithm::RS256, kid), claims, &key).expect("RS256 signing should succeed")
}

/// Sign claims with HS256 using `secret` as the HMAC key.
pub fn sign_hs256(secret: &[u8], kid: &str, claims: &Value) -> String {
    encode(
        &header(Algorithm::HS256, kid),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .expect("HS256 signing should succeed")
}

/// Sign claims with HS512 using `secret` as the HMAC key.
pub fn sign_hs512(secret: &[u8], kid: &str, claims: &Value) -> String {
    encode(
        &header(Algorithm::HS512, kid),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .expect("HS512 signing should succeed")
}
