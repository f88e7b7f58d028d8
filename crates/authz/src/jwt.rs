//! Token validation.
//!
//! Validates compact JWS tokens against an RSA verification key resolved from the
//! published key set, then enforces the policy claim.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256 is accepted, judged from the token header alone; symmetric
//!   algorithms and `none` are rejected before any key is used
//! - The signature is checked over the header and payload bytes exactly as
//!   transmitted
//! - Token contents and `sub` values are never logged
//!
//! # Validation steps
//!
//! `Decoded → AlgorithmChecked → SignatureVerified → ClaimsChecked → Valid`.
//! The first failing step determines the reported error.

use crate::claims::Claims;
use crate::config::Config;
use crate::errors::AuthzError;
use crate::jwks::VerificationKey;
use crate::observability::metrics;
use crate::policy::{ContainsToken, PolicyRule};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;

/// Maximum allowed token size in bytes (8KB).
///
/// Typical RS256 tokens are well under 2KB. Larger inputs are rejected before
/// any base64 decoding or signature work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// The only algorithm accepted in token headers.
pub const ACCEPTED_ALGORITHM: &str = "RS256";

/// Generic reason carried by signature failures.
const VERIFICATION_ERROR: &str = "verification error";

/// The three decoded segments of a compact token.
struct DecodedToken<'a> {
    header: Map<String, Value>,
    payload: Map<String, Value>,
    /// `header.payload` exactly as transmitted.
    signing_input: &'a str,
    /// Base64url signature segment as transmitted.
    signature: &'a str,
}

/// Split a compact token and decode its segments.
fn decode_segments(token: &str) -> Result<DecodedToken<'_>, AuthzError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "authz.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(AuthzError::MalformedToken("token too large".to_string()));
    }

    let (signing_input, signature) = token
        .rsplit_once('.')
        .ok_or_else(|| malformed("expected three segments"))?;
    let (header_part, payload_part) = signing_input
        .split_once('.')
        .ok_or_else(|| malformed("expected three segments"))?;
    if payload_part.contains('.') {
        return Err(malformed("expected three segments"));
    }

    let header = decode_json_segment(header_part, "header")?;
    let payload = decode_json_segment(payload_part, "payload")?;

    if signature.is_empty() {
        return Err(malformed("empty signature"));
    }
    URL_SAFE_NO_PAD.decode(signature).map_err(|e| {
        tracing::debug!(target: "authz.jwt", error = %e, "Failed to decode signature base64");
        malformed("signature is not base64url")
    })?;

    Ok(DecodedToken {
        header,
        payload,
        signing_input,
        signature,
    })
}

fn decode_json_segment(segment: &str, name: &str) -> Result<Map<String, Value>, AuthzError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "authz.jwt", segment = name, error = %e, "Failed to decode token segment base64");
        malformed(&format!("{} is not base64url", name))
    })?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(malformed(&format!("{} is not a JSON object", name))),
        Err(e) => {
            tracing::debug!(target: "authz.jwt", segment = name, error = %e, "Failed to parse token segment JSON");
            Err(malformed(&format!("{} is not valid JSON", name)))
        }
    }
}

fn malformed(reason: &str) -> AuthzError {
    AuthzError::MalformedToken(reason.to_string())
}

/// Extract the `kid` (key ID) from a token header without verifying the signature.
///
/// The returned value is untrusted; it is only good for a lookup in a trusted
/// key set, and the token MUST still be validated afterwards.
///
/// # Errors
///
/// Returns `AuthzError::MalformedToken` if the token exceeds the size limit, is
/// not a three-segment token with a JSON header, or has a missing, empty or
/// non-string `kid`.
pub fn extract_kid(token: &str) -> Result<String, AuthzError> {
    let decoded = decode_segments(token)?;

    decoded
        .header
        .get("kid")
        .and_then(Value::as_str)
        .filter(|kid| !kid.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| {
            tracing::debug!(target: "authz.jwt", "Token rejected: missing kid header");
            malformed("missing kid header")
        })
}

/// Validates tokens against a supplied verification key.
///
/// Stateless apart from its policy settings; safe to share across tasks.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    /// Claim holding the delimited policy string.
    policy_claim: String,

    /// Rule applied to the policy claim.
    policy: Arc<dyn PolicyRule>,
}

impl Default for TokenValidator {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_POLICY_CLAIM,
            Arc::new(ContainsToken::default()),
        )
    }
}

impl TokenValidator {
    /// Create a validator.
    ///
    /// # Arguments
    ///
    /// * `policy_claim` - Name of the claim holding the policy string
    /// * `policy` - Rule the policy string must satisfy
    pub fn new(policy_claim: impl Into<String>, policy: Arc<dyn PolicyRule>) -> Self {
        Self {
            policy_claim: policy_claim.into(),
            policy,
        }
    }

    /// Create a validator using the `ContainsToken` rule from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.policy_claim.clone(),
            Arc::new(ContainsToken::new(config.required_policy.clone())),
        )
    }

    pub fn policy_claim(&self) -> &str {
        &self.policy_claim
    }

    /// Validate a token against the current time and return its claims.
    ///
    /// # Errors
    ///
    /// Returns the first failing check:
    /// `MalformedToken`, `UnexpectedSigningMethod`, `SignatureInvalid`,
    /// `TokenExpired`, then `PolicyDenied`.
    #[instrument(skip_all, fields(kid = %key.kid()))]
    pub fn validate(&self, token: &str, key: &VerificationKey) -> Result<Claims, AuthzError> {
        self.validate_at(token, key, Utc::now())
    }

    /// Validate a token against an explicit `now`.
    ///
    /// Prefer [`TokenValidator::validate`] in production code. This variant lets
    /// expiry boundaries be tested without wall-clock dependence.
    pub fn validate_at(
        &self,
        token: &str,
        key: &VerificationKey,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthzError> {
        let result = self.run_checks(token, key, now);

        match &result {
            Ok(_) => {
                tracing::debug!(target: "authz.jwt", "Token validated successfully");
                metrics::record_token_validation("success");
            }
            Err(e) => {
                tracing::debug!(target: "authz.jwt", error_type = e.error_type(), error = %e, "Token rejected");
                metrics::record_token_validation(e.error_type());
            }
        }

        result
    }

    fn run_checks(
        &self,
        token: &str,
        key: &VerificationKey,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthzError> {
        // 1. Decode
        let decoded = decode_segments(token)?;

        // 2. Algorithm check, from the header alone
        check_algorithm(&decoded.header)?;

        // 3. Signature over the transmitted bytes
        verify_signature(&decoded, key)?;

        // 4. Claims and expiration
        let claims = Claims::from_json_object(decoded.payload);
        check_expiration(&claims, now)?;

        // 5. Policy
        self.check_policy(&claims)?;

        Ok(claims)
    }

    fn check_policy(&self, claims: &Claims) -> Result<(), AuthzError> {
        let value = match claims.get(&self.policy_claim) {
            None => {
                tracing::debug!(target: "authz.jwt", claim = %self.policy_claim, "Policy claim missing");
                return Err(AuthzError::PolicyDenied);
            }
            Some(value) => value.as_str().ok_or_else(|| {
                malformed(&format!(
                    "{} claim must be a string, got {}",
                    self.policy_claim,
                    value.kind()
                ))
            })?,
        };

        if self.policy.permits(value) {
            Ok(())
        } else {
            tracing::debug!(
                target: "authz.jwt",
                rule = %self.policy.describe(),
                "Policy rule denied token"
            );
            Err(AuthzError::PolicyDenied)
        }
    }
}

fn check_algorithm(header: &Map<String, Value>) -> Result<(), AuthzError> {
    let alg = header
        .get("alg")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing alg header"))?;

    if alg != ACCEPTED_ALGORITHM {
        tracing::debug!(target: "authz.jwt", alg = %alg, "Token rejected: unexpected signing method");
        return Err(AuthzError::UnexpectedSigningMethod(alg.to_string()));
    }

    Ok(())
}

fn verify_signature(decoded: &DecodedToken<'_>, key: &VerificationKey) -> Result<(), AuthzError> {
    let verified = jsonwebtoken::crypto::verify(
        decoded.signature,
        decoded.signing_input.as_bytes(),
        key.decoding_key(),
        key.algorithm(),
    )
    .map_err(|e| {
        tracing::debug!(target: "authz.jwt", error = %e, "Signature verification errored");
        AuthzError::SignatureInvalid(VERIFICATION_ERROR.to_string())
    })?;

    if verified {
        Ok(())
    } else {
        Err(AuthzError::SignatureInvalid(VERIFICATION_ERROR.to_string()))
    }
}

fn check_expiration(claims: &Claims, now: DateTime<Utc>) -> Result<(), AuthzError> {
    let expires_at = match claims.get("exp") {
        None => return Err(malformed("missing exp claim")),
        Some(value) => value.as_timestamp().ok_or_else(|| {
            malformed(&format!("exp claim must be a numeric date, got {}", value.kind()))
        })?,
    };

    if now >= expires_at {
        tracing::debug!(
            target: "authz.jwt",
            exp = %expires_at,
            now = %now,
            "Token rejected: expired"
        );
        return Err(AuthzError::TokenExpired);
    }

    Ok(())
}
