//! Request authorization.
//!
//! Composes key resolution and token validation for a single bearer token:
//! read the `kid` from the header, look the key up through a [`KeySource`],
//! then hand token and key to the [`TokenValidator`].

use crate::claims::Claims;
use crate::config::Config;
use crate::errors::AuthzError;
use crate::jwks::KeySource;
use crate::jwt::{extract_kid, TokenValidator};
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use tracing::instrument;

/// Authorizes bearer tokens against keys from `K`.
#[derive(Debug, Clone)]
pub struct Authorizer<K> {
    keys: K,
    validator: TokenValidator,
}

impl<K: KeySource> Authorizer<K> {
    pub fn new(keys: K, validator: TokenValidator) -> Self {
        Self { keys, validator }
    }

    /// Create an authorizer with the policy settings from configuration.
    pub fn from_config(keys: K, config: &Config) -> Self {
        Self::new(keys, TokenValidator::from_config(config))
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Authorize a token and return its validated claims.
    ///
    /// # Errors
    ///
    /// - `MalformedToken` if the header cannot be read or carries no `kid`
    /// - `KeySetUnavailable` / `KeyNotFound` from key resolution
    /// - any validation failure from [`TokenValidator::validate`]
    #[instrument(skip_all)]
    pub fn authorize(&self, token: &str) -> Result<Claims, AuthzError> {
        self.authorize_at(token, Utc::now())
    }

    /// Authorize a token against an explicit `now`.
    ///
    /// Every call records exactly one `authz_token_validations_total` outcome:
    /// header and key resolution failures here, the rest in the validator.
    pub fn authorize_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthzError> {
        let kid = extract_kid(token).map_err(|e| {
            tracing::debug!(target: "authz.authorizer", error = %e, "Token header rejected");
            metrics::record_token_validation(e.error_type());
            e
        })?;

        let key = self.keys.lookup(&kid).map_err(|e| {
            tracing::debug!(
                target: "authz.authorizer",
                kid = %kid,
                error_type = e.error_type(),
                "Key resolution failed"
            );
            metrics::record_token_validation(e.error_type());
            e
        })?;

        let claims = self.validator.validate_at(token, &key, now)?;

        tracing::debug!(target: "authz.authorizer", kid = %kid, "Token authorized");
        Ok(claims)
    }
}
