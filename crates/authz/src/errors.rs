//! Authorization error types.
//!
//! Every failure of key resolution or token validation is reported as an
//! [`AuthzError`]. Variants map to HTTP status codes so callers can tell
//! authentication failures (401) apart from authorization failures (403) and
//! infrastructure problems (503).
//!
//! Display strings are meant for server-side logs. Use [`AuthzError::client_error`]
//! to build the body returned to callers; it carries generic messages only.

use serde::Serialize;
use thiserror::Error;

/// Authorization error type.
///
/// Maps to HTTP status codes:
/// - KeySetUnavailable: 503 Service Unavailable
/// - PolicyDenied: 403 Forbidden
/// - everything else: 401 Unauthorized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    /// No key set has ever been loaded (fetch failed or was never performed).
    #[error("empty jwk resource")]
    KeySetUnavailable,

    /// The token's `kid` does not match any entry of the loaded key set.
    #[error("not found KID in token")]
    KeyNotFound(String),

    /// The token is structurally invalid or a claim has an unexpected type.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The token header declares an algorithm other than RS256.
    #[error("unexpected signing method: {0}")]
    UnexpectedSigningMethod(String),

    /// The signature does not verify against the supplied key.
    #[error("{0}")]
    SignatureInvalid(String),

    /// The token's `exp` instant is at or before the current time.
    #[error("token is expired")]
    TokenExpired,

    /// The token is authentic but does not carry the required policy grant.
    #[error("invalid policy permission")]
    PolicyDenied,
}

impl AuthzError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthzError::KeySetUnavailable => 503,
            AuthzError::PolicyDenied => 403,
            AuthzError::KeyNotFound(_)
            | AuthzError::MalformedToken(_)
            | AuthzError::UnexpectedSigningMethod(_)
            | AuthzError::SignatureInvalid(_)
            | AuthzError::TokenExpired => 401,
        }
    }

    /// True when the caller was authenticated but lacks the required grant.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, AuthzError::PolicyDenied)
    }

    /// True when the failure points at configuration or the key endpoint,
    /// not at the presented token.
    pub fn is_infrastructure_failure(&self) -> bool {
        matches!(self, AuthzError::KeySetUnavailable)
    }

    /// Bounded label used for metrics and structured logs.
    pub fn error_type(&self) -> &'static str {
        match self {
            AuthzError::KeySetUnavailable => "key_set_unavailable",
            AuthzError::KeyNotFound(_) => "key_not_found",
            AuthzError::MalformedToken(_) => "malformed_token",
            AuthzError::UnexpectedSigningMethod(_) => "unexpected_signing_method",
            AuthzError::SignatureInvalid(_) => "signature_invalid",
            AuthzError::TokenExpired => "token_expired",
            AuthzError::PolicyDenied => "policy_denied",
        }
    }

    /// Value for a `WWW-Authenticate` response header (RFC 6750 section 3).
    ///
    /// `None` for failures that are not the caller's fault.
    pub fn www_authenticate(&self) -> Option<&'static str> {
        match self.status_code() {
            401 => Some("Bearer error=\"invalid_token\""),
            403 => Some("Bearer error=\"insufficient_scope\""),
            _ => None,
        }
    }

    /// Build the response body returned to callers.
    ///
    /// Messages are generic; the variant detail stays in server logs.
    pub fn client_error(&self) -> ErrorResponse {
        let (code, message) = match self.status_code() {
            503 => (
                "SERVICE_UNAVAILABLE",
                "Authentication service unavailable",
            ),
            403 => ("FORBIDDEN", "Insufficient permissions"),
            _ => ("INVALID_TOKEN", "The access token is invalid or expired"),
        };

        ErrorResponse {
            error: ErrorDetail { code, message },
        }
    }
}

/// Error body returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: &'static str,
}
