//! Bearer Token Authorization Library
//!
//! This library verifies bearer tokens against a remotely published JSON Web
//! Key Set and enforces the authorization policy carried in the token claims:
//!
//! - Key resolution by `kid` from a fetched key set
//! - RS256 signature verification
//! - Expiration checks
//! - Policy enforcement on a configurable claim
//!
//! # Architecture
//!
//! ```text
//! token -> jwt::extract_kid -> KeySource::lookup -> TokenValidator::validate -> Claims
//! ```
//!
//! [`Authorizer`] runs that flow. [`KeyResolver`] is the production
//! [`KeySource`]; a static [`KeySet`] also implements it.
//!
//! # Modules
//!
//! - `authorizer` - Composition of key resolution and validation
//! - `claims` - Validated claims
//! - `config` - Configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `jwks` - Key set fetching and key resolution
//! - `jwt` - Token validation
//! - `observability` - Metrics and tracing setup
//! - `policy` - Policy rules applied to the policy claim

pub mod authorizer;
pub mod claims;
pub mod config;
pub mod errors;
pub mod jwks;
pub mod jwt;
pub mod observability;
pub mod policy;

pub use authorizer::Authorizer;
pub use claims::{ClaimValue, Claims};
pub use config::Config;
pub use errors::AuthzError;
pub use jwks::{FetchError, KeyResolver, KeySet, KeySource, VerificationKey};
pub use jwt::TokenValidator;
pub use policy::{ContainsToken, PolicyRule};
