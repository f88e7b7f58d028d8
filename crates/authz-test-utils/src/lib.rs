//! # Authz Test Utilities
//!
//! Shared test utilities for the `authz` crate.
//!
//! This crate provides:
//! - Deterministic RSA fixtures (fixed keys with their JWK components)
//! - Test claims builder and token signers (RS256, HS256, HS512)
//! - JWKS endpoint harness (`JwksMockServer`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use authz_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let server = JwksMockServer::start().await;
//!     server.serve_keys(&[rsa_jwk(&primary_key(), "key-1")]).await;
//!
//!     let token = sign_rs256(
//!         &primary_key(),
//!         "key-1",
//!         &TestClaimsBuilder::new().with_policy("ReadDevices").build(),
//!     );
//! }
//! ```

pub mod crypto_fixtures;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use server_harness::*;
pub use token_builders::*;
