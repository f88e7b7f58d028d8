//! Deterministic cryptographic fixtures for testing
//!
//! Provides two fixed RSA-2048 keypairs with their JWK components, so tests can
//! publish a key set and sign tokens that verify against it.
//! The private keys exist only for tests; never reuse them anywhere else.

use serde_json::{json, Value};

/// An RSA keypair with its public JWK components.
#[derive(Debug, Clone, Copy)]
pub struct RsaKeyFixture {
    /// PKCS#1 PEM private key, for signing test tokens.
    pub private_pem: &'static str,

    /// SPKI PEM public key.
    pub public_pem: &'static str,

    /// Base64url modulus.
    pub n: &'static str,

    /// Base64url public exponent.
    pub e: &'static str,
}

/// The keypair tests publish by default.
pub fn primary_key() -> RsaKeyFixture {
    RsaKeyFixture {
        private_pem: include_str!("../fixtures/primary_rsa.pem"),
        public_pem: include_str!("../fixtures/primary_rsa.pub"),
        n: "z8jTc872zO2H10x5NoTZz_Gbez95OWg84Zyj-fTHG5F0pD1lRwzbWdB1r5rOWHXw3uSfiQtfHUiJg4K_klh2oIZT9Yf3oT46KI_L2053TxaeLzogOhjb6uHUaXA5y06EhZ5rCD9W5MIHL8fq5UlLWA-EAfsplaHKJBoLMBIlOLmndQkgFgqkoiystyT7NfsvdyS5T60fJkT0QhdcCkrOWxr9BCcO52fuiYmn_-jerq7-LWvgWg1pWX2ZCZSxRSu-64kfISSMb7qUCJ8hvi9IdX2w-zpkXEuR92qiJnI0S237O0RczBvm8f2WPRGQCbropkBORiZR2weBldfUXm0jEQ",
        e: "AQAB",
    }
}

/// A second, unrelated keypair for wrong-key and rotation scenarios.
pub fn other_key() -> RsaKeyFixture {
    RsaKeyFixture {
        private_pem: include_str!("../fixtures/other_rsa.pem"),
        public_pem: include_str!("../fixtures/other_rsa.pub"),
        n: "vSngiUIgJG2gjL07sX7Ai8_kiUXP-A7ntzLTpwUcBNJfej3TQuCdg4-yrSVKXJrFgdv35yfWfGcgsGywe4EzsG4B38Wh_po83XEln-thx13oiv6YvaavopB4-oOIL-1BkANmmG8B7_PznRngOKlD36v9efgAkZUVZF-CdwbDCQiwyxJb6XbJCFYzeYQJ8yrxAg6HRqthHK36vh835dTdDqHQWR6oDHjFjlrRmkfrEe17FB68LST4Au6B2BvhuS2gO-fK_AbCH9BE67gKOJRl6SZZWFvdU6kwaVKTP7iZJM_t9mQTiPPqEyisToKBNdXLMujDls1d6OHb1BTz9L673Q",
        e: "AQAB",
    }
}

/// JWK entry for a fixture as an issuer would publish it.
pub fn rsa_jwk(fixture: &RsaKeyFixture, kid: &str) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": fixture.n,
        "e": fixture.e,
    })
}

/// Wrap JWK entries in a JWKS document.
pub fn jwks_document(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}
