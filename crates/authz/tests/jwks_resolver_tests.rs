//! Key resolver integration tests.
//!
//! Exercises fetching, refreshing and snapshot replacement against a mocked
//! JWKS endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use authz::config::Config;
use authz::jwks::{FetchError, KeyResolver, KeySet, VerificationKey, MAX_JWKS_RESPONSE_BYTES};
use authz::AuthzError;
use authz_test_utils::{other_key, primary_key, rsa_jwk, JwksMockServer};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn server_with_primary(kid: &str) -> JwksMockServer {
    let server = JwksMockServer::start().await;
    server.serve_keys(&[rsa_jwk(&primary_key(), kid)]).await;
    server
}

#[tokio::test]
async fn test_connect_loads_key_set() -> Result<()> {
    let server = JwksMockServer::start().await;
    server
        .serve_keys(&[
            rsa_jwk(&primary_key(), "key-1"),
            rsa_jwk(&other_key(), "key-2"),
        ])
        .await;

    let resolver = KeyResolver::connect_url(server.jwks_url(), &CancellationToken::new()).await?;

    assert!(resolver.is_available());
    assert_eq!(resolver.snapshot().unwrap().kids(), vec!["key-1", "key-2"]);
    assert_eq!(resolver.lookup("key-2")?.kid(), "key-2");
    assert_eq!(server.request_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_connect_from_config() -> Result<()> {
    let server = server_with_primary("key-1").await;
    let config = Config {
        jwks_url: Some(server.jwks_url()),
        ..Config::default()
    };

    let resolver = KeyResolver::connect(&config, &CancellationToken::new()).await?;

    assert!(resolver.is_available());
    assert_eq!(resolver.jwks_url(), Some(server.jwks_url().as_str()));
    Ok(())
}

#[tokio::test]
async fn test_connect_without_url_is_unavailable() {
    let resolver = KeyResolver::connect(&Config::default(), &CancellationToken::new()).await.unwrap();

    assert!(!resolver.is_available());
    assert_eq!(
        resolver.lookup("key-1").unwrap_err(),
        AuthzError::KeySetUnavailable
    );
}

#[tokio::test]
async fn test_initial_fetch_http_error_leaves_resolver_unavailable() {
    let server = JwksMockServer::start().await;
    server.fail_with_status(500).await;

    let resolver = KeyResolver::connect_url(server.jwks_url(), &CancellationToken::new()).await.unwrap();

    assert!(!resolver.is_available());
    assert_eq!(
        resolver.lookup("key-1").unwrap_err(),
        AuthzError::KeySetUnavailable
    );
}

#[tokio::test]
async fn test_initial_fetch_unreachable_leaves_resolver_unavailable() {
    // Nothing listens on the discard port
    let resolver = KeyResolver::connect_url(
        "http://127.0.0.1:9/.well-known/jwks.json",
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(!resolver.is_available());
}

#[tokio::test]
async fn test_refresh_reports_http_status() {
    let server = JwksMockServer::start().await;
    server.fail_with_status(404).await;
    let resolver = KeyResolver::new(Some(server.jwks_url()), Duration::from_secs(5)).unwrap();

    let result = resolver.refresh(&CancellationToken::new()).await;

    assert_eq!(result.unwrap_err(), FetchError::HttpStatus(404));
}

#[tokio::test]
async fn test_refresh_replaces_key_set() -> Result<()> {
    let server = server_with_primary("key-1").await;
    let resolver = KeyResolver::connect_url(server.jwks_url(), &CancellationToken::new()).await?;
    let updates = resolver.subscribe();

    server.serve_keys(&[rsa_jwk(&other_key(), "key-2")]).await;
    let key_count = resolver.refresh(&CancellationToken::new()).await?;

    assert_eq!(key_count, 1);
    assert!(updates.has_changed()?);
    assert_eq!(
        resolver.lookup("key-1").unwrap_err(),
        AuthzError::KeyNotFound("key-1".to_string())
    );
    assert!(resolver.lookup("key-2").is_ok());
    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_key_set() -> Result<()> {
    let server = server_with_primary("key-1").await;
    let resolver = KeyResolver::connect_url(server.jwks_url(), &CancellationToken::new()).await?;
    let before = resolver.snapshot().unwrap();

    server.fail_with_status(503).await;
    let result = resolver.refresh(&CancellationToken::new()).await;

    assert_eq!(result.unwrap_err(), FetchError::HttpStatus(503));
    assert!(Arc::ptr_eq(&before, &resolver.snapshot().unwrap()));
    assert!(resolver.lookup("key-1").is_ok());
    Ok(())
}

#[tokio::test]
async fn test_corrupt_document_keeps_previous_key_set() -> Result<()> {
    let server = server_with_primary("key-1").await;
    let resolver = KeyResolver::connect_url(server.jwks_url(), &CancellationToken::new()).await?;

    // A duplicate kid must not leave a partially-updated set behind
    server
        .serve_keys(&[
            rsa_jwk(&other_key(), "key-2"),
            rsa_jwk(&primary_key(), "key-2"),
        ])
        .await;
    let result = resolver.refresh(&CancellationToken::new()).await;
    assert_eq!(
        result.unwrap_err(),
        FetchError::DuplicateKid("key-2".to_string())
    );

    server
        .serve_json(json!({"keys": [{"kty": "RSA", "kid": "key-3", "n": "%%%", "e": "AQAB"}]}))
        .await;
    let result = resolver.refresh(&CancellationToken::new()).await;
    assert!(matches!(result, Err(FetchError::InvalidKey { .. })));

    server.serve_raw("<html>not json</html>").await;
    let result = resolver.refresh(&CancellationToken::new()).await;
    assert!(matches!(result, Err(FetchError::InvalidDocument(_))));

    assert_eq!(resolver.snapshot().unwrap().kids(), vec!["key-1"]);
    Ok(())
}

#[tokio::test]
async fn test_non_rsa_keys_are_skipped() -> Result<()> {
    let server = JwksMockServer::start().await;
    server
        .serve_json(json!({
            "keys": [
                {"kty": "OKP", "kid": "ed-key", "crv": "Ed25519", "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"},
                rsa_jwk(&primary_key(), "key-1"),
            ]
        }))
        .await;

    let resolver = KeyResolver::connect_url(server.jwks_url(), &CancellationToken::new()).await?;

    assert!(resolver.lookup("key-1").is_ok());
    assert_eq!(
        resolver.lookup("ed-key").unwrap_err(),
        AuthzError::KeyNotFound("ed-key".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_oversized_response_rejected() {
    let server = JwksMockServer::start().await;
    server
        .serve_raw(vec![b' '; MAX_JWKS_RESPONSE_BYTES + 1])
        .await;
    let resolver = KeyResolver::new(Some(server.jwks_url()), Duration::from_secs(5)).unwrap();

    let result = resolver.refresh(&CancellationToken::new()).await;

    assert_eq!(
        result.unwrap_err(),
        FetchError::ResponseTooLarge(MAX_JWKS_RESPONSE_BYTES)
    );
    assert!(!resolver.is_available());
}

#[tokio::test]
async fn test_cancelled_refresh_keeps_previous_key_set() -> Result<()> {
    let server = server_with_primary("key-1").await;
    let resolver = KeyResolver::connect_url(server.jwks_url(), &CancellationToken::new()).await?;

    server
        .serve_keys_delayed(&[rsa_jwk(&other_key(), "key-2")], Duration::from_secs(5))
        .await;

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = resolver.refresh(&cancel).await;

    assert_eq!(result.unwrap_err(), FetchError::Cancelled);
    assert!(resolver.lookup("key-1").is_ok());
    assert!(matches!(
        resolver.lookup("key-2"),
        Err(AuthzError::KeyNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_already_cancelled_initial_fetch_is_unavailable() {
    let server = server_with_primary("key-1").await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let resolver = KeyResolver::connect_url(server.jwks_url(), &cancel).await.unwrap();

    assert!(!resolver.is_available());
}

#[tokio::test]
async fn test_fetch_timeout_is_transport_error() {
    let server = JwksMockServer::start().await;
    server
        .serve_keys_delayed(&[rsa_jwk(&primary_key(), "key-1")], Duration::from_secs(3))
        .await;
    let resolver = KeyResolver::new(Some(server.jwks_url()), Duration::from_millis(200)).unwrap();

    let result = resolver.refresh(&CancellationToken::new()).await;

    assert!(matches!(result, Err(FetchError::Transport(_))));
    assert!(!resolver.is_available());
}

/// Serve one chunked response of `total` bytes without Content-Length and
/// return how many bytes the peer accepted before closing the connection.
async fn spawn_chunked_server(total: usize) -> (String, tokio::task::JoinHandle<usize>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/.well-known/jwks.json", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;

        let head = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n";
        if socket.write_all(head.as_bytes()).await.is_err() {
            return 0;
        }

        let chunk = vec![b' '; 64 * 1024];
        let mut written = 0;
        while written < total {
            let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
            frame.extend_from_slice(&chunk);
            frame.extend_from_slice(b"\r\n");
            if socket.write_all(&frame).await.is_err() {
                return written;
            }
            written += chunk.len();
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
        written
    });

    (url, handle)
}

#[tokio::test]
async fn test_chunked_oversized_response_rejected_while_streaming() {
    const TOTAL: usize = 32 * 1024 * 1024;
    let (url, server) = spawn_chunked_server(TOTAL).await;
    let resolver = KeyResolver::new(Some(url), Duration::from_secs(10)).unwrap();

    let result = resolver.refresh(&CancellationToken::new()).await;
    drop(resolver);

    assert_eq!(
        result.unwrap_err(),
        FetchError::ResponseTooLarge(MAX_JWKS_RESPONSE_BYTES)
    );

    // The connection is dropped at the cap, so the server cannot deliver the full body
    let written = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("server should observe the closed connection")
        .unwrap();
    assert!(
        written < TOTAL,
        "client consumed {} bytes before enforcing the {} byte cap",
        written,
        MAX_JWKS_RESPONSE_BYTES
    );
}

fn generation(prefix: &str) -> KeySet {
    let primary = primary_key();
    let other = other_key();
    KeySet::from_keys([
        VerificationKey::from_rsa_components(format!("{prefix}-1"), primary.n, primary.e).unwrap(),
        VerificationKey::from_rsa_components(format!("{prefix}-2"), other.n, other.e).unwrap(),
    ])
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_never_observe_mixed_sets() {
    let resolver = Arc::new(KeyResolver::from_key_set(generation("old")).unwrap());

    let writer = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move {
            for round in 0..200 {
                let prefix = if round % 2 == 0 { "new" } else { "old" };
                resolver.replace_key_set(generation(prefix));
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move {
                for _ in 0..500 {
                    let snapshot = resolver.snapshot().unwrap();
                    let kids = snapshot.kids();
                    assert!(
                        kids == ["old-1", "old-2"] || kids == ["new-1", "new-2"],
                        "observed mixed key set: {:?}",
                        kids
                    );

                    // Within one snapshot, a hit on one generation implies its sibling
                    let prefix = kids[0].trim_end_matches("-1");
                    assert!(snapshot.contains(&format!("{prefix}-2")));

                    // A lookup sees exactly one generation's pair
                    let key = snapshot.get(kids[1]).unwrap();
                    assert!(key.kid().starts_with(prefix));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for result in futures::future::join_all(readers).await {
        result.unwrap();
    }
}
