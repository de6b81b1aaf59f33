//! Tests for bearer-challenge parsing and client preflight checks.

use registry::auth::Challenge;
use registry::{Client, RegistryOptions};
use std::sync::Arc;
use store::ModelStore;
use tcore::ModelName;

#[tokio::test]
async fn plain_http_rejected_without_insecure() {
    let dir = tempfile::tempdir().unwrap();
    let client = Client::new(ModelStore::new(dir.path()), RegistryOptions::default()).unwrap();
    let name = ModelName::parse("http://localhost:5000/acme/tiny").unwrap();

    let err = client.pull(&name, Arc::new(|_| {})).await.unwrap_err();
    assert!(err.to_string().contains("insecure protocol http"));
}

#[tokio::test]
async fn plain_http_rejected_for_push() {
    let dir = tempfile::tempdir().unwrap();
    let client = Client::new(ModelStore::new(dir.path()), RegistryOptions::default()).unwrap();
    let name = ModelName::parse("http://localhost:5000/acme/tiny").unwrap();

    let err = client.push(&name, Arc::new(|_| {})).await.unwrap_err();
    assert!(err.to_string().contains("insecure protocol http"));
}

#[test]
fn bearer_challenge_parses_fields() {
    let c = Challenge::parse(
        r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:acme/tiny:pull""#,
    )
    .unwrap();
    assert_eq!(c.realm, "https://auth.example.com/token");
    assert_eq!(c.service.as_deref(), Some("registry.example.com"));
    assert_eq!(c.scope.as_deref(), Some("repository:acme/tiny:pull"));
}

#[test]
fn challenge_token_url_carries_parameters() {
    let c = Challenge::parse(
        r#"Bearer realm="https://auth.example.com/token",service="reg",scope="repository:a/b:pull""#,
    )
    .unwrap();
    assert_eq!(
        c.token_url(),
        "https://auth.example.com/token?service=reg&scope=repository:a/b:pull"
    );
}

#[test]
fn challenge_without_realm_fails() {
    assert!(Challenge::parse(r#"Bearer service="reg""#).is_err());
}

#[test]
fn basic_challenge_unsupported() {
    assert!(Challenge::parse(r#"Basic realm="reg""#).is_err());
}

#[test]
fn scope_with_comma_inside_quotes() {
    let c = Challenge::parse(
        r#"Bearer realm="https://auth/token",scope="repository:a/b:pull,push""#,
    )
    .unwrap();
    assert_eq!(c.scope.as_deref(), Some("repository:a/b:pull,push"));
}

#[test]
fn unquoted_parameters_parse() {
    let c = Challenge::parse("Bearer realm=https://auth/token,service=reg").unwrap();
    assert_eq!(c.realm, "https://auth/token");
    assert_eq!(c.service.as_deref(), Some("reg"));
}
