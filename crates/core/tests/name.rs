//! Tests for model name parsing.

use tcore::env::DEFAULT_HOST;
use tcore::ModelName;

#[test]
fn bare_name_gets_defaults() {
    let n = ModelName::parse("llama3").unwrap();
    assert_eq!(n.host, DEFAULT_HOST);
    assert_eq!(n.namespace, "library");
    assert_eq!(n.name, "llama3");
    assert_eq!(n.tag, "latest");
    assert!(n.is_fully_qualified());
}

#[test]
fn name_with_tag() {
    let n = ModelName::parse("llama3:8b").unwrap();
    assert_eq!(n.name, "llama3");
    assert_eq!(n.tag, "8b");
}

#[test]
fn namespaced_name() {
    let n = ModelName::parse("acme/llama3:8b").unwrap();
    assert_eq!(n.namespace, "acme");
    assert_eq!(n.short(), "acme/llama3:8b");
}

#[test]
fn fully_qualified_name() {
    let n = ModelName::parse("registry.example.com/acme/llama3:8b").unwrap();
    assert_eq!(n.host, "registry.example.com");
    assert_eq!(n.base_url(), "https://registry.example.com");
    assert_eq!(n.repository(), "acme/llama3");
    assert_eq!(n.to_string(), "registry.example.com/acme/llama3:8b");
}

#[test]
fn http_scheme_is_insecure() {
    let n = ModelName::parse("http://localhost:5000/acme/llama3").unwrap();
    assert_eq!(n.scheme, "http");
    assert_eq!(n.host, "localhost:5000");
    assert_eq!(n.tag, "latest");
    assert_eq!(n.base_url(), "http://localhost:5000");
}

#[test]
fn unknown_scheme_rejected() {
    assert!(ModelName::parse("ftp://host/ns/name").is_err());
}

#[test]
fn manifest_path_encodes_all_parts() {
    let n = ModelName::parse("registry.example.com/acme/llama3:8b").unwrap();
    let path = n.manifest_rel_path();
    let parts: Vec<_> = path.iter().map(|p| p.to_str().unwrap()).collect();
    assert_eq!(parts, ["registry.example.com", "acme", "llama3", "8b"]);
}

#[test]
fn short_form_hides_library() {
    let n = ModelName::parse("llama3:8b").unwrap();
    assert_eq!(n.short(), "llama3:8b");
}
