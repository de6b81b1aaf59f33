//! Environment lookups

use compact_str::CompactString;
use std::path::PathBuf;

/// Overrides the model store root
pub const MODELS_VAR: &str = "TUSK_MODELS";
/// Overrides the default registry host
pub const HOST_VAR: &str = "TUSK_HOST";
/// Disables interactive history when set
pub const NOHISTORY_VAR: &str = "TUSK_NOHISTORY";

/// Overrides the local API server address
pub const SERVER_VAR: &str = "TUSK_SERVER";

/// The built-in registry host
pub const DEFAULT_HOST: &str = "registry.tusk.dev";

/// The local API server address the CLI talks to
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:11711";

/// Resolve the local API server base URL
pub fn server_url() -> String {
    match std::env::var(SERVER_VAR) {
        Ok(url) if !url.is_empty() => url,
        _ => DEFAULT_SERVER.to_string(),
    }
}

/// Resolve the model store root, `~/.tusk/models` unless overridden
pub fn models_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(MODELS_VAR).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tusk")
        .join("models")
}

/// Resolve the default registry host
pub fn registry_host() -> CompactString {
    match std::env::var(HOST_VAR) {
        Ok(host) if !host.is_empty() => host.into(),
        _ => DEFAULT_HOST.into(),
    }
}

/// Whether interactive history is disabled
pub fn no_history() -> bool {
    std::env::var_os(NOHISTORY_VAR).is_some_and(|v| !v.is_empty())
}
