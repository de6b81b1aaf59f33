//! Bearer-token negotiation for the distribution protocol

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

/// A parsed `Www-Authenticate: Bearer ...` challenge
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    /// The token endpoint
    pub realm: String,

    /// The service parameter forwarded to the token endpoint
    pub service: Option<String>,

    /// The scope parameter forwarded to the token endpoint
    pub scope: Option<String>,
}

impl Challenge {
    /// Parse a bearer challenge header value
    pub fn parse(header: &str) -> Result<Self> {
        let Some(rest) = header.trim().strip_prefix("Bearer ") else {
            bail!("unsupported auth challenge {header:?}");
        };

        let mut fields = BTreeMap::new();
        for part in split_challenge(rest) {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            fields.insert(
                key.trim().to_ascii_lowercase(),
                value.trim().trim_matches('"').to_string(),
            );
        }

        let realm = fields
            .remove("realm")
            .context("auth challenge missing realm")?;
        Ok(Self {
            realm,
            service: fields.remove("service"),
            scope: fields.remove("scope"),
        })
    }

    /// The token-endpoint URL with service and scope query parameters
    pub fn token_url(&self) -> String {
        let mut url = self.realm.clone();
        let mut sep = if url.contains('?') { '&' } else { '?' };
        for (key, value) in [("service", &self.service), ("scope", &self.scope)] {
            if let Some(value) = value {
                url.push(sep);
                url.push_str(key);
                url.push('=');
                url.push_str(value);
                sep = '&';
            }
        }
        url
    }
}

/// Split challenge parameters on commas outside quotes
fn split_challenge(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// The token endpoint response shape
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// The bearer token under its common name
    #[serde(default)]
    pub token: String,

    /// The OAuth2-style alias some registries use instead
    #[serde(default)]
    pub access_token: String,
}

impl TokenResponse {
    /// The usable token, whichever field carried it
    pub fn token(self) -> Result<String> {
        if !self.token.is_empty() {
            return Ok(self.token);
        }
        if !self.access_token.is_empty() {
            return Ok(self.access_token);
        }
        bail!("token endpoint returned no token");
    }
}
