//! Fully-qualified model names

use crate::env;
use anyhow::{bail, Result};
use compact_str::CompactString;
use std::fmt;
use std::path::PathBuf;

/// A model name of the form `host/namespace/name:tag`.
///
/// Parsing fills missing parts with defaults: the configured registry host,
/// the `library` namespace, and the `latest` tag. A `http://` prefix selects
/// the insecure protocol scheme and is otherwise stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelName {
    /// The protocol scheme, `https` unless overridden
    pub scheme: CompactString,

    /// The registry host
    pub host: CompactString,

    /// The namespace under the registry
    pub namespace: CompactString,

    /// The bare model name
    pub name: CompactString,

    /// The version tag
    pub tag: CompactString,
}

/// The default namespace for unqualified names
pub const DEFAULT_NAMESPACE: &str = "library";
/// The default tag for untagged names
pub const DEFAULT_TAG: &str = "latest";

impl ModelName {
    /// Parse a possibly-abbreviated model name
    pub fn parse(s: &str) -> Result<Self> {
        let (scheme, rest) = match s.split_once("://") {
            Some(("http", rest)) => ("http", rest),
            Some(("https", rest)) => ("https", rest),
            Some((scheme, _)) => bail!("unsupported scheme {scheme:?} in model name {s:?}"),
            None => ("https", s),
        };

        let (rest, tag) = match rest.rsplit_once(':') {
            Some((rest, tag)) if !tag.contains('/') => (rest, tag),
            _ => (rest, DEFAULT_TAG),
        };

        let parts: Vec<&str> = rest.split('/').collect();
        let (host, namespace, name) = match parts.as_slice() {
            [name] => (env::registry_host(), DEFAULT_NAMESPACE.into(), *name),
            [namespace, name] => (env::registry_host(), CompactString::from(*namespace), *name),
            [host, namespace, name] => (
                CompactString::from(*host),
                CompactString::from(*namespace),
                *name,
            ),
            _ => bail!("invalid model name {s:?}"),
        };

        if name.is_empty() {
            bail!("invalid model name {s:?}");
        }

        Ok(Self {
            scheme: scheme.into(),
            host,
            namespace,
            name: name.into(),
            tag: tag.into(),
        })
    }

    /// Whether all four parts are present
    pub fn is_fully_qualified(&self) -> bool {
        !self.host.is_empty()
            && !self.namespace.is_empty()
            && !self.name.is_empty()
            && !self.tag.is_empty()
    }

    /// The manifest file path relative to the manifests root
    pub fn manifest_rel_path(&self) -> PathBuf {
        PathBuf::from(self.host.as_str())
            .join(self.namespace.as_str())
            .join(self.name.as_str())
            .join(self.tag.as_str())
    }

    /// The registry base URL, e.g. `https://registry.tusk.dev`
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// The `namespace/name` repository path on the registry
    pub fn repository(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// The short display form, omitting default host and namespace
    pub fn short(&self) -> String {
        if self.host == env::registry_host() && self.namespace == DEFAULT_NAMESPACE {
            format!("{}:{}", self.name, self.tag)
        } else {
            format!("{}/{}:{}", self.namespace, self.name, self.tag)
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}:{}",
            self.host, self.namespace, self.name, self.tag
        )
    }
}
