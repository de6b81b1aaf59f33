//! Model package manifests

use crate::Digest;
use serde::{Deserialize, Serialize};

/// The manifest content type used by the distribution protocol
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// A v2 image manifest listing a model's component blobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// The manifest schema version, always 2
    pub schema_version: u32,

    /// The manifest media type
    pub media_type: String,

    /// The config blob reference
    pub config: Layer,

    /// The component layer references
    pub layers: Vec<Layer>,
}

impl Manifest {
    /// All digests referenced by the manifest, config included
    pub fn digests(&self) -> impl Iterator<Item = &Digest> {
        self.layers
            .iter()
            .map(|l| &l.digest)
            .chain(std::iter::once(&self.config.digest))
    }
}

/// A reference to one blob within a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    /// The layer media type
    pub media_type: String,

    /// The blob digest
    pub digest: Digest,

    /// The blob size in bytes
    pub size: u64,

    /// The model this layer was inherited from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// Recognized model package layer kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Model weights
    Model,
    /// LoRA adapter weights
    Adapter,
    /// Visual projector weights
    Projector,
    /// Prompt template source
    Template,
    /// System message text
    System,
    /// Default parameters JSON
    Params,
    /// Seed conversation messages JSON
    Messages,
    /// License text
    License,
    /// Deprecated embedding blobs, ignored
    Embed,
}

impl MediaType {
    /// The wire string for the media type
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Model => "application/vnd.tusk.image.model",
            MediaType::Adapter => "application/vnd.tusk.image.adapter",
            MediaType::Projector => "application/vnd.tusk.image.projector",
            MediaType::Template => "application/vnd.tusk.image.template",
            MediaType::System => "application/vnd.tusk.image.system",
            MediaType::Params => "application/vnd.tusk.image.params",
            MediaType::Messages => "application/vnd.tusk.image.messages",
            MediaType::License => "application/vnd.tusk.image.license",
            MediaType::Embed => "application/vnd.tusk.image.embed",
        }
    }

    /// Parse a wire media type, `None` when unrecognized
    pub fn parse(s: &str) -> Option<Self> {
        [
            MediaType::Model,
            MediaType::Adapter,
            MediaType::Projector,
            MediaType::Template,
            MediaType::System,
            MediaType::Params,
            MediaType::Messages,
            MediaType::License,
            MediaType::Embed,
        ]
        .into_iter()
        .find(|m| m.as_str() == s)
    }
}

/// The config blob schema describing the packaged model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigV2 {
    /// The weight file format, e.g. `gguf`
    #[serde(default)]
    pub model_format: String,

    /// The primary model family
    #[serde(default)]
    pub model_family: String,

    /// All families the model belongs to
    #[serde(default)]
    pub model_families: Vec<String>,

    /// The parameter-count class, e.g. `8B`
    #[serde(default)]
    pub model_type: String,

    /// The quantization level of the weight file
    #[serde(default)]
    pub file_type: String,

    /// The target architecture
    #[serde(default)]
    pub architecture: String,

    /// The target operating system
    #[serde(default)]
    pub os: String,

    /// The layer diff listing
    #[serde(default)]
    pub rootfs: RootFs,
}

/// The layer diff listing inside [`ConfigV2`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootFs {
    /// The rootfs type, always `layers`
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Uncompressed layer digests
    #[serde(default)]
    pub diff_ids: Vec<String>,
}
