//! Model loader: manifest + blobs → a runnable model

use anyhow::{bail, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use store::ModelStore;
use tcore::{ConfigV2, Digest, MediaType, Message, ModelName};
use template::Template;
use tracing::{error, warn};

pub use crate::capability::{Capability, DOES_NOT_SUPPORT};

mod capability;
pub mod gguf;

/// A fully-resolved model, immutable after loading
#[derive(Debug, Clone)]
pub struct Model {
    /// The fully-qualified name
    pub name: String,

    /// The short display name
    pub short_name: String,

    /// The installed manifest's digest
    pub digest: Digest,

    /// The prompt template, defaulted when the package carries none
    pub template: Template,

    /// The packaged system message
    pub system: String,

    /// Default generation options from the params layer
    pub options: BTreeMap<String, Value>,

    /// Seed conversation messages
    pub messages: Vec<Message>,

    /// The weight file path
    pub model_path: Option<PathBuf>,

    /// The model this one was derived from
    pub parent_model: Option<String>,

    /// LoRA adapter weight paths
    pub adapter_paths: Vec<PathBuf>,

    /// Visual projector weight paths
    pub projector_paths: Vec<PathBuf>,

    /// License texts
    pub license: Vec<String>,

    /// The config blob contents
    pub config: ConfigV2,
}

/// Load a model from the store by name.
///
/// Every manifest layer dispatches on its media type into the matching
/// field; template layers re-parse through the template engine. Deprecated
/// embed layers are ignored with a warning.
pub fn load(store: &ModelStore, name: &ModelName) -> Result<Model> {
    let (manifest, digest) = store.get_manifest(name)?;

    let mut model = Model {
        name: name.to_string(),
        short_name: name.short(),
        digest,
        template: Template::default_template(),
        system: String::new(),
        options: BTreeMap::new(),
        messages: Vec::new(),
        model_path: None,
        parent_model: None,
        adapter_paths: Vec::new(),
        projector_paths: Vec::new(),
        license: Vec::new(),
        config: ConfigV2::default(),
    };

    let config_path = store.blob_path(&manifest.config.digest);
    match std::fs::read(&config_path) {
        Ok(raw) => model.config = serde_json::from_slice(&raw)?,
        Err(err) => warn!(path = %config_path.display(), %err, "missing config blob"),
    }

    for layer in &manifest.layers {
        let path = store.blob_path(&layer.digest);
        let Some(media_type) = MediaType::parse(&layer.media_type) else {
            warn!(media_type = %layer.media_type, "skipping unknown layer type");
            continue;
        };

        match media_type {
            MediaType::Model => {
                model.model_path = Some(path);
                model.parent_model = layer.from.clone();
            }
            MediaType::Adapter => model.adapter_paths.push(path),
            MediaType::Projector => model.projector_paths.push(path),
            MediaType::Template => {
                let source = std::fs::read_to_string(&path)?;
                model.template = Template::parse(&source)?;
            }
            MediaType::System => {
                model.system = std::fs::read_to_string(&path)?;
            }
            MediaType::Params => {
                let raw = std::fs::read(&path)?;
                model.options = serde_json::from_slice(&raw)?;
            }
            MediaType::Messages => {
                let raw = std::fs::read(&path)?;
                model.messages = serde_json::from_slice(&raw)?;
            }
            MediaType::License => {
                model.license.push(std::fs::read_to_string(&path)?);
            }
            MediaType::Embed => {
                warn!("model contains embed layers; embeds are deprecated and ignored");
            }
        }
    }

    Ok(model)
}

impl Model {
    /// Render the model as a modelfile-style listing for display
    pub fn modelfile(&self) -> String {
        let mut out = String::new();

        if let Some(path) = &self.model_path {
            out.push_str(&format!("MODEL {}\n", path.display()));
        }
        for adapter in &self.adapter_paths {
            out.push_str(&format!("ADAPTER {}\n", adapter.display()));
        }
        for projector in &self.projector_paths {
            out.push_str(&format!("PROJECTOR {}\n", projector.display()));
        }
        if !self.template.source().is_empty() {
            out.push_str(&format!("TEMPLATE \"\"\"{}\"\"\"\n", self.template.source()));
        }
        if !self.system.is_empty() {
            out.push_str(&format!("SYSTEM \"\"\"{}\"\"\"\n", self.system));
        }
        for (key, value) in &self.options {
            match value {
                Value::Array(values) => {
                    for v in values {
                        out.push_str(&format!("PARAMETER {key} {}\n", scalar(v)));
                    }
                }
                v => out.push_str(&format!("PARAMETER {key} {}\n", scalar(v))),
            }
        }
        for license in &self.license {
            out.push_str(&format!("LICENSE \"\"\"{license}\"\"\"\n"));
        }
        for msg in &self.messages {
            out.push_str(&format!("MESSAGE {} {}\n", msg.role.as_str(), msg.content));
        }

        out
    }

    /// Check that the model supports every requested capability.
    ///
    /// Failures are joined into a single `does not support ...` error; an
    /// unrecognized capability is its own error.
    pub fn check_capabilities(&self, caps: &[Capability]) -> Result<()> {
        let mut missing = Vec::new();

        for cap in caps {
            match cap {
                Capability::Completion => {
                    let Some(path) = &self.model_path else {
                        error!("no weight file to check completion capability");
                        continue;
                    };
                    match gguf::metadata(path) {
                        Ok(md) => {
                            if gguf::is_pooling_only(&md) {
                                missing.push(Capability::Completion);
                            }
                        }
                        Err(err) => error!(%err, "couldn't read gguf metadata"),
                    }
                }
                Capability::Tools => {
                    if !self.template.vars().iter().any(|v| v == "tools") {
                        missing.push(Capability::Tools);
                    }
                }
                Capability::Insert => {
                    if !self.template.vars().iter().any(|v| v == "suffix") {
                        missing.push(Capability::Insert);
                    }
                }
            }
        }

        if !missing.is_empty() {
            let list: Vec<&str> = missing.iter().map(|c| c.as_str()).collect();
            bail!("{DOES_NOT_SUPPORT} {}", list.join(" "));
        }
        Ok(())
    }
}

fn scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
