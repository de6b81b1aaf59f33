//! Execution backend abstraction for the CLI
//!
//! The REPL and one-shot commands speak to a `Runner` so tests can drive
//! them with a mock while the real binary streams from the local server.

use anyhow::Result;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tcore::Message;

pub mod http;

pub use http::HttpRunner;

/// A chat request issued by the REPL
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to chat with
    pub model: String,

    /// The conversation so far
    pub messages: Vec<Message>,

    /// Session parameter overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,

    /// Output format constraint, `json` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// One streamed chat chunk; `done` marks the terminal message
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatChunk {
    /// The partial assistant message
    pub message: Message,

    /// Whether generation finished with this chunk
    #[serde(default)]
    pub done: bool,
}

/// A model listing entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelEntry {
    /// The model name
    pub name: String,

    /// Total package size in bytes
    #[serde(default)]
    pub size: u64,
}

/// Model details for `/show`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShowResponse {
    /// License text
    #[serde(default)]
    pub license: String,

    /// Modelfile-style listing
    #[serde(default)]
    pub modelfile: String,

    /// Model-defined parameters, one per line
    #[serde(default)]
    pub parameters: String,

    /// Packaged system message
    #[serde(default)]
    pub system: String,

    /// Template source
    #[serde(default)]
    pub template: String,

    /// Free-form details
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

/// A request to save the session as a new model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRequest {
    /// The new model name
    pub model: String,

    /// The model it derives from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// The session system message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system: String,

    /// Session parameters to bake in
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,

    /// Conversation history to bake in
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
}

/// The execution backend the CLI front-ends drive
pub trait Runner {
    /// List installed models
    fn list(&self) -> impl std::future::Future<Output = Result<Vec<ModelEntry>>> + Send;

    /// Fetch details for one model
    fn show(&self, model: &str) -> impl std::future::Future<Output = Result<ShowResponse>> + Send;

    /// Create a model from the current session
    fn create(&self, req: &CreateRequest) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Load a model into the server, verifying it exists
    fn load(&self, model: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Stream a chat completion
    fn chat(&self, req: ChatRequest) -> impl Stream<Item = Result<ChatChunk>> + Send;
}
