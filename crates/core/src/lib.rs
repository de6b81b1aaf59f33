//! Shared types for the tusk model runtime

pub use crate::{
    digest::{Digest, DigestReader, INVALID_DIGEST_FORMAT},
    manifest::{ConfigV2, Layer, Manifest, MediaType, RootFs},
    message::{Message, Role, Tool, ToolCall, ToolFunction},
    name::ModelName,
    options::format_params,
    progress::Progress,
};

pub mod digest;
pub mod env;
pub mod manifest;
pub mod message;
pub mod name;
pub mod options;
pub mod progress;
