//! Transfer progress events

use crate::Digest;
use serde::{Deserialize, Serialize};

/// One progress event emitted during a pull or push.
///
/// Events for a single blob arrive in monotonic `completed` order; no order
/// is guaranteed across blobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// A human-readable phase description
    pub status: String,

    /// The blob the event refers to, when any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,

    /// Total bytes for the blob
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    /// Bytes transferred so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
}

impl Progress {
    /// A status-only event
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }
}
