//! Sync wire protocol.
//!
//! Both endpoints take a JSON body over an authenticated POST:
//!
//! - delta sync: `{notes, syncNumber}` answered by
//!   `{type: "ok", notes, syncNumber}` or `{type: "require_full_sync"}`
//! - queue sync: `{noteHeads, syncNumber}` answered by `{noteHeads, syncNumber}`
//!
//! Requests carry the per-device token as a bearer credential and the client's
//! protocol version in [`PROTOCOL_HEADER`].

use serde::{Deserialize, Serialize};

use crate::models::{EncryptedNote, NoteHead};

/// Protocol version spoken by this build
pub const PROTOCOL_VERSION: u32 = 1;

/// Header carrying the client's protocol version
pub const PROTOCOL_HEADER: &str = "x-quire-protocol";

/// Path of the delta sync endpoint
pub const DELTA_SYNC_PATH: &str = "/v1/sync/delta";

/// Path of the queue sync endpoint
pub const QUEUE_SYNC_PATH: &str = "/v1/sync/queue";

/// Locally queued notes plus the device's sync counter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSyncRequest {
    pub notes: Vec<EncryptedNote>,
    pub sync_number: i64,
}

/// Result of a delta sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeltaSyncResponse {
    /// Merged; carries the notes queued for this device and the new counter
    Ok {
        notes: Vec<EncryptedNote>,
        #[serde(rename = "syncNumber")]
        sync_number: i64,
    },
    /// Counters diverged; nothing was merged
    RequireFullSync,
}

/// Every local note head plus the device's sync counter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSyncRequest {
    pub note_heads: Vec<NoteHead>,
    pub sync_number: i64,
}

/// The server's authoritative heads plus the new counter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSyncResponse {
    pub note_heads: Vec<NoteHead>,
    pub sync_number: i64,
}

/// JSON error body returned by the server for non-2xx responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}
