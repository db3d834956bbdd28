//! Document snapshot format.
//!
//! A saved document is `{ time, version, blocks: [{ id, type, data, tunes? }] }`.
//! Block data is opaque to the core: each tool owns the shape of its own
//! object, so it is carried as a JSON map.

use serde::{Deserialize, Serialize};

use crate::ids::BlockId;

/// Tool-owned block payload.
pub type BlockData = serde_json::Map<String, serde_json::Value>;

/// Saved tune payloads keyed by tune name.
pub type BlockTuneData = serde_json::Map<String, serde_json::Value>;

/// Snapshot format version written by this crate.
pub const FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One saved block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputBlockData {
    /// Block id. Missing ids are generated on render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BlockId>,
    /// Tool name.
    #[serde(rename = "type")]
    pub tool: String,
    /// Tool-owned payload.
    #[serde(default)]
    pub data: BlockData,
    /// Tune payloads, omitted when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunes: Option<BlockTuneData>,
}

impl OutputBlockData {
    pub fn new(tool: impl Into<String>, data: BlockData) -> Self {
        Self {
            id: None,
            tool: tool.into(),
            data,
            tunes: None,
        }
    }

    pub fn with_id(mut self, id: BlockId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_tunes(mut self, tunes: BlockTuneData) -> Self {
        self.tunes = if tunes.is_empty() { None } else { Some(tunes) };
        self
    }
}

/// A whole-document snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    /// Unix milliseconds at save time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    /// Format version that produced the snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub blocks: Vec<OutputBlockData>,
}

impl OutputData {
    /// Snapshot stamped with the current time and format version.
    pub fn new(blocks: Vec<OutputBlockData>) -> Self {
        Self {
            time: Some(crate::now_millis()),
            version: Some(FORMAT_VERSION.to_string()),
            blocks,
        }
    }

    /// Snapshot with no blocks and no stamp.
    pub fn empty() -> Self {
        Self {
            time: None,
            version: None,
            blocks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Default for OutputData {
    fn default() -> Self {
        Self::empty()
    }
}

/// Build a `BlockData` from a `serde_json::json!` object literal.
///
/// Non-object values yield an empty map.
pub fn block_data(value: serde_json::Value) -> BlockData {
    match value {
        serde_json::Value::Object(map) => map,
        _ => BlockData::new(),
    }
}
