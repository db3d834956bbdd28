//! Shared vocabulary for blocksmith.
//!
//! Identity, snapshot and mutation types used by the editing core and by
//! anything that persists or transports documents.
//!
//! ## Design
//!
//! Block data stays untyped (`serde_json::Map`) because each tool plugin owns
//! its own payload shape. Everything around the payload (ids, tool names,
//! tune maps, the snapshot envelope) is typed here.

pub mod ids;
pub mod mutation;
pub mod snapshot;

pub use ids::{BLOCK_ID_LEN, BlockId, NodeId};
pub use mutation::MutationKind;
pub use snapshot::{
    BlockData, BlockTuneData, FORMAT_VERSION, OutputBlockData, OutputData, block_data,
};

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
