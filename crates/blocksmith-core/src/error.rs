//! Error types for the editing core.
//!
//! Structural command failures are returned to the caller. Per-block failures
//! (save, destroy, tool preparation) are collected by the component that runs
//! the batch and never abort it.

use blocksmith_types::BlockId;
use thiserror::Error;

/// Errors raised by editor components.
#[derive(Debug, Error, PartialEq)]
pub enum EditorError {
    /// A tool's prepare hook failed, rejected or reported `false`.
    #[error("tool {tool} failed to prepare: {reason}")]
    ToolPreparationFailed {
        /// The tool name.
        tool: String,
        /// Why preparation failed.
        reason: String,
    },

    /// No available tool is registered under this name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The block is not a member of the document.
    #[error("block not found: {0}")]
    BlockNotFound(BlockId),

    /// An index outside `[0, len)`.
    #[error("index {index} is out of bounds (document has {len} blocks)")]
    OutOfBounds {
        /// The index that was requested.
        index: isize,
        /// The number of blocks at the time of the call.
        len: usize,
    },

    /// The tool behind the target block declares no merge hook.
    #[error("blocks of tool {0} cannot be merged")]
    NotMergeable(String),

    /// A merge named the same block as target and source.
    #[error("block {0} cannot be merged into itself")]
    MergeIntoSelf(BlockId),

    /// The source tool cannot export or the target tool cannot import.
    #[error("cannot convert {from} to {to}: {reason}")]
    ConversionNotSupported {
        /// Source tool name.
        from: String,
        /// Target tool name.
        to: String,
        /// Which side of the conversion is missing.
        reason: String,
    },

    /// Read-only mode was refused; lists the tools without support.
    #[error("read-only mode is not supported by tools: {}", .0.join(", "))]
    ReadOnlyUnsupportedByTool(Vec<String>),

    /// One block failed to save. Non-fatal for the document save.
    #[error("block {block} ({tool}) failed to save: {reason}")]
    SaveFailed {
        /// The failing block.
        block: BlockId,
        /// Its tool name.
        tool: String,
        /// The tool's error.
        reason: String,
    },

    /// A tool hook other than save failed.
    #[error("tool {tool} hook {hook} failed: {reason}")]
    ToolHookFailed {
        /// The tool name.
        tool: String,
        /// Hook name, e.g. `merge`.
        hook: String,
        /// The tool's error.
        reason: String,
    },

    /// Invalid editor configuration.
    #[error("invalid config: {0}")]
    Config(String),

    /// Malformed JSON payload.
    #[error("json error: {0}")]
    Json(String),
}

impl EditorError {
    /// Create an OutOfBounds error.
    pub fn out_of_bounds(index: isize, len: usize) -> Self {
        Self::OutOfBounds { index, len }
    }

    /// Create a ConversionNotSupported error.
    pub fn conversion(
        from: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ConversionNotSupported {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a tool hook failure.
    pub fn hook(tool: impl Into<String>, hook: &str, err: impl std::fmt::Display) -> Self {
        Self::ToolHookFailed {
            tool: tool.into(),
            hook: hook.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EditorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Result type for editor operations.
pub type Result<T> = std::result::Result<T, EditorError>;
