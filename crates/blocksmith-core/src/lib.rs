//! Editing core for block-structured documents.
//!
//! A document is an ordered sequence of blocks, each owned by a tool plugin
//! that renders, saves, validates and merges its own data. The core keeps
//! that sequence consistent while tools mutate content through a
//! presentation surface, users issue structural commands, and clipboard
//! content is routed to the right tool.
//!
//! # Components
//!
//! - [`ToolRegistry`]: prepares plugins once and records what each can do
//! - [`Block`]: one rendered tool instance plus its tunes and input cache
//! - [`BlockManager`]: sole writer of block order and the current index
//! - [`ModificationsObserver`]: debounces `block.*` events into batches
//! - [`IngestionPipeline`]: classifies pasted content by tag, pattern or file
//! - [`saver`], [`renderer`], [`ReadOnly`]: snapshot out, snapshot in, mode
//! - [`Editor`]: wires everything together by dependency injection
//!
//! # Events
//!
//! Everything is published on one [`EventBus`] with NATS-style subjects:
//! `block.added`, `block.removed`, `block.changed`, `block.moved` as they
//! happen, `editor.changed` for observer batches, plus `editor.read_only`,
//! `editor.destroyed` and `tools.prepare_failed`.

pub mod block;
pub mod block_manager;
pub mod blocks;
pub mod config;
pub mod conversion;
pub mod editor;
pub mod error;
pub mod events;
pub mod html;
pub mod observer;
pub mod paste;
pub mod read_only;
pub mod renderer;
pub mod sanitize;
pub mod saver;
pub mod surface;
pub mod tools;

#[cfg(test)]
mod testing;

pub use block::{Block, BlockHook, BlockParams, SavedData};
pub use block_manager::{BlockManager, InsertOptions};
pub use blocks::BlockCollection;
pub use config::{EditorConfig, ToolFilter, ToolSettings};
pub use conversion::{ConversionConfig, ConversionValue};
pub use editor::Editor;
pub use error::{EditorError, Result};
pub use events::{
    BlockRef, ChangeCause, EditorEvent, EventBus, HandlerId, MutationDetail, MutationEvent,
    SharedEventBus, shared_event_bus,
};
pub use observer::ModificationsObserver;
pub use paste::{DataTransfer, IngestionPipeline, PasteFragment, PasteRules};
pub use read_only::ReadOnly;
pub use sanitize::{SanitizeConfig, Sanitizer, SharedSanitizer, TagRule, TagSanitizer};
pub use saver::{SaveFailure, SaveOutput};
pub use surface::{
    Caret, CaretPosition, Hint, MemorySurface, RawChange, RawRecord, SharedCaret, SharedSurface,
    Surface,
};
pub use tools::{
    BlockTool, BlockToolContext, BlockToolInstance, BlockTune, InlineTool, PasteConfig,
    PasteEvent, ToolDescriptor, ToolPlugin, ToolRegistry,
};

pub use blocksmith_types::{BlockData, BlockId, OutputBlockData, OutputData};
