//! Snapshot rendering.
//!
//! Blocks whose tool is unknown, unavailable or fails to render become stub
//! blocks that keep the original record, so the next save writes it back.

use blocksmith_types::{BlockData, OutputBlockData, OutputData};
use serde_json::json;

use crate::block::Block;
use crate::block_manager::BlockManager;
use crate::error::Result;
use crate::observer::ModificationsObserver;
use crate::tools::builtin::STUB_TOOL;

/// Append every block of `data` in one batch. An empty snapshot yields one
/// default block. Observer events are suppressed while rendering.
pub fn render(
    manager: &mut BlockManager,
    observer: &ModificationsObserver,
    data: &OutputData,
) -> Result<usize> {
    let was_enabled = observer.is_enabled();
    observer.disable();
    let result = render_blocks(manager, data);
    if was_enabled {
        observer.enable();
    }
    result
}

fn render_blocks(manager: &mut BlockManager, data: &OutputData) -> Result<usize> {
    if data.blocks.is_empty() {
        manager.insert_at_end()?;
        tracing::debug!("rendered empty snapshot as one default block");
        return Ok(1);
    }

    let mut blocks = Vec::with_capacity(data.blocks.len());
    let mut stubs = 0;
    for record in &data.blocks {
        match compose(manager, record) {
            Some(block) => {
                stubs += usize::from(block.is_stub() && record.tool != STUB_TOOL);
                blocks.push(block);
            }
            None => {
                tracing::error!(
                    tool = %record.tool,
                    "block dropped: could not render a stub for it"
                )
            }
        }
    }

    let count = blocks.len();
    let index = manager.len();
    manager.insert_many(blocks, index);
    tracing::debug!(blocks = count, stubs, "snapshot rendered");
    Ok(count)
}

fn compose(manager: &BlockManager, record: &OutputBlockData) -> Option<Block> {
    let registry = manager.registry();
    if registry.block_tool(&record.tool).is_some() {
        match manager.compose_block(
            &record.tool,
            Some(record.data.clone()),
            record.tunes.clone(),
            record.id.clone(),
        ) {
            Ok(block) => return Some(block),
            Err(e) => {
                tracing::warn!(tool = %record.tool, error = %e, "block render failed, using stub")
            }
        }
    } else if registry.is_unavailable(&record.tool) {
        tracing::debug!(tool = %record.tool, "tool unavailable, using stub");
    } else {
        tracing::warn!(tool = %record.tool, "unknown tool, using stub");
    }

    match manager.compose_block(STUB_TOOL, Some(stub_data(record)), None, record.id.clone()) {
        Ok(block) => Some(block),
        Err(e) => {
            tracing::error!(tool = %record.tool, error = %e, "stub render failed");
            None
        }
    }
}

/// Stub payload: the tool name as title plus the whole original record.
pub fn stub_data(record: &OutputBlockData) -> BlockData {
    let mut saved = json!({
        "id": record.id,
        "type": record.tool,
        "data": record.data,
    });
    if let (Some(tunes), Some(obj)) = (&record.tunes, saved.as_object_mut()) {
        obj.insert("tunes".into(), serde_json::Value::Object(tunes.clone()));
    }
    blocksmith_types::block_data(json!({
        "title": record.tool,
        "savedData": saved,
    }))
}
