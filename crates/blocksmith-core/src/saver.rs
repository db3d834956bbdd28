//! Document save.
//!
//! Every block saves concurrently. A block that fails to save or fails its
//! own validation is reported and left out of the snapshot; the rest still
//! save. Stub blocks give back the record they preserved.

use blocksmith_types::{BlockId, OutputBlockData, OutputData};
use futures::future::join_all;

use crate::block::{Block, SavedData};
use crate::block_manager::BlockManager;
use crate::error::EditorError;
use crate::sanitize::sanitize_data;

/// A block that did not make it into the snapshot.
#[derive(Debug, PartialEq)]
pub struct SaveFailure {
    pub block: BlockId,
    pub tool: String,
    /// Document position at save time.
    pub index: usize,
    pub error: EditorError,
}

/// Snapshot plus the blocks left out of it.
#[derive(Debug)]
pub struct SaveOutput {
    pub data: OutputData,
    pub failures: Vec<SaveFailure>,
}

impl SaveOutput {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Save the whole document in document order.
pub async fn save(manager: &BlockManager) -> SaveOutput {
    let blocks: Vec<&Block> = manager.blocks().collect();
    let results = join_all(blocks.iter().map(|b| b.save())).await;

    let mut saved_blocks = Vec::with_capacity(blocks.len());
    let mut failures = Vec::new();
    for (index, (block, result)) in blocks.iter().zip(results).enumerate() {
        let failure = |error: EditorError| SaveFailure {
            block: block.id().clone(),
            tool: block.name().to_string(),
            index,
            error,
        };

        let saved = match result {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(
                    block = %block.id(),
                    tool = %block.name(),
                    error = %e,
                    "block save failed"
                );
                failures.push(failure(e));
                continue;
            }
        };

        if block.is_stub() {
            match preserved_record(&saved) {
                Some(record) => saved_blocks.push(record),
                None => {
                    tracing::warn!(block = %block.id(), "stub block lost its preserved record");
                    failures.push(failure(save_failed(&saved, "stub has no preserved record")));
                }
            }
            continue;
        }

        if !block.validate(&saved.data).await {
            tracing::debug!(
                block = %block.id(),
                tool = %block.name(),
                "block data invalid, skipping"
            );
            failures.push(failure(save_failed(&saved, "data failed validation")));
            continue;
        }

        let config = manager.registry().sanitize_config_for(&saved.tool);
        let data = sanitize_data(&saved.data, manager.sanitizer().as_ref(), &config);
        saved_blocks.push(SavedData { data, ..saved }.into_output());
    }

    tracing::debug!(
        blocks = saved_blocks.len(),
        failures = failures.len(),
        "document saved"
    );
    SaveOutput {
        data: OutputData::new(saved_blocks),
        failures,
    }
}

fn save_failed(saved: &SavedData, reason: &str) -> EditorError {
    EditorError::SaveFailed {
        block: saved.id.clone(),
        tool: saved.tool.clone(),
        reason: reason.to_string(),
    }
}

/// The `savedData` record a stub block carries.
fn preserved_record(saved: &SavedData) -> Option<OutputBlockData> {
    let record = saved.data.get("savedData")?;
    match serde_json::from_value::<OutputBlockData>(record.clone()) {
        Ok(mut record) => {
            if record.id.is_none() {
                record.id = Some(saved.id.clone());
            }
            Some(record)
        }
        Err(e) => {
            tracing::debug!(block = %saved.id, error = %e, "malformed stub record");
            None
        }
    }
}
