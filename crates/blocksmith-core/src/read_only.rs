//! Read-only mode.
//!
//! Switching mode re-renders the document so every tool instance is rebuilt
//! with the new flag. Enabling is refused outright when any available block
//! tool cannot run read-only.

use crate::block_manager::BlockManager;
use crate::error::{EditorError, Result};
use crate::observer::ModificationsObserver;
use crate::paste::IngestionPipeline;
use crate::renderer;
use crate::saver;
use crate::tools::ToolRegistry;

#[derive(Debug, Default)]
pub struct ReadOnly {
    enabled: bool,
    unsupported: Vec<String>,
}

impl ReadOnly {
    pub fn new(registry: &ToolRegistry) -> Self {
        Self {
            enabled: false,
            unsupported: registry.tools_without_read_only_support(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Block tools that cannot run read-only.
    pub fn unsupported_tools(&self) -> &[String] {
        &self.unsupported
    }

    /// Whether `state` may be entered.
    pub fn check(&self, state: bool) -> Result<()> {
        if state && !self.unsupported.is_empty() {
            return Err(EditorError::ReadOnlyUnsupportedByTool(self.unsupported.clone()));
        }
        Ok(())
    }

    /// Apply the startup mode before anything is rendered.
    pub fn initialize(
        &mut self,
        state: bool,
        manager: &mut BlockManager,
        paste: &mut IngestionPipeline,
    ) -> Result<()> {
        self.check(state)?;
        self.enabled = state;
        manager.toggle_read_only(state);
        paste.toggle_read_only(state);
        Ok(())
    }

    /// Switch mode. Returns the new state; on refusal nothing changes.
    pub async fn toggle(
        &mut self,
        state: bool,
        manager: &mut BlockManager,
        observer: &ModificationsObserver,
        paste: &mut IngestionPipeline,
    ) -> Result<bool> {
        self.check(state)?;
        let previous = self.enabled;
        self.enabled = state;
        manager.toggle_read_only(state);
        paste.toggle_read_only(state);
        if previous == state {
            return Ok(state);
        }

        observer.disable();
        observer.clear();
        let saved = saver::save(manager).await;
        if !saved.is_complete() {
            tracing::warn!(
                failures = saved.failures.len(),
                "blocks that failed to save are dropped by the re-render"
            );
        }
        manager.remove_all_blocks();
        let rendered = renderer::render(manager, observer, &saved.data);
        observer.enable();
        rendered?;

        tracing::info!(read_only = state, "read-only mode toggled");
        Ok(state)
    }
}
