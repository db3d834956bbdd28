//! The editor facade.
//!
//! [`Editor`] owns one instance of every component and hands each the
//! collaborators it needs. It is the command surface for the excluded UI
//! layer: block commands, caret focus, save, read-only, paste and raw change
//! intake.

use std::sync::Arc;

use blocksmith_types::{BlockData, BlockId, BlockTuneData, OutputData};

use crate::block_manager::{BlockManager, InsertOptions};
use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::events::{EditorEvent, SharedEventBus, shared_event_bus};
use crate::observer::ModificationsObserver;
use crate::paste::{DataTransfer, IngestionPipeline};
use crate::read_only::ReadOnly;
use crate::renderer;
use crate::sanitize::SharedSanitizer;
use crate::saver::{self, SaveOutput};
use crate::surface::{CaretPosition, RawChange, SharedCaret, SharedSurface};
use crate::tools::{MenuEntry, ToolPlugin, ToolRegistry, TuneAction};

pub struct Editor {
    config: EditorConfig,
    registry: Arc<ToolRegistry>,
    bus: SharedEventBus,
    manager: BlockManager,
    observer: ModificationsObserver,
    paste: IngestionPipeline,
    read_only: ReadOnly,
    destroyed: bool,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("registry", &self.registry)
            .field("manager", &self.manager)
            .field("read_only", &self.read_only.is_enabled())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl Editor {
    /// Prepare tools, render the configured document (or one default
    /// block) and apply the configured mode.
    pub async fn new(
        config: EditorConfig,
        plugins: Vec<(String, ToolPlugin)>,
        surface: SharedSurface,
        caret: SharedCaret,
        sanitizer: SharedSanitizer,
    ) -> Result<Self> {
        config.validate()?;
        let bus = shared_event_bus();
        let registry = Arc::new(ToolRegistry::prepare(plugins, &config, Some(&bus)).await?);
        let mut manager =
            BlockManager::new(registry.clone(), bus.clone(), surface, caret, sanitizer);
        let observer = ModificationsObserver::new(&bus, config.batch_time());
        let mut paste = IngestionPipeline::new(&registry);
        let mut read_only = ReadOnly::new(&registry);
        read_only.initialize(config.read_only, &mut manager, &mut paste)?;

        let initial = config.data.clone().unwrap_or_default();
        renderer::render(&mut manager, &observer, &initial)?;

        tracing::info!(
            tools = registry.tool_names().count(),
            unavailable = registry.unavailable().count(),
            blocks = manager.len(),
            read_only = config.read_only,
            "editor ready"
        );
        Ok(Self {
            config,
            registry,
            bus,
            manager,
            observer,
            paste,
            read_only,
            destroyed: false,
        })
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The bus for `block.*` and `editor.*` subscriptions.
    pub fn events(&self) -> &SharedEventBus {
        &self.bus
    }

    pub fn blocks(&self) -> &BlockManager {
        &self.manager
    }

    /// Direct access for selection and navigation commands.
    pub fn blocks_mut(&mut self) -> &mut BlockManager {
        &mut self.manager
    }

    pub fn observer(&self) -> &ModificationsObserver {
        &self.observer
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.is_enabled()
    }

    // ========================================================================
    // Block commands
    // ========================================================================

    pub fn insert(&mut self, options: InsertOptions) -> Result<BlockId> {
        self.manager.insert(options)
    }

    /// Remove the block at `index` (default: the current block). The
    /// document never ends up empty.
    pub fn delete(&mut self, index: Option<usize>) -> Result<()> {
        let index = self.index_or_current(index)?;
        self.manager.remove_at(index, true)?;
        self.focus_current();
        Ok(())
    }

    /// Move the block at `from` (default: the current block) to `to`.
    pub fn move_block(&mut self, to: usize, from: Option<usize>) -> Result<()> {
        let from = self.index_or_current(from)?;
        self.manager.move_block(to, from)
    }

    pub async fn update(
        &mut self,
        id: &BlockId,
        data: Option<BlockData>,
        tunes: Option<BlockTuneData>,
    ) -> Result<BlockId> {
        self.manager.update(id, data, tunes).await
    }

    pub async fn convert(
        &mut self,
        id: &BlockId,
        target_tool: &str,
        overrides: Option<BlockData>,
    ) -> Result<BlockId> {
        self.manager.convert(id, target_tool, overrides).await
    }

    pub async fn merge(&mut self, target: &BlockId, source: &BlockId) -> Result<()> {
        self.manager.merge_blocks(target, source).await
    }

    /// Split the current block at the caret.
    pub fn split(&mut self) -> Result<BlockId> {
        self.manager.split()
    }

    /// Replace the document with `data`. Pending changes are dropped and the
    /// replacement itself is not reported.
    pub fn render(&mut self, data: &OutputData) -> Result<usize> {
        let was_enabled = self.observer.is_enabled();
        self.observer.disable();
        self.observer.clear();
        self.manager.remove_all_blocks();
        let result = renderer::render(&mut self.manager, &self.observer, data);
        if was_enabled {
            self.observer.enable();
        }
        result
    }

    /// Remove every block, leaving one empty default block.
    pub fn clear(&mut self) -> Result<()> {
        let was_enabled = self.observer.is_enabled();
        self.observer.disable();
        let result = self.manager.clear();
        if was_enabled {
            self.observer.enable();
        }
        result
    }

    // ========================================================================
    // Caret
    // ========================================================================

    /// Caret into the first block, or the end of the last one.
    pub fn focus(&mut self, at_end: bool) -> bool {
        let (index, position) = if at_end {
            (-1, CaretPosition::End)
        } else {
            (0, CaretPosition::Start)
        };
        self.manager.focus_block(index, position).is_ok()
    }

    pub fn focus_block(&mut self, index: isize, position: CaretPosition) -> Result<()> {
        self.manager.focus_block(index, position)
    }

    fn focus_current(&mut self) {
        if let Some(index) = self.manager.current_index() {
            if let Err(e) = self.manager.focus_block(index as isize, CaretPosition::End) {
                tracing::debug!(error = %e, "could not refocus after delete");
            }
        }
    }

    // ========================================================================
    // Save, mode, intake
    // ========================================================================

    pub async fn save(&self) -> SaveOutput {
        saver::save(&self.manager).await
    }

    /// Switch read-only mode; `None` flips it. Returns the new state.
    pub async fn toggle_read_only(&mut self, state: Option<bool>) -> Result<bool> {
        let previous = self.read_only.is_enabled();
        let state = state.unwrap_or(!previous);
        let state = self
            .read_only
            .toggle(state, &mut self.manager, &self.observer, &mut self.paste)
            .await?;
        if state != previous {
            self.bus.emit(EditorEvent::ReadOnlyToggled(state));
        }
        Ok(state)
    }

    /// Ingest a clipboard paste or a drop.
    pub fn handle_paste(
        &mut self,
        transfer: &DataTransfer,
        is_drag_and_drop: bool,
    ) -> Result<Vec<BlockId>> {
        self.paste
            .process_data_transfer(&mut self.manager, transfer, is_drag_and_drop)
    }

    /// Feed a raw presentation change to the observer.
    pub fn dom_changed(&mut self, change: RawChange) {
        self.observer.dom_changed(&mut self.manager, change);
    }

    /// Copy the selected blocks as a clipboard payload.
    pub async fn copy_selected(&self) -> Result<Option<DataTransfer>> {
        self.manager.copy_selected().await
    }

    // ========================================================================
    // Tunes
    // ========================================================================

    /// Settings menu of a block: `(tool entries, common entries)`.
    pub fn block_menu(&self, id: &BlockId) -> Result<(Vec<MenuEntry>, Vec<MenuEntry>)> {
        self.manager
            .get_block_by_id(id)
            .map(|b| b.get_tunes())
            .ok_or_else(|| EditorError::BlockNotFound(id.clone()))
    }

    /// Carry out a menu entry's action on a block.
    pub fn run_tune_action(&mut self, id: &BlockId, action: &TuneAction) -> Result<()> {
        let index = self
            .manager
            .get_block_index(id)
            .ok_or_else(|| EditorError::BlockNotFound(id.clone()))?;
        match action {
            TuneAction::MoveUp => {
                if index > 0 {
                    self.manager.move_block(index - 1, index)?;
                }
                Ok(())
            }
            TuneAction::MoveDown => {
                if index + 1 < self.manager.len() {
                    self.manager.move_block(index + 1, index)?;
                }
                Ok(())
            }
            TuneAction::Delete => {
                self.manager.remove_at(index, true)?;
                self.focus_current();
                Ok(())
            }
            TuneAction::Toggle { tune, key } => self.manager.activate_tune(id, tune, key),
            TuneAction::None => Ok(()),
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Tear everything down. Block teardown failures are returned.
    pub async fn destroy(&mut self) -> Vec<EditorError> {
        if self.destroyed {
            return Vec::new();
        }
        self.destroyed = true;
        self.observer.destroy();
        let failures = self.manager.destroy();
        self.registry.destroy().await;
        self.bus.emit(EditorEvent::Destroyed);
        self.bus.destroy();
        tracing::info!(failures = failures.len(), "editor destroyed");
        failures
    }

    fn index_or_current(&self, index: Option<usize>) -> Result<usize> {
        index
            .or(self.manager.current_index())
            .ok_or_else(|| EditorError::out_of_bounds(-1, self.manager.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::TagSanitizer;
    use crate::surface::{MemorySurface, RawRecord, Surface};
    use crate::testing::{EchoTool, NamedTune, record_events};
    use crate::tools::PatternRule;
    use blocksmith_types::{OutputBlockData, block_data};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use regex::Regex;
    use serde_json::json;
    use std::time::Duration;

    async fn editor_with(
        config: EditorConfig,
        plugins: Vec<(&str, ToolPlugin)>,
    ) -> (Editor, Arc<MemorySurface>) {
        let surface = Arc::new(MemorySurface::new());
        let plugins = plugins.into_iter().map(|(n, p)| (n.to_string(), p)).collect();
        let editor = Editor::new(
            config,
            plugins,
            surface.clone(),
            surface.clone(),
            Arc::new(TagSanitizer),
        )
        .await
        .unwrap();
        (editor, surface)
    }

    async fn editor() -> (Editor, Arc<MemorySurface>) {
        editor_with(
            EditorConfig::default(),
            vec![("echo", ToolPlugin::block(EchoTool::new()))],
        )
        .await
    }

    fn texts(output: &SaveOutput) -> Vec<String> {
        output
            .data
            .blocks
            .iter()
            .map(|b| b.data.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_new_renders_one_default_block() {
        let (editor, _) = editor().await;
        assert_eq!(editor.blocks().len(), 1);
        assert_eq!(editor.blocks().get_block_by_index(0).unwrap().name(), "paragraph");
    }

    #[tokio::test]
    async fn test_new_renders_configured_data() {
        let data = OutputData::new(vec![
            OutputBlockData::new("paragraph", block_data(json!({"text": "a"}))),
            OutputBlockData::new("echo", block_data(json!({"text": "b"}))),
        ]);
        let (editor, _) = editor_with(
            EditorConfig::default().with_data(data),
            vec![("echo", ToolPlugin::block(EchoTool::new()))],
        )
        .await;
        assert_eq!(texts(&editor.save().await), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_initial_read_only_refused() {
        let surface = Arc::new(MemorySurface::new());
        let err = Editor::new(
            EditorConfig::default().with_read_only(true),
            vec![("legacy".to_string(), ToolPlugin::block(EchoTool::new().without_read_only()))],
            surface.clone(),
            surface,
            Arc::new(TagSanitizer),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EditorError::ReadOnlyUnsupportedByTool(_)));
    }

    #[tokio::test]
    async fn test_clear_then_delete_keeps_a_block() {
        let (mut editor, _) = editor().await;
        editor.insert(InsertOptions::tool("echo")).unwrap();
        editor.clear().unwrap();
        assert_eq!(editor.blocks().len(), 1);

        let only = editor.blocks().get_block_by_index(0).unwrap().id().clone();
        editor.delete(Some(0)).unwrap();
        assert_eq!(editor.blocks().len(), 1);
        let replacement = editor.blocks().get_block_by_index(0).unwrap();
        assert_ne!(replacement.id(), &only);
        assert_eq!(replacement.name(), "paragraph");
        assert!(editor.blocks().is_editor_empty());
    }

    #[tokio::test]
    async fn test_delete_without_current_block() {
        let (mut editor, _) = editor().await;
        editor.blocks_mut().unset_current_block();
        assert!(matches!(editor.delete(None), Err(EditorError::OutOfBounds { .. })));
    }

    #[tokio::test]
    async fn test_render_replaces_document() {
        let (mut editor, _) = editor().await;
        let data = OutputData::new(vec![OutputBlockData::new(
            "echo",
            block_data(json!({"text": "new"})),
        )]);
        assert_eq!(editor.render(&data).unwrap(), 1);
        assert_eq!(texts(&editor.save().await), vec!["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_is_not_reported_as_a_change() {
        let (mut editor, _) = editor().await;
        tokio::time::sleep(editor.config().batch_time() * 2).await;
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();
        editor.events().on("editor.changed", move |event| {
            if let EditorEvent::Changed(events) = event {
                sink.lock().push(events.len());
            }
        });

        let data = OutputData::new(vec![OutputBlockData::new(
            "echo",
            block_data(json!({"text": "new"})),
        )]);
        editor.render(&data).unwrap();
        tokio::time::sleep(editor.config().batch_time() * 4).await;

        assert!(batches.lock().is_empty());
        assert!(editor.observer().is_enabled());
        assert_eq!(editor.observer().pending(), 0);
    }

    #[tokio::test]
    async fn test_merge_into_itself_keeps_block() {
        let (mut editor, _) = editor_with(
            EditorConfig::default(),
            vec![("merging", ToolPlugin::block(EchoTool::new().mergeable()))],
        )
        .await;
        let id = editor
            .insert(InsertOptions::tool("merging").with_data(block_data(json!({"text": "keep"}))))
            .unwrap();

        assert_eq!(editor.merge(&id, &id).await, Err(EditorError::MergeIntoSelf(id.clone())));
        assert!(editor.blocks().get_block_by_id(&id).is_some());
    }

    #[tokio::test]
    async fn test_tune_actions() {
        let (mut editor, _) = editor_with(
            EditorConfig::default(),
            vec![
                ("echo", ToolPlugin::block(EchoTool::new())),
                ("pin", ToolPlugin::tune(NamedTune::new("pin"))),
            ],
        )
        .await;
        editor.clear().unwrap();
        let first = editor.blocks().get_block_by_index(0).unwrap().id().clone();
        let second = editor
            .insert(InsertOptions::tool("echo").with_data(block_data(json!({"text": "2"}))))
            .unwrap();

        editor.run_tune_action(&second, &TuneAction::MoveUp).unwrap();
        assert_eq!(editor.blocks().get_block_index(&second), Some(0));
        editor.run_tune_action(&second, &TuneAction::MoveUp).unwrap();
        assert_eq!(editor.blocks().get_block_index(&second), Some(0));
        editor.run_tune_action(&second, &TuneAction::MoveDown).unwrap();
        assert_eq!(editor.blocks().get_block_index(&first), Some(0));

        let (tool_entries, common) = editor.block_menu(&second).unwrap();
        assert!(tool_entries.is_empty());
        assert!(common.iter().any(|e| e.name == "pin"));
        assert!(common.iter().any(|e| e.action == TuneAction::Delete));

        let toggle = TuneAction::Toggle {
            tune: "pin".into(),
            key: "pin".into(),
        };
        editor.run_tune_action(&second, &toggle).unwrap();
        let saved = editor.blocks().get_block_by_id(&second).unwrap().tunes_data();
        assert_eq!(saved.get("pin"), Some(&json!(true)));

        editor.run_tune_action(&second, &TuneAction::Delete).unwrap();
        assert_eq!(editor.blocks().len(), 1);
        assert!(editor.blocks().get_block_by_id(&second).is_none());
    }

    #[tokio::test]
    async fn test_toggle_read_only_emits_once() {
        let (mut editor, _) = editor().await;
        let toggles = Arc::new(Mutex::new(Vec::new()));
        let sink = toggles.clone();
        editor.events().on("editor.read_only", move |event| {
            if let EditorEvent::ReadOnlyToggled(state) = event {
                sink.lock().push(*state);
            }
        });

        assert!(editor.toggle_read_only(None).await.unwrap());
        assert!(editor.toggle_read_only(Some(true)).await.unwrap());
        assert!(!editor.toggle_read_only(None).await.unwrap());
        assert_eq!(*toggles.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_paste_through_facade() {
        let (mut editor, _) = editor_with(
            EditorConfig::default(),
            vec![(
                "link",
                ToolPlugin::block(EchoTool::new().with_patterns(vec![PatternRule::new(
                    "url",
                    Regex::new(r"https?://\S+").unwrap(),
                )])),
            )],
        )
        .await;
        editor.focus(false);
        let ids = editor
            .handle_paste(&DataTransfer::new().with_text("https://example.com"), false)
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(editor.blocks().len(), 1);
        assert_eq!(editor.blocks().get_block_by_index(0).unwrap().name(), "link");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dom_changes_batched_into_one_event() {
        let (mut editor, surface) = editor().await;
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();
        editor.events().on("editor.changed", move |event| {
            if let EditorEvent::Changed(events) = event {
                sink.lock().push(events.len());
            }
        });

        let input = editor.blocks().get_block_by_index(0).unwrap().first_input().unwrap();
        surface.set_inner_html(input, "typed");
        editor.dom_changed(RawChange::Records(vec![RawRecord::touched(input)]));
        editor.dom_changed(RawChange::Records(vec![RawRecord::touched(input)]));
        tokio::time::sleep(editor.config().batch_time() + Duration::from_millis(1)).await;

        assert_eq!(*batches.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let (mut editor, _) = editor_with(
            EditorConfig::default(),
            vec![("fragile", ToolPlugin::block(EchoTool::new().failing_destroy()))],
        )
        .await;
        editor.insert(InsertOptions::tool("fragile")).unwrap();
        let destroyed = record_events(editor.events(), "block.>");
        let failures = editor.destroy().await;
        assert_eq!(failures.len(), 1);
        assert!(destroyed.lock().is_empty());
        assert_eq!(editor.events().handler_count(), 0);
        assert!(editor.destroy().await.is_empty());
    }
}
