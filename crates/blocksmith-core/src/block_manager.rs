//! Structural commands over the block sequence.
//!
//! [`BlockManager`] is the only writer of block order and of the current
//! index. Every structural command announces itself on the bus as a
//! `block.*` mutation event; the observer batches those for outside
//! consumers.
//!
//! The current index is `None` when no block is current. During
//! [`BlockManager::insert_many`] it is adjusted once, after the whole batch.

use std::sync::Arc;

use blocksmith_types::{BlockData, BlockId, BlockTuneData, NodeId, block_data};
use serde_json::json;

use crate::block::{Block, BlockHook, BlockParams};
use crate::blocks::BlockCollection;
use crate::error::{EditorError, Result};
use crate::events::{ChangeCause, EditorEvent, MutationEvent, SharedEventBus};
use crate::html;
use crate::paste::{DataTransfer, INTERNAL_MIME, InternalBlock};
use crate::sanitize::SharedSanitizer;
use crate::surface::{CaretPosition, SharedCaret, SharedSurface};
use crate::tools::{PasteEvent, ToolDescriptor, ToolRegistry};

/// Arguments for [`BlockManager::insert`].
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    pub id: Option<BlockId>,
    /// Defaults to the default block tool.
    pub tool: Option<String>,
    pub data: Option<BlockData>,
    pub tunes: Option<BlockTuneData>,
    /// Defaults to after the current block, or the end.
    pub index: Option<usize>,
    /// Swap out the block at `index` instead of shifting it down.
    pub replace: bool,
    /// Make the new block current.
    pub need_to_focus: bool,
}

impl InsertOptions {
    pub fn tool(name: impl Into<String>) -> Self {
        Self {
            tool: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: BlockId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_data(mut self, data: BlockData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_tunes(mut self, tunes: BlockTuneData) -> Self {
        self.tunes = Some(tunes);
        self
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn replacing(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn focused(mut self) -> Self {
        self.need_to_focus = true;
        self
    }
}

/// Owner of the block sequence and the current index.
pub struct BlockManager {
    blocks: BlockCollection,
    current: Option<usize>,
    read_only: bool,
    registry: Arc<ToolRegistry>,
    bus: SharedEventBus,
    surface: SharedSurface,
    caret: SharedCaret,
    sanitizer: SharedSanitizer,
}

impl std::fmt::Debug for BlockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockManager")
            .field("blocks", &self.blocks.len())
            .field("current", &self.current)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl BlockManager {
    pub fn new(
        registry: Arc<ToolRegistry>,
        bus: SharedEventBus,
        surface: SharedSurface,
        caret: SharedCaret,
        sanitizer: SharedSanitizer,
    ) -> Self {
        Self {
            blocks: BlockCollection::new(),
            current: None,
            read_only: false,
            registry,
            bus,
            surface,
            caret,
            sanitizer,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    pub fn caret(&self) -> &SharedCaret {
        &self.caret
    }

    pub fn sanitizer(&self) -> &SharedSanitizer {
        &self.sanitizer
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn emit(&self, event: MutationEvent) {
        self.bus.emit(EditorEvent::Mutation(event));
    }

    // ========================================================================
    // Composition and insertion
    // ========================================================================

    /// Build a block for an available block tool without inserting it.
    pub fn compose_block(
        &self,
        tool: &str,
        data: Option<BlockData>,
        tunes: Option<BlockTuneData>,
        id: Option<BlockId>,
    ) -> Result<Block> {
        let descriptor = self
            .registry
            .block_tool(tool)
            .ok_or_else(|| EditorError::ToolNotFound(tool.to_string()))?;
        let mut block = Block::new(
            BlockParams {
                id,
                data: data.unwrap_or_default(),
                tunes: tunes.unwrap_or_default(),
                read_only: self.read_only,
            },
            descriptor,
            &self.registry,
            self.surface.clone(),
            self.bus.clone(),
        )?;
        block.set_bindings(!self.read_only);
        Ok(block)
    }

    /// Create a block and splice it into the sequence.
    pub fn insert(&mut self, options: InsertOptions) -> Result<BlockId> {
        let len = self.blocks.len();
        let index = match options.index {
            Some(i) if i > len => return Err(EditorError::out_of_bounds(i as isize, len)),
            Some(i) => i,
            None => match self.current {
                Some(c) if options.replace => c,
                Some(c) => c + 1,
                None => len,
            },
        };
        let tool = options
            .tool
            .unwrap_or_else(|| self.registry.default_tool_name().to_string());
        let block = self.compose_block(&tool, options.data, options.tunes, options.id)?;
        let id = block.id().clone();

        let replacing = options.replace && index < len;
        if replacing {
            self.replace_at(index, block);
        } else {
            let block_ref = block.block_ref();
            self.blocks.insert(index, block);
            self.emit(MutationEvent::added(block_ref, index));
            self.call_at(index, BlockHook::Rendered);
        }

        if options.need_to_focus {
            self.current = Some(index);
        } else if let Some(c) = self.current {
            if !replacing && index <= c {
                self.current = Some(c + 1);
            }
        }
        tracing::debug!(block = %id, tool = %tool, index, replace = replacing, "block inserted");
        Ok(id)
    }

    /// Insert composed blocks in one splice. The current index moves once.
    pub fn insert_many(&mut self, blocks: Vec<Block>, index: usize) {
        let index = index.min(self.blocks.len());
        let count = blocks.len();
        let refs: Vec<_> = blocks.iter().map(Block::block_ref).collect();
        self.blocks.insert_many(index, blocks);
        for (offset, block_ref) in refs.into_iter().enumerate() {
            self.emit(MutationEvent::added(block_ref, index + offset));
        }
        for i in index..index + count {
            self.call_at(i, BlockHook::Rendered);
        }
        if let Some(c) = self.current {
            if index <= c {
                self.current = Some(c + count);
            }
        }
    }

    /// Insert a default block at `index`.
    pub fn insert_default_block_at_index(
        &mut self,
        index: usize,
        need_to_focus: bool,
    ) -> Result<BlockId> {
        let mut options = InsertOptions::default().at(index);
        options.need_to_focus = need_to_focus;
        self.insert(options)
    }

    /// Append a default block and make it current.
    pub fn insert_at_end(&mut self) -> Result<BlockId> {
        let len = self.blocks.len();
        self.insert(InsertOptions::default().at(len).focused())
    }

    /// Replace a block with a new block of another tool.
    pub fn replace(&mut self, id: &BlockId, tool: &str, data: BlockData) -> Result<BlockId> {
        let index = self.index_or_err(id)?;
        self.insert(
            InsertOptions::tool(tool)
                .with_data(data)
                .at(index)
                .replacing(true),
        )
    }

    /// Insert a block for a paste event and hand the event to the tool.
    pub fn paste(&mut self, tool: &str, event: &PasteEvent, replace: bool) -> Result<BlockId> {
        let id = self.insert(InsertOptions::tool(tool).replacing(replace).focused())?;
        if let Some(index) = self.blocks.index_of(&id) {
            if let Some(block) = self.blocks.get_mut(index) {
                if let Err(e) = block.on_paste(event) {
                    tracing::warn!(block = %id, tool = %tool, error = %e, "paste handler failed");
                }
            }
        }
        Ok(id)
    }

    fn replace_at(&mut self, index: usize, block: Block) {
        let new_ref = block.block_ref();
        if let Some(mut old) = self.blocks.replace(index, block) {
            old.call(BlockHook::Removed);
            self.emit(MutationEvent::removed(old.block_ref(), index));
            if let Err(e) = old.destroy() {
                tracing::warn!(block = %old.id(), error = %e, "block teardown failed");
            }
        }
        self.emit(MutationEvent::added(new_ref, index));
        self.call_at(index, BlockHook::Rendered);
    }

    fn call_at(&mut self, index: usize, hook: BlockHook) {
        if let Some(block) = self.blocks.get_mut(index) {
            block.call(hook);
        }
    }

    // ========================================================================
    // Content commands
    // ========================================================================

    /// Rebuild a block with new data and/or tunes, keeping id and position.
    ///
    /// `data` is shallow-merged over the saved data. Raises `changed` only.
    pub async fn update(
        &mut self,
        id: &BlockId,
        data: Option<BlockData>,
        tunes: Option<BlockTuneData>,
    ) -> Result<BlockId> {
        if data.is_none() && tunes.is_none() {
            return Ok(id.clone());
        }
        let index = self.index_or_err(id)?;
        let (tool, saved) = {
            let block = self.block_at(index)?;
            (block.name().to_string(), block.save().await?)
        };

        let mut merged = saved.data;
        if let Some(data) = data {
            merged.extend(data);
        }
        let tunes = tunes.unwrap_or(saved.tunes);
        let block = self.compose_block(&tool, Some(merged), Some(tunes), Some(id.clone()))?;
        let block_ref = block.block_ref();

        if let Some(mut old) = self.blocks.replace(index, block) {
            if let Err(e) = old.destroy() {
                tracing::warn!(block = %id, error = %e, "block teardown failed");
            }
        }
        self.call_at(index, BlockHook::Rendered);
        self.emit(MutationEvent::changed(
            block_ref,
            Some(index),
            ChangeCause::Content,
        ));
        Ok(id.clone())
    }

    /// Convert a block to another tool through the export/import bridge.
    ///
    /// The new block keeps the id and position of the old one.
    pub async fn convert(
        &mut self,
        id: &BlockId,
        target_tool: &str,
        overrides: Option<BlockData>,
    ) -> Result<BlockId> {
        let index = self.index_or_err(id)?;
        let target = self
            .registry
            .block_tool(target_tool)
            .ok_or_else(|| EditorError::ToolNotFound(target_tool.to_string()))?;

        let mut data = {
            let block = self.block_at(index)?;
            let saved = block.save().await?;
            self.convert_data(block.tool(), &target, &saved.data)?
        };
        if let Some(overrides) = overrides {
            data.extend(overrides);
        }

        let block = self.compose_block(&target.name, Some(data), None, Some(id.clone()))?;
        self.replace_at(index, block);
        tracing::debug!(block = %id, to = %target.name, "block converted");
        Ok(id.clone())
    }

    fn convert_data(
        &self,
        from: &ToolDescriptor,
        to: &ToolDescriptor,
        data: &BlockData,
    ) -> Result<BlockData> {
        if !from.conversion.can_export() {
            return Err(EditorError::conversion(
                &from.name,
                &to.name,
                "source tool has no export rule",
            ));
        }
        if !to.conversion.can_import() {
            return Err(EditorError::conversion(
                &from.name,
                &to.name,
                "target tool has no import rule",
            ));
        }
        let bridge = from.conversion.export(data).ok_or_else(|| {
            EditorError::conversion(&from.name, &to.name, "export produced nothing")
        })?;
        let bridge = bridge.sanitize(
            self.sanitizer.as_ref(),
            &self.registry.sanitize_config_for(&to.name),
        );
        to.conversion
            .import(&bridge, &to.settings.config)
            .ok_or_else(|| EditorError::conversion(&from.name, &to.name, "import produced nothing"))
    }

    /// Merge `source` into `target` and remove `source`.
    ///
    /// Blocks of different tools are bridged through conversion first.
    pub async fn merge_blocks(&mut self, target: &BlockId, source: &BlockId) -> Result<()> {
        if target == source {
            return Err(EditorError::MergeIntoSelf(target.clone()));
        }
        let target_index = self.index_or_err(target)?;
        let source_index = self.index_or_err(source)?;

        let data = {
            let target_block = self.block_at(target_index)?;
            if !target_block.tool().capabilities.merge {
                return Err(EditorError::NotMergeable(target_block.name().to_string()));
            }
            let source_block = self.block_at(source_index)?;
            let saved = source_block.save().await?;
            if source_block.name() == target_block.name() {
                saved.data
            } else {
                self.convert_data(source_block.tool(), target_block.tool(), &saved.data)?
            }
        };

        if !data.is_empty() {
            if let Some(block) = self.blocks.get_mut(target_index) {
                block.merge_with(data).await?;
            }
        }
        self.remove_block(source, true)?;

        if let Some(index) = self.blocks.index_of(target) {
            let block_ref = self.block_at(index)?.block_ref();
            self.emit(MutationEvent::changed(
                block_ref,
                Some(index),
                ChangeCause::Content,
            ));
        }
        Ok(())
    }

    /// Move the content after the caret into a new default block below.
    pub fn split(&mut self) -> Result<BlockId> {
        let fragment = self.caret.extract_fragment_after_caret();
        let text = if html::parse_fragment(&fragment)
            .iter()
            .all(html::HtmlNode::is_empty)
        {
            String::new()
        } else {
            fragment
        };
        self.insert(
            InsertOptions::default()
                .with_data(block_data(json!({ "text": text })))
                .focused(),
        )
    }

    // ========================================================================
    // Structural commands
    // ========================================================================

    /// Move the block at `from` to `to`.
    pub fn move_block(&mut self, to: usize, from: usize) -> Result<()> {
        let len = self.blocks.len();
        if from >= len {
            return Err(EditorError::out_of_bounds(from as isize, len));
        }
        if to >= len {
            return Err(EditorError::out_of_bounds(to as isize, len));
        }
        if !self.blocks.move_block(to, from) {
            return Err(EditorError::out_of_bounds(to as isize, len));
        }

        self.current = self.current.map(|c| {
            if c == from {
                to
            } else if from < c && c <= to {
                c - 1
            } else if to <= c && c < from {
                c + 1
            } else {
                c
            }
        });

        let block_ref = self.block_at(to)?.block_ref();
        self.call_at(to, BlockHook::Moved { from, to });
        self.emit(MutationEvent::moved(block_ref, from, to));
        Ok(())
    }

    /// Remove a block. An emptied document gets a fresh default block when
    /// `add_last_block` is set.
    pub fn remove_block(&mut self, id: &BlockId, add_last_block: bool) -> Result<()> {
        let index = self.index_or_err(id)?;
        self.remove_at(index, add_last_block)
    }

    /// Remove the block at `index`.
    pub fn remove_at(&mut self, index: usize, add_last_block: bool) -> Result<()> {
        let len = self.blocks.len();
        let Some(mut block) = self.blocks.remove(index) else {
            return Err(EditorError::out_of_bounds(index as isize, len));
        };
        block.call(BlockHook::Removed);
        self.emit(MutationEvent::removed(block.block_ref(), index));
        if let Err(e) = block.destroy() {
            tracing::warn!(block = %block.id(), error = %e, "block teardown failed");
        }

        self.current = match self.current {
            Some(c) if c >= index => c.checked_sub(1),
            other => other,
        };

        if self.blocks.is_empty() {
            self.current = None;
            if add_last_block {
                self.insert(InsertOptions::default().focused())?;
            }
        } else {
            if index == 0 {
                self.current = Some(0);
            }
            let last = self.blocks.len() - 1;
            self.current = self.current.map(|c| c.min(last));
        }
        Ok(())
    }

    /// Remove every selected block. Returns the lowest removed index.
    pub fn remove_selected_blocks(&mut self) -> Result<Option<usize>> {
        let mut first = None;
        for index in (0..self.blocks.len()).rev() {
            if !self.blocks.get(index).is_some_and(Block::selected) {
                continue;
            }
            self.remove_at(index, true)?;
            first = Some(index);
        }
        Ok(first)
    }

    /// Remove everything and leave exactly one default block.
    pub fn clear(&mut self) -> Result<()> {
        self.remove_all_blocks();
        self.insert(InsertOptions::default().focused())?;
        Ok(())
    }

    /// Remove everything, leaving the document empty until the caller
    /// inserts again.
    pub(crate) fn remove_all_blocks(&mut self) {
        let blocks = self.blocks.drain();
        self.current = None;
        for (index, mut block) in blocks.into_iter().enumerate().rev() {
            block.call(BlockHook::Removed);
            self.emit(MutationEvent::removed(block.block_ref(), index));
            if let Err(e) = block.destroy() {
                tracing::warn!(block = %block.id(), error = %e, "block teardown failed");
            }
        }
    }

    // ========================================================================
    // Change notifications
    // ========================================================================

    /// A change attributed to a block by the observer.
    pub fn block_did_mutate(&mut self, id: &BlockId, cause: ChangeCause) -> bool {
        let Some(index) = self.blocks.index_of(id) else {
            return false;
        };
        match self.blocks.get_mut(index) {
            Some(block) => {
                block.did_mutate(cause, Some(index));
                true
            }
            None => false,
        }
    }

    /// Forward a tune toggle and announce the change.
    pub fn activate_tune(&mut self, id: &BlockId, tune: &str, key: &str) -> Result<()> {
        let index = self.index_or_err(id)?;
        let block = self
            .blocks
            .get_mut(index)
            .ok_or_else(|| EditorError::BlockNotFound(id.clone()))?;
        block.activate_tune(tune, key)?;
        block.did_mutate(ChangeCause::Manual, Some(index));
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// `-1` is the last block; other out-of-range indexes are `None`.
    pub fn get_block_by_index(&self, index: isize) -> Option<&Block> {
        if index == -1 {
            return self.blocks.last();
        }
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn get_block_index(&self, id: &BlockId) -> Option<usize> {
        self.blocks.index_of(id)
    }

    pub fn get_block_by_id(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.index_of(id).and_then(|i| self.blocks.get(i))
    }

    pub(crate) fn get_block_mut(&mut self, id: &BlockId) -> Option<&mut Block> {
        let index = self.blocks.index_of(id)?;
        self.blocks.get_mut(index)
    }

    fn index_or_err(&self, id: &BlockId) -> Result<usize> {
        self.blocks
            .index_of(id)
            .ok_or_else(|| EditorError::BlockNotFound(id.clone()))
    }

    fn block_at(&self, index: usize) -> Result<&Block> {
        self.blocks
            .get(index)
            .ok_or_else(|| EditorError::out_of_bounds(index as isize, self.blocks.len()))
    }

    /// The block owning `node`, found by walking up to a holder.
    pub fn get_block_by_child_node(&self, node: NodeId) -> Option<&Block> {
        let mut cursor = Some(node);
        while let Some(n) = cursor {
            if let Some(id) = self.blocks.by_holder(n) {
                return self.get_block_by_id(id);
            }
            cursor = self.surface.parent(n);
        }
        None
    }

    /// Make the block owning `node` current and point its input at `node`.
    pub fn set_current_block_by_child_node(&mut self, node: NodeId) -> Option<BlockId> {
        let block = self.get_block_by_child_node(node)?;
        block.update_current_input(node);
        let id = block.id().clone();
        self.current = self.blocks.index_of(&id);
        Some(id)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn set_current_index(&mut self, index: usize) -> Result<()> {
        if index >= self.blocks.len() {
            return Err(EditorError::out_of_bounds(index as isize, self.blocks.len()));
        }
        self.current = Some(index);
        Ok(())
    }

    pub fn unset_current_block(&mut self) {
        self.current = None;
    }

    pub fn current_block(&self) -> Option<&Block> {
        self.current.and_then(|i| self.blocks.get(i))
    }

    pub fn next_block(&self) -> Option<&Block> {
        self.current.and_then(|i| self.blocks.get(i + 1))
    }

    pub fn previous_block(&self) -> Option<&Block> {
        self.current
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.blocks.get(i))
    }

    /// Next block after the current one that has inputs.
    pub fn next_contentful_block(&self) -> Option<&Block> {
        let start = self.current? + 1;
        self.blocks
            .iter()
            .skip(start)
            .find(|b| !b.inputs().is_empty())
    }

    /// Previous block before the current one that has inputs.
    pub fn previous_contentful_block(&self) -> Option<&Block> {
        let current = self.current?;
        self.blocks
            .iter()
            .take(current)
            .rev()
            .find(|b| !b.inputs().is_empty())
    }

    pub fn first_block(&self) -> Option<&Block> {
        self.blocks.get(0)
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Every block is empty.
    pub fn is_editor_empty(&self) -> bool {
        self.blocks.iter().all(Block::is_empty)
    }

    /// Put the caret into the block at `index` and make it current.
    pub fn focus_block(&mut self, index: isize, position: CaretPosition) -> Result<()> {
        let len = self.blocks.len();
        let block = self
            .get_block_by_index(index)
            .ok_or_else(|| EditorError::out_of_bounds(index, len))?;
        let input = match position {
            CaretPosition::End => block.last_input(),
            CaretPosition::Start | CaretPosition::Default => block.first_input(),
        };
        let id = block.id().clone();
        if let Some(input) = input {
            block.update_current_input(input);
            self.caret.set_to_input(input, position);
        }
        self.current = self.blocks.index_of(&id);
        Ok(())
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Select every non-empty block.
    pub fn select_all(&mut self) {
        for block in self.blocks.iter_mut() {
            block.set_selected(true);
        }
    }

    pub fn clear_selection(&mut self) {
        for block in self.blocks.iter_mut() {
            block.set_selected(false);
        }
    }

    pub fn set_selected(&mut self, id: &BlockId, selected: bool) -> Result<()> {
        let block = self
            .get_block_mut(id)
            .ok_or_else(|| EditorError::BlockNotFound(id.clone()))?;
        block.set_selected(selected);
        Ok(())
    }

    pub fn selected_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| b.selected())
    }

    /// Clipboard payload for the selected blocks, or `None` if nothing is
    /// selected: the internal export plus HTML and plain renditions.
    pub async fn copy_selected(&self) -> Result<Option<DataTransfer>> {
        let selected: Vec<&Block> = self.selected_blocks().collect();
        if selected.is_empty() {
            return Ok(None);
        }

        let config = self.registry.all_inline_sanitize_config();
        let mut html_parts = Vec::new();
        let mut text_parts = Vec::new();
        for block in &selected {
            let cleaned = self
                .sanitizer
                .clean(&self.holder_markup(block.holder()), &config);
            text_parts.push(crate::surface::strip_markup(&cleaned));
            html_parts.push(format!("<p>{cleaned}</p>"));
        }

        let mut exported = Vec::with_capacity(selected.len());
        for saved in futures::future::join_all(selected.iter().map(|b| b.save())).await {
            let saved = saved?;
            exported.push(InternalBlock {
                tool: saved.tool,
                data: saved.data,
            });
        }

        Ok(Some(
            DataTransfer::new()
                .with_html(html_parts.concat())
                .with_text(text_parts.join("\n\n"))
                .with_data(INTERNAL_MIME, serde_json::to_string(&exported)?),
        ))
    }

    fn holder_markup(&self, holder: NodeId) -> String {
        std::iter::once(holder)
            .chain(self.surface.focusable_inputs(holder))
            .map(|node| self.surface.inner_html(node))
            .collect()
    }

    // ========================================================================
    // Mode and teardown
    // ========================================================================

    /// Detach or re-attach interaction bindings on every block.
    pub fn toggle_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
        for block in self.blocks.iter_mut() {
            block.set_bindings(!read_only);
        }
    }

    /// Tear down every block. Failures are collected and do not stop the rest.
    pub fn destroy(&mut self) -> Vec<EditorError> {
        let mut failures = Vec::new();
        for mut block in self.blocks.drain() {
            if let Err(e) = block.destroy() {
                tracing::warn!(block = %block.id(), error = %e, "block teardown failed");
                failures.push(e);
            }
        }
        self.current = None;
        failures
    }
}
