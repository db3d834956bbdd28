//! The Block entity.
//!
//! A block wraps one rendered tool instance plus the tunes attached to it.
//! The core never looks inside the tool's data; it only asks the instance to
//! save, validate or merge, and tracks presentation state around it (holder
//! node, focusable inputs, selection flags, interaction bindings).

use std::sync::Arc;
use std::time::{Duration, Instant};

use blocksmith_types::{BlockData, BlockId, BlockTuneData, NodeId, OutputBlockData};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{EditorError, Result};
use crate::events::{BlockRef, ChangeCause, EditorEvent, MutationEvent, SharedEventBus};
use crate::surface::{Hint, SharedSurface};
use crate::tools::{
    BlockToolContext, BlockToolInstance, MenuEntry, PasteEvent, ToolDescriptor, ToolRegistry,
    ToolboxEntry, TuneContext, TuneInstance,
};

/// Lifecycle notifications forwarded to the tool instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHook {
    Rendered,
    Updated,
    Moved { from: usize, to: usize },
    Removed,
}

/// Result of [`Block::save`].
#[derive(Debug, Clone, PartialEq)]
pub struct SavedData {
    pub id: BlockId,
    pub tool: String,
    pub data: BlockData,
    pub tunes: BlockTuneData,
    /// Time the tool took to save.
    pub time: Duration,
}

impl SavedData {
    pub fn into_output(self) -> OutputBlockData {
        OutputBlockData::new(self.tool, self.data)
            .with_id(self.id)
            .with_tunes(self.tunes)
    }
}

/// What a block is built from.
#[derive(Debug, Clone, Default)]
pub struct BlockParams {
    /// Generated when absent.
    pub id: Option<BlockId>,
    pub data: BlockData,
    pub tunes: BlockTuneData,
    pub read_only: bool,
}

#[derive(Debug, Default)]
struct InputCache {
    nodes: Option<Vec<NodeId>>,
    current: usize,
}

/// One document unit owned by one block tool.
pub struct Block {
    id: BlockId,
    tool: Arc<ToolDescriptor>,
    instance: Box<dyn BlockToolInstance>,
    holder: NodeId,
    read_only: bool,
    surface: SharedSurface,
    bus: SharedEventBus,

    /// User tunes enabled for the tool, in order.
    tunes: IndexMap<String, Box<dyn TuneInstance>>,
    /// Editor-provided tunes attached to every block.
    default_tunes: IndexMap<String, Box<dyn TuneInstance>>,
    /// Tune data whose tune is not enabled, kept for the round trip.
    unavailable_tunes: BlockTuneData,

    selected: bool,
    stretched: bool,
    drop_target: bool,
    bindings_attached: bool,
    destroyed: bool,

    inputs: Mutex<InputCache>,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("tool", &self.tool.name)
            .field("holder", &self.holder)
            .field("selected", &self.selected)
            .finish()
    }
}

impl Block {
    /// Render `tool` into a fresh holder and attach its tunes.
    pub fn new(
        params: BlockParams,
        tool: Arc<ToolDescriptor>,
        registry: &ToolRegistry,
        surface: SharedSurface,
        bus: SharedEventBus,
    ) -> Result<Self> {
        let Some(plugin) = tool.block_plugin() else {
            return Err(EditorError::ToolNotFound(tool.name.clone()));
        };
        let id = params.id.unwrap_or_default();
        let holder = surface.create_holder();

        let ctx = BlockToolContext {
            block_id: id.clone(),
            data: params.data,
            config: tool.settings.config.clone(),
            read_only: params.read_only,
            surface: surface.clone(),
            holder,
        };
        let instance = match plugin.render(ctx) {
            Ok(instance) => instance,
            Err(e) => {
                surface.remove(holder);
                return Err(EditorError::hook(&tool.name, "render", e));
            }
        };

        let mut tune_data = params.tunes;
        let attach = |name: &str, data: Option<Value>| -> Option<Box<dyn TuneInstance>> {
            let descriptor = registry.get(name)?;
            let tune = descriptor.tune_plugin()?;
            Some(tune.create(TuneContext {
                block_id: id.clone(),
                name: name.to_string(),
                data,
                config: descriptor.settings.config.clone(),
                read_only: params.read_only,
            }))
        };

        let mut tunes = IndexMap::new();
        for name in &tool.tunes {
            if let Some(instance) = attach(name, tune_data.remove(name)) {
                tunes.insert(name.clone(), instance);
            }
        }
        let mut default_tunes = IndexMap::new();
        for descriptor in registry.internal_tunes() {
            if let Some(instance) = attach(&descriptor.name, tune_data.remove(&descriptor.name)) {
                default_tunes.insert(descriptor.name.clone(), instance);
            }
        }
        if !tune_data.is_empty() {
            tracing::debug!(
                block = %id,
                tunes = ?tune_data.keys().collect::<Vec<_>>(),
                "keeping data of unavailable tunes"
            );
        }

        Ok(Self {
            id,
            tool,
            instance,
            holder,
            read_only: params.read_only,
            surface,
            bus,
            tunes,
            default_tunes,
            unavailable_tunes: tune_data,
            selected: false,
            stretched: false,
            drop_target: false,
            bindings_attached: false,
            destroyed: false,
            inputs: Mutex::new(InputCache::default()),
        })
    }

    pub fn id(&self) -> &BlockId {
        &self.id
    }

    /// Tool name.
    pub fn name(&self) -> &str {
        &self.tool.name
    }

    pub fn tool(&self) -> &Arc<ToolDescriptor> {
        &self.tool
    }

    pub fn holder(&self) -> NodeId {
        self.holder
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn block_ref(&self) -> BlockRef {
        BlockRef {
            id: self.id.clone(),
            tool: self.tool.name.clone(),
        }
    }

    pub fn is_stub(&self) -> bool {
        self.tool.is_stub()
    }

    // ========================================================================
    // Data
    // ========================================================================

    /// Extract the current data from the tool and the tunes.
    ///
    /// A failing tune is logged and left out; a failing tool fails the save.
    pub async fn save(&self) -> Result<SavedData> {
        let started = Instant::now();
        let data = self
            .instance
            .save()
            .await
            .map_err(|e| EditorError::SaveFailed {
                block: self.id.clone(),
                tool: self.tool.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(SavedData {
            id: self.id.clone(),
            tool: self.tool.name.clone(),
            data,
            tunes: self.tunes_data(),
            time: started.elapsed(),
        })
    }

    /// Saved data only.
    pub async fn data(&self) -> Result<BlockData> {
        Ok(self.save().await?.data)
    }

    /// Tune data: unavailable tunes first, then every attached tune.
    pub fn tunes_data(&self) -> BlockTuneData {
        let mut out = self.unavailable_tunes.clone();
        for (name, tune) in self.tunes.iter().chain(self.default_tunes.iter()) {
            match tune.save() {
                Ok(Some(value)) => {
                    out.insert(name.clone(), value);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(block = %self.id, tune = %name, error = %e, "tune save failed")
                }
            }
        }
        out
    }

    /// Always valid unless the tool declares a validator.
    pub async fn validate(&self, data: &BlockData) -> bool {
        if !self.tool.capabilities.validate {
            return true;
        }
        self.instance.validate(data).await
    }

    /// Merge another block's data into this one.
    pub async fn merge_with(&mut self, data: BlockData) -> Result<()> {
        if !self.tool.capabilities.merge {
            return Err(EditorError::NotMergeable(self.tool.name.clone()));
        }
        self.instance
            .merge(data)
            .await
            .map_err(|e| EditorError::hook(&self.tool.name, "merge", e))
    }

    /// Saved data through the tool's export rule.
    pub async fn export_data_as_text(&self) -> Result<String> {
        let data = self.data().await?;
        self.tool
            .conversion
            .export(&data)
            .map(|value| value.as_text())
            .ok_or_else(|| {
                EditorError::conversion(&self.tool.name, "text", "tool has no export rule")
            })
    }

    pub(crate) fn on_paste(&mut self, event: &PasteEvent) -> Result<()> {
        if !self.tool.capabilities.on_paste {
            return Ok(());
        }
        self.instance
            .on_paste(event)
            .map_err(|e| EditorError::hook(&self.tool.name, "on_paste", e))
    }

    /// Forward a lifecycle notification. Ignored once destroyed.
    pub fn call(&mut self, hook: BlockHook) {
        if self.destroyed {
            return;
        }
        match hook {
            BlockHook::Rendered => self.instance.rendered(),
            BlockHook::Updated => self.instance.updated(),
            BlockHook::Moved { from, to } => self.instance.moved(from, to),
            BlockHook::Removed => self.instance.removed(),
        }
    }

    // ========================================================================
    // Tunes
    // ========================================================================

    /// Menu entries: `(tool entries, common entries)`.
    ///
    /// An entry with `alias_of` replaces the entry it names when one exists
    /// in either list, and is appended otherwise.
    pub fn get_tunes(&self) -> (Vec<MenuEntry>, Vec<MenuEntry>) {
        let mut tool_entries = Vec::new();
        let mut common_entries = Vec::new();

        if self.tool.capabilities.settings {
            for entry in self.instance.render_settings() {
                push_entry(&mut tool_entries, &mut common_entries, entry, true);
            }
        }
        for tune in self.tunes.values().chain(self.default_tunes.values()) {
            for entry in tune.render() {
                push_entry(&mut tool_entries, &mut common_entries, entry, false);
            }
        }
        (tool_entries, common_entries)
    }

    /// Forward a toggle to one attached tune.
    pub(crate) fn activate_tune(&mut self, tune: &str, key: &str) -> Result<()> {
        let Some(instance) = self
            .tunes
            .get_mut(tune)
            .or_else(|| self.default_tunes.get_mut(tune))
        else {
            return Err(EditorError::ToolNotFound(tune.to_string()));
        };
        instance
            .activate(key)
            .map_err(|e| EditorError::hook(tune, "activate", e))
    }

    /// Names of attached tunes, user tunes first.
    pub fn tune_names(&self) -> Vec<&str> {
        self.tunes
            .keys()
            .chain(self.default_tunes.keys())
            .map(String::as_str)
            .collect()
    }

    /// The toolbox variant describing the current data.
    pub async fn get_active_toolbox_entry(&self) -> Option<ToolboxEntry> {
        let toolbox = &self.tool.toolbox;
        if toolbox.len() == 1 {
            return toolbox.first().cloned();
        }
        let data = self.data().await.ok()?;
        toolbox.iter().find(|entry| entry.matches(&data)).cloned()
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    fn with_inputs<R>(&self, f: impl FnOnce(&[NodeId], usize) -> R) -> R {
        let mut cache = self.inputs.lock();
        if cache.nodes.is_none() {
            cache.nodes = Some(self.surface.focusable_inputs(self.holder));
        }
        let current = cache.current;
        f(cache.nodes.as_deref().unwrap_or_default(), current)
    }

    /// Focusable inputs in document order.
    pub fn inputs(&self) -> Vec<NodeId> {
        self.with_inputs(|inputs, _| inputs.to_vec())
    }

    pub fn current_input(&self) -> Option<NodeId> {
        self.with_inputs(|inputs, current| inputs.get(current).copied())
    }

    pub fn first_input(&self) -> Option<NodeId> {
        self.with_inputs(|inputs, _| inputs.first().copied())
    }

    pub fn last_input(&self) -> Option<NodeId> {
        self.with_inputs(|inputs, _| inputs.last().copied())
    }

    pub fn next_input(&self) -> Option<NodeId> {
        self.with_inputs(|inputs, current| inputs.get(current + 1).copied())
    }

    pub fn previous_input(&self) -> Option<NodeId> {
        self.with_inputs(|inputs, current| {
            current.checked_sub(1).and_then(|i| inputs.get(i).copied())
        })
    }

    /// Point the current input at the input containing `node`.
    pub fn update_current_input(&self, node: NodeId) {
        let inputs = self.inputs();
        let mut cursor = Some(node);
        while let Some(n) = cursor {
            if let Some(index) = inputs.iter().position(|i| *i == n) {
                self.inputs.lock().current = index;
                return;
            }
            if n == self.holder {
                break;
            }
            cursor = self.surface.parent(n);
        }
    }

    pub fn set_current_input_index(&self, index: usize) {
        self.inputs.lock().current = index;
    }

    fn drop_inputs_cache(&self) {
        let mut cache = self.inputs.lock();
        cache.nodes = None;
        cache.current = 0;
    }

    /// No text in any input and no media.
    pub fn is_empty(&self) -> bool {
        let inputs = self.inputs();
        let text_empty = if inputs.is_empty() {
            self.surface.text_content(self.holder).trim().is_empty()
        } else {
            inputs
                .iter()
                .all(|i| self.surface.text_content(*i).trim().is_empty())
        };
        text_empty && !self.has_media()
    }

    pub fn has_media(&self) -> bool {
        self.surface.has_media(self.holder)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// React to a change inside the block and announce it.
    pub(crate) fn did_mutate(&mut self, cause: ChangeCause, index: Option<usize>) {
        let structural = match &cause {
            ChangeCause::Records(records) => records.iter().any(|r| r.is_structural()),
            ChangeCause::Unknown | ChangeCause::Manual | ChangeCause::Content => true,
        };
        if structural {
            self.drop_inputs_cache();
        }
        self.call(BlockHook::Updated);
        self.bus.emit(EditorEvent::Mutation(MutationEvent::changed(
            self.block_ref(),
            index,
            cause,
        )));
    }

    /// Announce a change the watcher cannot see.
    pub fn dispatch_change(&mut self) {
        self.did_mutate(ChangeCause::Manual, None);
    }

    // ========================================================================
    // State flags
    // ========================================================================

    pub fn selected(&self) -> bool {
        self.selected
    }

    /// Empty blocks are never selectable.
    pub fn set_selected(&mut self, selected: bool) {
        if selected && self.is_empty() {
            return;
        }
        self.selected = selected;
        self.surface.set_hint(self.holder, Hint::Selected, selected);
    }

    pub fn stretched(&self) -> bool {
        self.stretched
    }

    pub fn set_stretched(&mut self, stretched: bool) {
        self.stretched = stretched;
        self.surface.set_hint(self.holder, Hint::Stretched, stretched);
    }

    pub fn drop_target(&self) -> bool {
        self.drop_target
    }

    pub fn set_drop_target(&mut self, drop_target: bool) {
        self.drop_target = drop_target;
        self.surface
            .set_hint(self.holder, Hint::DropTarget, drop_target);
    }

    /// Attach or detach interaction bindings. Repeated calls are no-ops.
    pub(crate) fn set_bindings(&mut self, attached: bool) {
        if self.bindings_attached == attached || self.destroyed {
            return;
        }
        if attached {
            self.surface.bind_interactions(self.holder);
        } else {
            self.surface.unbind_interactions(self.holder);
        }
        self.surface.set_hint(self.holder, Hint::ReadOnly, !attached);
        self.bindings_attached = attached;
    }

    pub fn bindings_attached(&self) -> bool {
        self.bindings_attached
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Tear down the tool instance and remove the holder.
    pub fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.set_bindings(false);
        self.destroyed = true;
        let result = if self.tool.capabilities.destroy {
            self.instance
                .destroy()
                .map_err(|e| EditorError::hook(&self.tool.name, "destroy", e))
        } else {
            Ok(())
        };
        self.surface.remove(self.holder);
        result
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

fn push_entry(
    tool_entries: &mut Vec<MenuEntry>,
    common_entries: &mut Vec<MenuEntry>,
    entry: MenuEntry,
    from_tool: bool,
) {
    if let Some(target) = entry.alias_of.clone() {
        for list in [&mut *tool_entries, &mut *common_entries] {
            if let Some(existing) = list.iter_mut().find(|e| e.name == target) {
                *existing = MenuEntry {
                    name: target,
                    alias_of: None,
                    ..entry
                };
                return;
            }
        }
    }
    if from_tool {
        tool_entries.push(entry);
    } else {
        common_entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Surface;
    use crate::testing::{EchoTool, NamedTune, fixture};
    use crate::tools::{ToolPlugin, TuneAction};
    use blocksmith_types::block_data;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn block(fx: &crate::testing::Fixture, tool: &str, data: Value, tunes: Value) -> Block {
        Block::new(
            BlockParams {
                id: None,
                data: block_data(data),
                tunes: block_data(tunes),
                read_only: false,
            },
            fx.registry.block_tool(tool).unwrap(),
            &fx.registry,
            fx.surface.clone(),
            fx.bus.clone(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_round_trips_identity_data() {
        let fx = fixture(vec![("echo", ToolPlugin::block(EchoTool::new()))]).await;
        let b = block(&fx, "echo", json!({"text": "hi", "n": 3}), json!({})).await;
        let saved = b.save().await.unwrap();
        assert_eq!(saved.tool, "echo");
        assert_eq!(saved.data, block_data(json!({"text": "hi", "n": 3})));
        assert_eq!(saved.id.as_str().len(), blocksmith_types::BLOCK_ID_LEN);
    }

    #[tokio::test]
    async fn test_save_failure_is_reported() {
        let fx = fixture(vec![("bad", ToolPlugin::block(EchoTool::new().failing_save()))]).await;
        let b = block(&fx, "bad", json!({}), json!({})).await;
        assert!(matches!(
            b.save().await,
            Err(EditorError::SaveFailed { ref tool, .. }) if tool == "bad"
        ));
    }

    #[tokio::test]
    async fn test_unavailable_tune_data_survives() {
        let fx = fixture(vec![
            ("echo", ToolPlugin::block(EchoTool::new())),
            ("anchor", ToolPlugin::tune(NamedTune::new("anchor"))),
        ])
        .await;
        let b = block(
            &fx,
            "echo",
            json!({"text": "x"}),
            json!({"anchor": "intro", "footnotes": ["a"]}),
        )
        .await;
        assert_eq!(b.tune_names(), vec!["anchor", "move_up", "delete", "move_down"]);
        assert_eq!(
            b.tunes_data(),
            block_data(json!({"footnotes": ["a"], "anchor": "intro"}))
        );
    }

    #[tokio::test]
    async fn test_merge_requires_capability() {
        let fx = fixture(vec![
            ("plain", ToolPlugin::block(EchoTool::new())),
            ("merging", ToolPlugin::block(EchoTool::new().mergeable())),
        ])
        .await;
        let mut plain = block(&fx, "plain", json!({"text": "a"}), json!({})).await;
        assert_eq!(
            plain.merge_with(BlockData::new()).await,
            Err(EditorError::NotMergeable("plain".into()))
        );

        let mut merging = block(&fx, "merging", json!({"text": "a"}), json!({})).await;
        merging
            .merge_with(block_data(json!({"text": "b"})))
            .await
            .unwrap();
        assert_eq!(merging.data().await.unwrap()["text"], json!("ab"));
    }

    #[tokio::test]
    async fn test_validate_defaults_to_valid() {
        let fx = fixture(vec![("echo", ToolPlugin::block(EchoTool::new()))]).await;
        let b = block(&fx, "echo", json!({}), json!({})).await;
        assert!(b.validate(&BlockData::new()).await);

        let p = block(&fx, "paragraph", json!({"text": ""}), json!({})).await;
        assert!(!p.validate(&block_data(json!({"text": ""}))).await);
    }

    #[tokio::test]
    async fn test_alias_without_target_is_appended() {
        let settings = vec![
            MenuEntry::new("stretch", "Stretch", TuneAction::None),
            MenuEntry::new("remove", "Remove block", TuneAction::Delete).alias_of("delete"),
        ];
        let fx = fixture(vec![(
            "echo",
            ToolPlugin::block(EchoTool::new().with_settings(settings)),
        )])
        .await;
        let b = block(&fx, "echo", json!({}), json!({})).await;
        let (tool_entries, common) = b.get_tunes();
        // Tool entries render before the common tunes, so the alias has no target yet.
        assert_eq!(
            tool_entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            vec!["stretch", "remove"]
        );
        assert_eq!(
            common.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            vec!["move_up", "delete", "move_down"]
        );
    }

    #[tokio::test]
    async fn test_tune_alias_redirects_into_tool_entry() {
        let settings = vec![MenuEntry::new("anchor", "Anchor", TuneAction::None)];
        let fx = fixture(vec![
            (
                "echo",
                ToolPlugin::block(EchoTool::new().with_settings(settings)),
            ),
            (
                "anchor_tune",
                ToolPlugin::tune(NamedTune::new("anchor_tune").aliased("anchor")),
            ),
        ])
        .await;
        let b = block(&fx, "echo", json!({}), json!({})).await;
        let (tool_entries, common) = b.get_tunes();
        assert_eq!(tool_entries.len(), 1);
        assert_eq!(tool_entries[0].name, "anchor");
        assert_eq!(tool_entries[0].title, "anchor_tune");
        assert_eq!(common.len(), 3);
    }

    #[tokio::test]
    async fn test_inputs_navigation() {
        let fx = fixture(vec![("multi", ToolPlugin::block(EchoTool::new().with_inputs(3)))]).await;
        let b = block(&fx, "multi", json!({}), json!({})).await;
        let inputs = b.inputs();
        assert_eq!(inputs.len(), 3);
        assert_eq!(b.first_input(), Some(inputs[0]));
        assert_eq!(b.last_input(), Some(inputs[2]));
        assert_eq!(b.previous_input(), None);

        b.update_current_input(inputs[1]);
        assert_eq!(b.current_input(), Some(inputs[1]));
        assert_eq!(b.next_input(), Some(inputs[2]));
        assert_eq!(b.previous_input(), Some(inputs[0]));
    }

    #[tokio::test]
    async fn test_structural_change_drops_input_cache() {
        let fx = fixture(vec![("multi", ToolPlugin::block(EchoTool::new().with_inputs(1)))]).await;
        let mut b = block(&fx, "multi", json!({}), json!({})).await;
        assert_eq!(b.inputs().len(), 1);

        let extra = fx.surface.create_element(b.holder(), "div", true);
        assert_eq!(b.inputs().len(), 1, "cached until told otherwise");

        let record = crate::surface::RawRecord {
            target: b.holder(),
            added_nodes: vec![extra],
            removed_nodes: Vec::new(),
            attribute_name: None,
        };
        b.did_mutate(ChangeCause::Records(vec![record]), Some(0));
        assert_eq!(b.inputs().len(), 2);
    }

    #[tokio::test]
    async fn test_selecting_empty_block_is_noop() {
        let fx = fixture(vec![("echo", ToolPlugin::block(EchoTool::new()))]).await;
        let mut empty = block(&fx, "echo", json!({"text": ""}), json!({})).await;
        empty.set_selected(true);
        assert!(!empty.selected());

        let mut full = block(&fx, "echo", json!({"text": "x"}), json!({})).await;
        full.set_selected(true);
        assert!(full.selected());
        assert!(fx.surface.has_hint(full.holder(), Hint::Selected));
    }

    #[tokio::test]
    async fn test_active_toolbox_entry() {
        let toolbox = vec![
            ToolboxEntry {
                title: Some("H2".into()),
                icon: None,
                data: Some(block_data(json!({"level": 2}))),
            },
            ToolboxEntry {
                title: Some("H3".into()),
                icon: None,
                data: Some(block_data(json!({"level": 3}))),
            },
        ];
        let fx = fixture(vec![(
            "header",
            ToolPlugin::block(EchoTool::new().with_toolbox(toolbox)),
        )])
        .await;
        let b = block(&fx, "header", json!({"text": "T", "level": 3}), json!({})).await;
        let entry = b.get_active_toolbox_entry().await.unwrap();
        assert_eq!(entry.title.as_deref(), Some("H3"));

        let p = block(&fx, "paragraph", json!({"text": "x"}), json!({})).await;
        assert_eq!(
            p.get_active_toolbox_entry().await.unwrap().title.as_deref(),
            Some("Text")
        );
    }

    #[tokio::test]
    async fn test_destroy_is_guarded() {
        let fx = fixture(vec![("echo", ToolPlugin::block(EchoTool::new().with_destroy()))]).await;
        let mut b = block(&fx, "echo", json!({}), json!({})).await;
        let holder = b.holder();
        b.destroy().unwrap();
        b.destroy().unwrap();
        assert!(b.is_destroyed());
        assert!(!fx.surface.contains(holder));
    }

    #[tokio::test]
    async fn test_bindings_toggle_is_idempotent() {
        let fx = fixture(vec![("echo", ToolPlugin::block(EchoTool::new()))]).await;
        let mut b = block(&fx, "echo", json!({}), json!({})).await;
        b.set_bindings(true);
        b.set_bindings(true);
        assert_eq!(fx.surface.binding_count(b.holder()), 1);
        b.set_bindings(false);
        b.set_bindings(false);
        assert_eq!(fx.surface.binding_count(b.holder()), 0);
    }

    #[tokio::test]
    async fn test_export_as_text() {
        let fx = fixture(vec![]).await;
        let p = block(&fx, "paragraph", json!({"text": "Hello <b>x</b>"}), json!({})).await;
        assert_eq!(p.export_data_as_text().await.unwrap(), "Hello <b>x</b>");
    }
}
