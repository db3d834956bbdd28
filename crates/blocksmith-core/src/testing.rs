//! Test tools and fixtures shared by the unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use blocksmith_types::{BlockData, NodeId};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::block_manager::BlockManager;
use crate::config::EditorConfig;
use crate::conversion::ConversionConfig;
use crate::events::{EditorEvent, MutationEvent, SharedEventBus, shared_event_bus};
use crate::sanitize::{SanitizeConfig, TagSanitizer};
use crate::surface::{MemorySurface, SharedSurface};
use crate::tools::{
    BlockCapabilities, BlockTool, BlockToolContext, BlockToolInstance, BlockTune, FilePasteRule,
    MenuEntry, PasteConfig, PasteEvent, PatternRule, TagPasteRule, ToolBase, ToolPlugin,
    ToolRegistry, ToolboxEntry, TuneAction, TuneContext, TuneInstance,
};

// ============================================================================
// Fixture
// ============================================================================

pub struct Fixture {
    pub registry: Arc<ToolRegistry>,
    pub surface: Arc<MemorySurface>,
    pub bus: SharedEventBus,
    pub manager: BlockManager,
}

pub async fn fixture(tools: Vec<(&str, ToolPlugin)>) -> Fixture {
    fixture_with(tools, EditorConfig::default()).await
}

pub async fn fixture_with(tools: Vec<(&str, ToolPlugin)>, config: EditorConfig) -> Fixture {
    let bus = shared_event_bus();
    let plugins = tools.into_iter().map(|(n, p)| (n.to_string(), p));
    let registry = Arc::new(
        ToolRegistry::prepare(plugins, &config, Some(&bus))
            .await
            .unwrap(),
    );
    let surface = Arc::new(MemorySurface::new());
    let manager = BlockManager::new(
        registry.clone(),
        bus.clone(),
        surface.clone(),
        surface.clone(),
        Arc::new(TagSanitizer),
    );
    Fixture {
        registry,
        surface,
        bus,
        manager,
    }
}

/// Collect every mutation published under `pattern`.
pub fn record_events(bus: &SharedEventBus, pattern: &str) -> Arc<Mutex<Vec<MutationEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    bus.on(pattern, move |event| {
        if let EditorEvent::Mutation(m) = event {
            sink.lock().push(m.clone());
        }
    });
    events
}

// ============================================================================
// EchoTool
// ============================================================================

/// Block tool that saves back what it was given, with `text` read from its
/// first input.
#[derive(Clone)]
pub struct EchoTool {
    read_only_supported: bool,
    failing_save: bool,
    failing_render: bool,
    failing_destroy: bool,
    inputs: usize,
    capabilities: BlockCapabilities,
    settings: Vec<MenuEntry>,
    toolbox: Vec<ToolboxEntry>,
    paste: PasteConfig,
    conversion: ConversionConfig,
    sanitize: SanitizeConfig,
}

impl EchoTool {
    pub fn new() -> Self {
        Self {
            read_only_supported: true,
            failing_save: false,
            failing_render: false,
            failing_destroy: false,
            inputs: 1,
            capabilities: BlockCapabilities {
                on_paste: true,
                ..Default::default()
            },
            settings: Vec::new(),
            toolbox: Vec::new(),
            paste: PasteConfig::None,
            conversion: ConversionConfig::property("text"),
            sanitize: SanitizeConfig::new(),
        }
    }

    pub fn without_read_only(mut self) -> Self {
        self.read_only_supported = false;
        self
    }

    pub fn failing_save(mut self) -> Self {
        self.failing_save = true;
        self
    }

    pub fn failing_render(mut self) -> Self {
        self.failing_render = true;
        self
    }

    pub fn failing_destroy(mut self) -> Self {
        self.failing_destroy = true;
        self.capabilities.destroy = true;
        self
    }

    pub fn with_destroy(mut self) -> Self {
        self.capabilities.destroy = true;
        self
    }

    pub fn mergeable(mut self) -> Self {
        self.capabilities.merge = true;
        self
    }

    pub fn validating(mut self) -> Self {
        self.capabilities.validate = true;
        self
    }

    pub fn with_settings(mut self, entries: Vec<MenuEntry>) -> Self {
        self.capabilities.settings = true;
        self.settings = entries;
        self
    }

    pub fn with_inputs(mut self, count: usize) -> Self {
        self.inputs = count;
        self
    }

    pub fn with_toolbox(mut self, toolbox: Vec<ToolboxEntry>) -> Self {
        self.toolbox = toolbox;
        self
    }

    pub fn with_sanitize(mut self, sanitize: SanitizeConfig) -> Self {
        self.sanitize = sanitize;
        self
    }

    pub fn without_conversion(mut self) -> Self {
        self.conversion = ConversionConfig::default();
        self
    }

    pub fn with_tags(self, tags: Vec<TagPasteRule>) -> Self {
        self.with_paste_rules(|t, _, _| *t = tags)
    }

    pub fn with_patterns(self, patterns: Vec<PatternRule>) -> Self {
        self.with_paste_rules(|_, p, _| *p = patterns)
    }

    pub fn with_files(self, files: FilePasteRule) -> Self {
        self.with_paste_rules(|_, _, f| *f = Some(files))
    }

    fn with_paste_rules(
        mut self,
        edit: impl FnOnce(
            &mut Vec<TagPasteRule>,
            &mut Vec<PatternRule>,
            &mut Option<FilePasteRule>,
        ),
    ) -> Self {
        let (mut tags, mut patterns, mut files) = match std::mem::take(&mut self.paste) {
            PasteConfig::Rules {
                tags,
                patterns,
                files,
            } => (tags, patterns, files),
            _ => (Vec::new(), Vec::new(), None),
        };
        edit(&mut tags, &mut patterns, &mut files);
        self.paste = PasteConfig::Rules {
            tags,
            patterns,
            files,
        };
        self
    }
}

#[async_trait]
impl ToolBase for EchoTool {
    fn sanitize(&self) -> SanitizeConfig {
        self.sanitize.clone()
    }

    fn is_read_only_supported(&self) -> bool {
        self.read_only_supported
    }
}

impl BlockTool for EchoTool {
    fn capabilities(&self) -> BlockCapabilities {
        self.capabilities
    }

    fn paste_config(&self) -> PasteConfig {
        self.paste.clone()
    }

    fn conversion_config(&self) -> ConversionConfig {
        self.conversion.clone()
    }

    fn toolbox(&self) -> Vec<ToolboxEntry> {
        self.toolbox.clone()
    }

    fn render(&self, ctx: BlockToolContext) -> anyhow::Result<Box<dyn BlockToolInstance>> {
        if self.failing_render {
            anyhow::bail!("render refused");
        }
        let inputs: Vec<NodeId> = (0..self.inputs)
            .map(|_| ctx.surface.create_element(ctx.holder, "div", !ctx.read_only))
            .collect();
        let content = match inputs.first() {
            Some(first) => *first,
            None => ctx.surface.create_element(ctx.holder, "div", false),
        };
        if let Some(text) = ctx.data.get("text").and_then(Value::as_str) {
            ctx.surface.set_inner_html(content, text);
        }
        Ok(Box::new(EchoBlock {
            surface: ctx.surface,
            content,
            data: ctx.data,
            failing_save: self.failing_save,
            failing_destroy: self.failing_destroy,
            settings: self.settings.clone(),
        }))
    }
}

struct EchoBlock {
    surface: SharedSurface,
    content: NodeId,
    data: BlockData,
    failing_save: bool,
    failing_destroy: bool,
    settings: Vec<MenuEntry>,
}

impl EchoBlock {
    fn text(&self) -> String {
        self.surface.inner_html(self.content)
    }
}

#[async_trait]
impl BlockToolInstance for EchoBlock {
    fn content(&self) -> NodeId {
        self.content
    }

    async fn save(&self) -> anyhow::Result<BlockData> {
        if self.failing_save {
            anyhow::bail!("save refused");
        }
        let mut data = self.data.clone();
        let text = self.text();
        if data.contains_key("text") || !text.is_empty() {
            data.insert("text".into(), Value::String(text));
        }
        Ok(data)
    }

    async fn validate(&self, data: &BlockData) -> bool {
        data.get("text")
            .and_then(Value::as_str)
            .is_some_and(|t| !t.trim().is_empty())
    }

    async fn merge(&mut self, data: BlockData) -> anyhow::Result<()> {
        let incoming = data.get("text").and_then(Value::as_str).unwrap_or("");
        let merged = format!("{}{}", self.text(), incoming);
        self.surface.set_inner_html(self.content, &merged);
        Ok(())
    }

    fn on_paste(&mut self, event: &PasteEvent) -> anyhow::Result<()> {
        match event {
            PasteEvent::Tag { element } => {
                self.surface.set_inner_html(self.content, &element.inner_html())
            }
            PasteEvent::Pattern { data, .. } => self.surface.set_inner_html(self.content, data),
            PasteEvent::File { file } => {
                self.data
                    .insert("file".into(), json!({"name": file.name, "mime": file.mime}));
            }
        }
        Ok(())
    }

    fn render_settings(&self) -> Vec<MenuEntry> {
        self.settings.clone()
    }

    fn destroy(&mut self) -> anyhow::Result<()> {
        if self.failing_destroy {
            anyhow::bail!("destroy refused");
        }
        Ok(())
    }
}

// ============================================================================
// Failing tools
// ============================================================================

/// Block tool whose preparation fails.
pub struct FailingTool {
    declines: bool,
}

impl FailingTool {
    /// `prepare` returns an error.
    pub fn errors() -> Self {
        Self { declines: false }
    }

    /// `prepare` answers `false`.
    pub fn declines() -> Self {
        Self { declines: true }
    }
}

#[async_trait]
impl ToolBase for FailingTool {
    async fn prepare(&self, _name: &str, _config: &Value) -> anyhow::Result<bool> {
        if self.declines {
            Ok(false)
        } else {
            anyhow::bail!("backend unreachable")
        }
    }
}

impl BlockTool for FailingTool {
    fn render(&self, _ctx: BlockToolContext) -> anyhow::Result<Box<dyn BlockToolInstance>> {
        anyhow::bail!("never prepared")
    }
}

/// Block tool whose preparation panics.
pub struct PanickingTool;

#[async_trait]
impl ToolBase for PanickingTool {
    async fn prepare(&self, _name: &str, _config: &Value) -> anyhow::Result<bool> {
        panic!("prepare exploded")
    }
}

impl BlockTool for PanickingTool {
    fn render(&self, _ctx: BlockToolContext) -> anyhow::Result<Box<dyn BlockToolInstance>> {
        anyhow::bail!("never prepared")
    }
}

// ============================================================================
// NamedTune
// ============================================================================

/// Tune with one toggle entry named after itself. Keeps its data verbatim
/// until toggled.
#[derive(Clone)]
pub struct NamedTune {
    name: String,
    alias_of: Option<String>,
}

impl NamedTune {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias_of: None,
        }
    }

    pub fn aliased(mut self, target: &str) -> Self {
        self.alias_of = Some(target.to_string());
        self
    }
}

#[async_trait]
impl ToolBase for NamedTune {
    fn is_read_only_supported(&self) -> bool {
        true
    }
}

impl BlockTune for NamedTune {
    fn create(&self, ctx: TuneContext) -> Box<dyn TuneInstance> {
        Box::new(NamedTuneInstance {
            name: self.name.clone(),
            alias_of: self.alias_of.clone(),
            data: ctx.data,
        })
    }
}

struct NamedTuneInstance {
    name: String,
    alias_of: Option<String>,
    data: Option<Value>,
}

impl TuneInstance for NamedTuneInstance {
    fn render(&self) -> Vec<MenuEntry> {
        let mut entry = MenuEntry::new(
            &self.name,
            &self.name,
            TuneAction::Toggle {
                tune: self.name.clone(),
                key: self.name.clone(),
            },
        );
        entry.is_active = self.data.as_ref().is_some_and(|v| v == &Value::Bool(true));
        entry.alias_of = self.alias_of.clone();
        vec![entry]
    }

    fn save(&self) -> anyhow::Result<Option<Value>> {
        Ok(self.data.clone())
    }

    fn activate(&mut self, _key: &str) -> anyhow::Result<()> {
        let active = self.data.as_ref().is_some_and(|v| v == &Value::Bool(true));
        self.data = Some(Value::Bool(!active));
        Ok(())
    }
}
