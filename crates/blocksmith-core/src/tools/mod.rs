//! Tool plugins.
//!
//! A tool is one of three shapes, modelled as a tagged variant over
//! [`ToolPlugin`]:
//!
//! - **Block tools** own a block type: they render it and save its data.
//! - **Inline tools** decorate text inside a block (bold, links, ...).
//! - **Tunes** attach auxiliary settings to any block.
//!
//! All three share [`ToolBase`]. Optional block-tool hooks are declared up
//! front in [`BlockCapabilities`], which the registry reads once when the
//! tool is registered; blocks consult that table instead of probing the
//! plugin on every call.

use std::sync::Arc;

use async_trait::async_trait;
use blocksmith_types::{BlockData, BlockId, NodeId};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::conversion::ConversionConfig;
use crate::html::Element;
use crate::sanitize::{SanitizeConfig, TagRule};
use crate::surface::SharedSurface;

pub mod builtin;
pub mod registry;

pub use registry::{ToolDescriptor, ToolRegistry, UnavailableTool};

// ============================================================================
// Classification
// ============================================================================

/// The shape of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolKind {
    Block,
    Inline,
    Tune,
}

/// Optional block-tool hooks, declared once per tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockCapabilities {
    /// `validate` is meaningful; otherwise every save is valid.
    pub validate: bool,
    /// `merge` is implemented; otherwise the block is not mergeable.
    pub merge: bool,
    /// `on_paste` consumes paste events.
    pub on_paste: bool,
    /// `destroy` must be called on teardown.
    pub destroy: bool,
    /// `render_settings` contributes tune menu entries.
    pub settings: bool,
}

// ============================================================================
// Paste rules
// ============================================================================

/// Tag rule: a tag name, optionally scoped to elements carrying a class.
#[derive(Debug, Clone, PartialEq)]
pub struct TagPasteRule {
    /// Lowercase tag name.
    pub tag: String,
    /// Required class, if any.
    pub class: Option<String>,
    /// Sanitize rule applied to matched content for this tag.
    pub sanitize: Option<TagRule>,
}

impl TagPasteRule {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            class: None,
            sanitize: None,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_sanitize(mut self, rule: TagRule) -> Self {
        self.sanitize = Some(rule);
        self
    }

    pub fn matches(&self, element: &Element) -> bool {
        element.tag == self.tag
            && self
                .class
                .as_deref()
                .is_none_or(|class| element.has_class(class))
    }
}

/// Named regex pattern. Only full-fragment matches count.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub key: String,
    pub pattern: Regex,
}

impl PatternRule {
    pub fn new(key: impl Into<String>, pattern: Regex) -> Self {
        Self {
            key: key.into(),
            pattern,
        }
    }

    /// True when the first match spans the whole text.
    pub fn matches_fully(&self, text: &str) -> bool {
        self.pattern
            .find(text)
            .is_some_and(|m| m.start() == 0 && m.end() == text.len())
    }
}

/// Accepted files by mime type (`image/png`, `image/*`) or extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePasteRule {
    pub mime_types: Vec<String>,
    pub extensions: Vec<String>,
}

/// Paste handling declared by a block tool.
#[derive(Debug, Clone, Default)]
pub enum PasteConfig {
    /// The tool opts out of all paste handling.
    Disabled,
    /// No rules declared.
    #[default]
    None,
    Rules {
        tags: Vec<TagPasteRule>,
        patterns: Vec<PatternRule>,
        files: Option<FilePasteRule>,
    },
}

// ============================================================================
// Toolbox and menus
// ============================================================================

/// One toolbox variant of a block tool (e.g. "Heading 2").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolboxEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Data the variant inserts; also used to recognize the variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BlockData>,
}

impl ToolboxEntry {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Whether this variant describes `data`: some variant field is present
    /// in `data` with an equal value.
    pub fn matches(&self, data: &BlockData) -> bool {
        self.data.as_ref().is_some_and(|variant| {
            variant
                .iter()
                .any(|(key, value)| data.get(key).is_some_and(|v| v == value))
        })
    }
}

/// What activating a tune menu entry does.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TuneAction {
    MoveUp,
    MoveDown,
    Delete,
    /// Forward `key` to the named tune instance.
    Toggle { tune: String, key: String },
    #[default]
    None,
}

/// One entry of a block's settings menu.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MenuEntry {
    pub name: String,
    pub title: String,
    pub icon: Option<String>,
    /// Redirect into an existing entry with this name instead of adding one.
    pub alias_of: Option<String>,
    pub is_active: bool,
    pub action: TuneAction,
}

impl MenuEntry {
    pub fn new(name: impl Into<String>, title: impl Into<String>, action: TuneAction) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            action,
            ..Default::default()
        }
    }

    pub fn alias_of(mut self, target: impl Into<String>) -> Self {
        self.alias_of = Some(target.into());
        self
    }
}

// ============================================================================
// Paste events
// ============================================================================

/// A file offered by the clipboard or a drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PastedFile {
    pub name: String,
    pub mime: String,
    #[serde(default)]
    pub bytes: Vec<u8>,
}

impl PastedFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: Vec::new(),
        }
    }

    /// Extension after the last dot, lowercase; empty if none.
    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => String::new(),
        }
    }
}

/// Event handed to a block tool's `on_paste`.
#[derive(Debug, Clone, PartialEq)]
pub enum PasteEvent {
    /// Content matched a tag rule (or fell back to the default tool).
    Tag { element: Element },
    /// Text matched a pattern rule.
    Pattern { key: String, data: String },
    /// A file matched a file rule.
    File { file: PastedFile },
}

// ============================================================================
// Plugin traits
// ============================================================================

/// Hooks shared by every tool shape.
#[async_trait]
pub trait ToolBase: Send + Sync {
    /// One-time preparation. `Ok(false)` marks the tool unavailable.
    async fn prepare(&self, name: &str, config: &serde_json::Value) -> anyhow::Result<bool> {
        let _ = (name, config);
        Ok(true)
    }

    /// Called on editor teardown.
    async fn reset(&self) {}

    /// Markup this tool allows in its content.
    fn sanitize(&self) -> SanitizeConfig {
        SanitizeConfig::new()
    }

    fn is_read_only_supported(&self) -> bool {
        false
    }

    /// Human-readable name.
    fn title(&self) -> Option<String> {
        None
    }
}

/// Everything a block tool gets when rendering one block.
#[derive(Clone)]
pub struct BlockToolContext {
    pub block_id: BlockId,
    pub data: BlockData,
    pub config: serde_json::Value,
    pub read_only: bool,
    pub surface: SharedSurface,
    /// Holder node the tool renders under.
    pub holder: NodeId,
}

/// A block tool (the plugin "class").
pub trait BlockTool: ToolBase {
    fn capabilities(&self) -> BlockCapabilities {
        BlockCapabilities::default()
    }

    fn paste_config(&self) -> PasteConfig {
        PasteConfig::None
    }

    fn conversion_config(&self) -> ConversionConfig {
        ConversionConfig::default()
    }

    fn toolbox(&self) -> Vec<ToolboxEntry> {
        Vec::new()
    }

    /// Create the instance backing one block.
    fn render(&self, ctx: BlockToolContext) -> anyhow::Result<Box<dyn BlockToolInstance>>;
}

/// A rendered block tool.
#[async_trait]
pub trait BlockToolInstance: Send + Sync {
    /// Root node of the rendered content.
    fn content(&self) -> NodeId;

    async fn save(&self) -> anyhow::Result<BlockData>;

    async fn validate(&self, data: &BlockData) -> bool {
        let _ = data;
        true
    }

    async fn merge(&mut self, data: BlockData) -> anyhow::Result<()> {
        let _ = data;
        anyhow::bail!("merge not implemented")
    }

    fn on_paste(&mut self, event: &PasteEvent) -> anyhow::Result<()> {
        let _ = event;
        Ok(())
    }

    fn render_settings(&self) -> Vec<MenuEntry> {
        Vec::new()
    }

    fn destroy(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn rendered(&mut self) {}

    fn updated(&mut self) {}

    fn moved(&mut self, from: usize, to: usize) {
        let _ = (from, to);
    }

    fn removed(&mut self) {}
}

/// An inline tool. Only its shared hooks matter to the core.
pub trait InlineTool: ToolBase {
    fn shortcut(&self) -> Option<String> {
        None
    }
}

/// Everything a tune gets when attached to one block.
#[derive(Debug, Clone)]
pub struct TuneContext {
    pub block_id: BlockId,
    pub name: String,
    pub data: Option<serde_json::Value>,
    pub config: serde_json::Value,
    pub read_only: bool,
}

/// A tune (the plugin "class").
pub trait BlockTune: ToolBase {
    fn create(&self, ctx: TuneContext) -> Box<dyn TuneInstance>;
}

/// A tune attached to one block.
pub trait TuneInstance: Send + Sync {
    fn render(&self) -> Vec<MenuEntry> {
        Vec::new()
    }

    /// Data to persist under the tune's name, if any.
    fn save(&self) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(None)
    }

    /// Handle a [`TuneAction::Toggle`] aimed at this tune.
    fn activate(&mut self, key: &str) -> anyhow::Result<()> {
        let _ = key;
        Ok(())
    }
}

/// A registered plugin of any shape.
#[derive(Clone)]
pub enum ToolPlugin {
    Block(Arc<dyn BlockTool>),
    Inline(Arc<dyn InlineTool>),
    Tune(Arc<dyn BlockTune>),
}

impl std::fmt::Debug for ToolPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ToolPlugin::{}", self.kind())
    }
}

impl ToolPlugin {
    pub fn block(tool: impl BlockTool + 'static) -> Self {
        ToolPlugin::Block(Arc::new(tool))
    }

    pub fn inline(tool: impl InlineTool + 'static) -> Self {
        ToolPlugin::Inline(Arc::new(tool))
    }

    pub fn tune(tool: impl BlockTune + 'static) -> Self {
        ToolPlugin::Tune(Arc::new(tool))
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolPlugin::Block(_) => ToolKind::Block,
            ToolPlugin::Inline(_) => ToolKind::Inline,
            ToolPlugin::Tune(_) => ToolKind::Tune,
        }
    }

    pub async fn prepare(&self, name: &str, config: &serde_json::Value) -> anyhow::Result<bool> {
        match self {
            ToolPlugin::Block(t) => t.prepare(name, config).await,
            ToolPlugin::Inline(t) => t.prepare(name, config).await,
            ToolPlugin::Tune(t) => t.prepare(name, config).await,
        }
    }

    pub async fn reset(&self) {
        match self {
            ToolPlugin::Block(t) => t.reset().await,
            ToolPlugin::Inline(t) => t.reset().await,
            ToolPlugin::Tune(t) => t.reset().await,
        }
    }

    pub fn sanitize(&self) -> SanitizeConfig {
        match self {
            ToolPlugin::Block(t) => t.sanitize(),
            ToolPlugin::Inline(t) => t.sanitize(),
            ToolPlugin::Tune(t) => t.sanitize(),
        }
    }

    pub fn is_read_only_supported(&self) -> bool {
        match self {
            ToolPlugin::Block(t) => t.is_read_only_supported(),
            ToolPlugin::Inline(t) => t.is_read_only_supported(),
            ToolPlugin::Tune(t) => t.is_read_only_supported(),
        }
    }

    pub fn title(&self) -> Option<String> {
        match self {
            ToolPlugin::Block(t) => t.title(),
            ToolPlugin::Inline(t) => t.title(),
            ToolPlugin::Tune(t) => t.title(),
        }
    }
}
