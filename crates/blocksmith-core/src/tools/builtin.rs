//! Tools every editor carries.
//!
//! `paragraph` is the default text block (a user tool registered under the
//! same name replaces it), `stub` stands in for blocks whose tool is
//! unavailable, `bold`/`italic`/`link` are the stock inline tools, and
//! `move_up`/`delete`/`move_down` are the tunes attached to every block.

use async_trait::async_trait;
use blocksmith_types::{BlockData, NodeId, block_data};
use serde_json::{Value, json};

use super::{
    BlockCapabilities, BlockTool, BlockToolContext, BlockToolInstance, BlockTune, InlineTool,
    MenuEntry, PasteConfig, PasteEvent, TagPasteRule, ToolBase, ToolPlugin, ToolboxEntry,
    TuneAction, TuneContext, TuneInstance,
};
use crate::conversion::ConversionConfig;
use crate::sanitize::{AttributeRule, SanitizeConfig, TagRule};
use crate::surface::SharedSurface;

pub const PARAGRAPH_TOOL: &str = "paragraph";
pub const STUB_TOOL: &str = "stub";
pub const MOVE_UP_TUNE: &str = "move_up";
pub const DELETE_TUNE: &str = "delete";
pub const MOVE_DOWN_TUNE: &str = "move_down";

/// Built-in tools in registration order.
pub fn internal_tools() -> Vec<(String, ToolPlugin)> {
    vec![
        (PARAGRAPH_TOOL.to_string(), ToolPlugin::block(Paragraph)),
        (STUB_TOOL.to_string(), ToolPlugin::block(Stub)),
        ("bold".to_string(), ToolPlugin::inline(Bold)),
        ("italic".to_string(), ToolPlugin::inline(Italic)),
        ("link".to_string(), ToolPlugin::inline(Link)),
        (MOVE_UP_TUNE.to_string(), ToolPlugin::tune(MoveTune::Up)),
        (DELETE_TUNE.to_string(), ToolPlugin::tune(DeleteTune)),
        (MOVE_DOWN_TUNE.to_string(), ToolPlugin::tune(MoveTune::Down)),
    ]
}

// ============================================================================
// Paragraph
// ============================================================================

/// Default text block. Data: `{ "text": "<inline html>" }`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Paragraph;

#[async_trait]
impl ToolBase for Paragraph {
    fn sanitize(&self) -> SanitizeConfig {
        SanitizeConfig::from([("br".to_string(), TagRule::Keep(true))])
    }

    fn is_read_only_supported(&self) -> bool {
        true
    }

    fn title(&self) -> Option<String> {
        Some("Text".into())
    }
}

impl BlockTool for Paragraph {
    fn capabilities(&self) -> BlockCapabilities {
        BlockCapabilities {
            validate: true,
            merge: true,
            on_paste: true,
            ..Default::default()
        }
    }

    fn paste_config(&self) -> PasteConfig {
        PasteConfig::Rules {
            tags: vec![TagPasteRule::new("p")],
            patterns: Vec::new(),
            files: None,
        }
    }

    fn conversion_config(&self) -> ConversionConfig {
        ConversionConfig::property("text")
    }

    fn toolbox(&self) -> Vec<ToolboxEntry> {
        vec![ToolboxEntry::titled("Text")]
    }

    fn render(&self, ctx: BlockToolContext) -> anyhow::Result<Box<dyn BlockToolInstance>> {
        let input = ctx.surface.create_element(ctx.holder, "div", !ctx.read_only);
        if let Some(text) = ctx.data.get("text").and_then(Value::as_str) {
            ctx.surface.set_inner_html(input, text);
        }
        Ok(Box::new(ParagraphBlock {
            surface: ctx.surface,
            input,
            preserve_blank: ctx.config["preserveBlank"].as_bool().unwrap_or(false),
        }))
    }
}

struct ParagraphBlock {
    surface: SharedSurface,
    input: NodeId,
    preserve_blank: bool,
}

#[async_trait]
impl BlockToolInstance for ParagraphBlock {
    fn content(&self) -> NodeId {
        self.input
    }

    async fn save(&self) -> anyhow::Result<BlockData> {
        Ok(block_data(json!({ "text": self.surface.inner_html(self.input) })))
    }

    async fn validate(&self, data: &BlockData) -> bool {
        let text = data.get("text").and_then(Value::as_str).unwrap_or("");
        self.preserve_blank || !text.trim().is_empty()
    }

    async fn merge(&mut self, data: BlockData) -> anyhow::Result<()> {
        let incoming = data.get("text").and_then(Value::as_str).unwrap_or("");
        let merged = format!("{}{}", self.surface.inner_html(self.input), incoming);
        self.surface.set_inner_html(self.input, &merged);
        Ok(())
    }

    fn on_paste(&mut self, event: &PasteEvent) -> anyhow::Result<()> {
        match event {
            PasteEvent::Tag { element } => {
                self.surface.set_inner_html(self.input, &element.inner_html());
                Ok(())
            }
            PasteEvent::Pattern { data, .. } => {
                self.surface
                    .set_inner_html(self.input, &html_escape::encode_text(data));
                Ok(())
            }
            PasteEvent::File { file } => anyhow::bail!("paragraph cannot take file {}", file.name),
        }
    }
}

// ============================================================================
// Stub
// ============================================================================

/// Placeholder for blocks whose tool is unavailable.
///
/// Data: `{ "title": "<tool>", "savedData": { id, type, data, tunes } }`.
/// Saving returns the data untouched so the original record survives.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stub;

#[async_trait]
impl ToolBase for Stub {
    fn is_read_only_supported(&self) -> bool {
        true
    }
}

impl BlockTool for Stub {
    fn render(&self, ctx: BlockToolContext) -> anyhow::Result<Box<dyn BlockToolInstance>> {
        let content = ctx.surface.create_element(ctx.holder, "div", false);
        let title = ctx
            .data
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Unavailable block");
        ctx.surface
            .set_inner_html(content, &html_escape::encode_text(title));
        Ok(Box::new(StubBlock {
            content,
            data: ctx.data,
        }))
    }
}

struct StubBlock {
    content: NodeId,
    data: BlockData,
}

#[async_trait]
impl BlockToolInstance for StubBlock {
    fn content(&self) -> NodeId {
        self.content
    }

    async fn save(&self) -> anyhow::Result<BlockData> {
        Ok(self.data.clone())
    }
}

// ============================================================================
// Inline tools
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct Bold;

#[async_trait]
impl ToolBase for Bold {
    fn sanitize(&self) -> SanitizeConfig {
        SanitizeConfig::from([("b".to_string(), TagRule::Keep(true))])
    }

    fn title(&self) -> Option<String> {
        Some("Bold".into())
    }
}

impl InlineTool for Bold {
    fn shortcut(&self) -> Option<String> {
        Some("CMD+B".into())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Italic;

#[async_trait]
impl ToolBase for Italic {
    fn sanitize(&self) -> SanitizeConfig {
        SanitizeConfig::from([("i".to_string(), TagRule::Keep(true))])
    }

    fn title(&self) -> Option<String> {
        Some("Italic".into())
    }
}

impl InlineTool for Italic {
    fn shortcut(&self) -> Option<String> {
        Some("CMD+I".into())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Link;

#[async_trait]
impl ToolBase for Link {
    fn sanitize(&self) -> SanitizeConfig {
        let attrs = [
            ("href".to_string(), AttributeRule::Keep(true)),
            ("target".to_string(), AttributeRule::Force("_blank".into())),
            ("rel".to_string(), AttributeRule::Force("nofollow".into())),
        ];
        SanitizeConfig::from([("a".to_string(), TagRule::Attributes(attrs.into_iter().collect()))])
    }

    fn title(&self) -> Option<String> {
        Some("Link".into())
    }
}

impl InlineTool for Link {
    fn shortcut(&self) -> Option<String> {
        Some("CMD+K".into())
    }
}

// ============================================================================
// Default tunes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTune {
    Up,
    Down,
}

#[async_trait]
impl ToolBase for MoveTune {
    fn is_read_only_supported(&self) -> bool {
        true
    }
}

impl BlockTune for MoveTune {
    fn create(&self, _ctx: TuneContext) -> Box<dyn TuneInstance> {
        Box::new(*self)
    }
}

impl TuneInstance for MoveTune {
    fn render(&self) -> Vec<MenuEntry> {
        match self {
            MoveTune::Up => vec![MenuEntry::new(MOVE_UP_TUNE, "Move up", TuneAction::MoveUp)],
            MoveTune::Down => {
                vec![MenuEntry::new(MOVE_DOWN_TUNE, "Move down", TuneAction::MoveDown)]
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteTune;

#[async_trait]
impl ToolBase for DeleteTune {
    fn is_read_only_supported(&self) -> bool {
        true
    }
}

impl BlockTune for DeleteTune {
    fn create(&self, _ctx: TuneContext) -> Box<dyn TuneInstance> {
        Box::new(DeleteTune)
    }
}

impl TuneInstance for DeleteTune {
    fn render(&self) -> Vec<MenuEntry> {
        vec![MenuEntry::new(DELETE_TUNE, "Delete", TuneAction::Delete)]
    }
}
