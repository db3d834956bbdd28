//! Clipboard and drop ingestion.
//!
//! A [`DataTransfer`] is routed in priority order: files, the editor's own
//! export format, then markup or plain text. Markup is cleaned, split into
//! block-level and inline fragments, and each fragment goes to the tool
//! whose tag rule claims it. A lone inline fragment may instead match a
//! tool's pattern, or be inserted at the caret.

mod rules;

pub use rules::PasteRules;

use blocksmith_types::{BlockData, BlockId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::block_manager::{BlockManager, InsertOptions};
use crate::error::Result;
use crate::events::ChangeCause;
use crate::html::{self, Element, HtmlNode};
use crate::sanitize::{SanitizeConfig, TagRule, merge_configs, sanitize_data};
use crate::surface::CaretPosition;
use crate::tools::{PasteEvent, PastedFile, ToolRegistry};

/// Clipboard type carrying the editor's own block export.
pub const INTERNAL_MIME: &str = "application/x-editor-js";
pub const HTML_MIME: &str = "text/html";
pub const PLAIN_MIME: &str = "text/plain";

/// Longest text, in chars, that is tried against paste patterns.
pub const PATTERN_PROCESSING_MAX_LENGTH: usize = 450;

/// Clipboard or drop payload: typed string items plus files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTransfer {
    #[serde(default)]
    items: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    files: Vec<PastedFile>,
}

impl DataTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, mime: impl Into<String>, data: impl Into<String>) -> Self {
        self.items.insert(mime.into(), data.into());
        self
    }

    pub fn with_html(self, html: impl Into<String>) -> Self {
        self.with_data(HTML_MIME, html)
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_data(PLAIN_MIME, text)
    }

    pub fn with_file(mut self, file: PastedFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn get(&self, mime: &str) -> Option<&str> {
        self.items.get(mime).map(String::as_str)
    }

    pub fn html(&self) -> Option<&str> {
        self.get(HTML_MIME)
    }

    pub fn text(&self) -> Option<&str> {
        self.get(PLAIN_MIME)
    }

    pub fn files(&self) -> &[PastedFile] {
        &self.files
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }
}

/// One block of the internal export format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalBlock {
    pub tool: String,
    pub data: BlockData,
}

/// A unit of pasted content bound for one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct PasteFragment {
    pub tool: String,
    /// Block-level content; inline runs are `false`.
    pub is_block: bool,
    pub content: Element,
    pub event: PasteEvent,
}

/// What a transfer turned out to hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    Files(Vec<PastedFile>),
    Internal(Vec<InternalBlock>),
    Html(String),
    Plain(String),
}

/// Result of splitting markup: an inline run or a block-level element.
#[derive(Debug)]
enum Piece {
    Fragment(Vec<HtmlNode>),
    Block(Element),
}

enum ElementRole {
    Inline,
    Block,
    Descend,
}

/// Routes clipboard payloads into blocks.
#[derive(Debug, Default)]
pub struct IngestionPipeline {
    rules: PasteRules,
    read_only: bool,
}

impl IngestionPipeline {
    /// Collect the paste rules of every available block tool.
    pub fn new(registry: &ToolRegistry) -> Self {
        Self {
            rules: PasteRules::collect(registry),
            read_only: false,
        }
    }

    pub fn rules(&self) -> &PasteRules {
        &self.rules
    }

    pub fn toggle_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_enabled(&self) -> bool {
        !self.read_only
    }

    /// Ingest a paste or drop. Returns the blocks created, in order.
    pub fn process_data_transfer(
        &self,
        manager: &mut BlockManager,
        transfer: &DataTransfer,
        is_drag_and_drop: bool,
    ) -> Result<Vec<BlockId>> {
        if self.read_only {
            tracing::debug!("paste refused in read-only mode");
            return Ok(Vec::new());
        }
        let ingest = self.classify(
            manager.registry(),
            manager.sanitizer().as_ref(),
            transfer,
            is_drag_and_drop,
        );
        match ingest {
            Some(Ingest::Files(files)) => self.process_files(manager, &files),
            Some(Ingest::Internal(blocks)) => self.insert_internal(manager, blocks),
            Some(Ingest::Html(html)) => self.process_text(manager, &html, true),
            Some(Ingest::Plain(text)) => self.process_text(manager, &text, false),
            None => Ok(Vec::new()),
        }
    }

    /// Decide which path a transfer takes.
    pub fn classify(
        &self,
        registry: &ToolRegistry,
        sanitizer: &dyn crate::sanitize::Sanitizer,
        transfer: &DataTransfer,
        is_drag_and_drop: bool,
    ) -> Option<Ingest> {
        if !transfer.files().is_empty() && self.rules.has_file_rules() {
            return Some(Ingest::Files(transfer.files().to_vec()));
        }

        if let Some(payload) = transfer.get(INTERNAL_MIME) {
            match serde_json::from_str::<Vec<InternalBlock>>(payload) {
                Ok(blocks) => return Some(Ingest::Internal(blocks)),
                Err(e) => {
                    tracing::warn!(error = %e, "malformed internal paste payload, falling back")
                }
            }
        }

        let plain = transfer.text().unwrap_or_default();
        let mut markup = transfer.html().unwrap_or_default().to_string();
        if is_drag_and_drop && !plain.trim().is_empty() && !markup.trim().is_empty() {
            markup = format!("<p>{markup}</p>");
        }

        let keep_br: SanitizeConfig =
            [("br".to_string(), TagRule::Keep(true))].into_iter().collect();
        let config = merge_configs([
            &self.rules.tags_sanitize_config(),
            &registry.all_inline_sanitize_config(),
            &keep_br,
        ]);
        let cleaned = sanitizer.clean(&markup, &config);
        let cleaned = cleaned.trim();

        if cleaned.is_empty() || cleaned == plain.trim() || !html::is_html_string(cleaned) {
            if plain.is_empty() {
                return None;
            }
            Some(Ingest::Plain(plain.to_string()))
        } else {
            Some(Ingest::Html(cleaned.to_string()))
        }
    }

    /// Insert cleaned markup or plain text.
    pub fn process_text(
        &self,
        manager: &mut BlockManager,
        data: &str,
        is_html: bool,
    ) -> Result<Vec<BlockId>> {
        let mut fragments = if is_html {
            self.process_html(manager.registry(), manager.sanitizer().as_ref(), data)
        } else {
            self.process_plain(manager.registry(), data)
        };

        match fragments.len() {
            0 => Ok(Vec::new()),
            1 => {
                let Some(fragment) = fragments.pop() else {
                    return Ok(Vec::new());
                };
                if fragment.is_block {
                    self.process_single_block(manager, fragment)
                } else {
                    self.process_inline_paste(manager, fragment)
                }
            }
            _ => {
                let replace_first = current_is_empty_default(manager);
                let mut ids = Vec::with_capacity(fragments.len());
                for (i, fragment) in fragments.into_iter().enumerate() {
                    ids.push(self.insert_block(manager, &fragment, i == 0 && replace_first)?);
                }
                Ok(ids)
            }
        }
    }

    /// Split markup into fragments and bind each to a tool.
    pub fn process_html(
        &self,
        registry: &ToolRegistry,
        sanitizer: &dyn crate::sanitize::Sanitizer,
        markup: &str,
    ) -> Vec<PasteFragment> {
        let default_tool = registry.default_tool_name().to_string();
        self.get_nodes(html::parse_fragment(markup))
            .into_iter()
            .filter_map(|piece| {
                let (mut content, is_block, tool) = match piece {
                    Piece::Fragment(nodes) => {
                        let mut div = Element::new("div");
                        div.children = nodes;
                        (div, false, default_tool.clone())
                    }
                    Piece::Block(element) => {
                        let tool = self
                            .rules
                            .tool_for_element(&element)
                            .unwrap_or(default_tool.as_str())
                            .to_string();
                        (element, true, tool)
                    }
                };

                let config = merge_configs([
                    &self.rules.tool_tags_sanitize_config(&tool),
                    &registry.sanitize_config_for(&tool),
                ]);
                if content.tag == "table" {
                    let cleaned = sanitizer.clean(&content.outer_html(), &config);
                    content = html::parse_fragment(&cleaned)
                        .into_iter()
                        .find_map(|n| match n {
                            HtmlNode::Element(e) => Some(e),
                            HtmlNode::Text(_) => None,
                        })?;
                } else {
                    let cleaned = sanitizer.clean(&content.inner_html(), &config);
                    content.children = html::parse_fragment(&cleaned);
                }

                let node = HtmlNode::Element(content);
                if node.is_empty() && !node.is_single_tag() {
                    return None;
                }
                let HtmlNode::Element(content) = node else {
                    return None;
                };
                Some(PasteFragment {
                    event: PasteEvent::Tag {
                        element: content.clone(),
                    },
                    tool,
                    is_block,
                    content,
                })
            })
            .collect()
    }

    /// One default-tool fragment per non-blank line.
    pub fn process_plain(&self, registry: &ToolRegistry, plain: &str) -> Vec<PasteFragment> {
        let tool = registry.default_tool_name();
        plain
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let mut content = Element::new("div");
                content.children =
                    vec![HtmlNode::Text(html_escape::encode_text(line).into_owned())];
                PasteFragment {
                    tool: tool.to_string(),
                    is_block: false,
                    event: PasteEvent::Tag {
                        element: content.clone(),
                    },
                    content,
                }
            })
            .collect()
    }

    /// Split a node list into inline runs and block-level elements.
    fn get_nodes(&self, nodes: Vec<HtmlNode>) -> Vec<Piece> {
        let mut pieces = Vec::new();
        for node in nodes {
            self.reduce_node(&mut pieces, node);
        }
        pieces
    }

    fn reduce_node(&self, pieces: &mut Vec<Piece>, node: HtmlNode) {
        if node.is_empty() && !node.is_single_tag() {
            return;
        }
        match node {
            HtmlNode::Text(_) => push_inline(pieces, node),
            HtmlNode::Element(element) => match self.element_role(&element) {
                ElementRole::Inline => push_inline(pieces, HtmlNode::Element(element)),
                ElementRole::Block => pieces.push(Piece::Block(element)),
                ElementRole::Descend => {
                    let mut inner = Vec::new();
                    for child in element.children {
                        self.reduce_node(&mut inner, child);
                    }
                    pieces.extend(inner);
                }
            },
        }
    }

    fn element_role(&self, element: &Element) -> ElementRole {
        let tool = self.rules.tool_for_element(element);
        let substitutable = tool.is_some();
        let is_block = html::is_block_element(&element.tag);
        let contains_other_tool_tags = element
            .child_elements()
            .any(|child| self.rules.tool_for_element(child).is_some_and(|t| Some(t) != tool));
        let contains_inline = element
            .child_elements()
            .any(|child| html::is_inline_element(&child.tag));

        if !is_block && !substitutable && !contains_other_tool_tags {
            ElementRole::Inline
        } else if (substitutable && !contains_other_tool_tags)
            || (is_block && !contains_inline && !contains_other_tool_tags)
        {
            ElementRole::Block
        } else {
            ElementRole::Descend
        }
    }

    /// A lone block-level fragment. Inline markup for the current block's own
    /// tool is merged at the caret; anything else becomes a new block.
    fn process_single_block(
        &self,
        manager: &mut BlockManager,
        fragment: PasteFragment,
    ) -> Result<Vec<BlockId>> {
        let merge_into_current = manager.current_block().is_some_and(|block| {
            block.name() == fragment.tool
                && html::contains_only_inline_elements(&fragment.content.inner_html())
        });
        if merge_into_current {
            self.insert_at_caret(manager, &fragment.content.inner_html());
            return Ok(Vec::new());
        }
        let replace = current_is_empty_default(manager);
        Ok(vec![self.insert_block(manager, &fragment, replace)?])
    }

    /// A lone inline fragment: try patterns at an empty insertion point,
    /// otherwise insert at the caret or as a new default block.
    fn process_inline_paste(
        &self,
        manager: &mut BlockManager,
        fragment: PasteFragment,
    ) -> Result<Vec<BlockId>> {
        let empty_insertion_point = match manager.current_block() {
            None => true,
            Some(block) => block.tool().is_default && block.is_empty(),
        };
        let text = fragment.content.text_content();

        if empty_insertion_point && text.chars().count() <= PATTERN_PROCESSING_MAX_LENGTH {
            if let Some((tool, key)) = self.rules.match_pattern(&text) {
                let event = PasteEvent::Pattern {
                    key: key.to_string(),
                    data: text.clone(),
                };
                let replace = current_is_empty_default(manager);
                tracing::debug!(tool, key, "paste matched pattern");
                let id = manager.paste(tool, &event, replace)?;
                focus_end(manager, &id);
                return Ok(vec![id]);
            }
        }

        let has_input = manager.current_block().is_some_and(|b| b.current_input().is_some());
        if has_input {
            let tool = manager.current_block().map(|b| b.name().to_string()).unwrap_or_default();
            let config = manager.registry().sanitize_config_for(&tool);
            let cleaned = manager.sanitizer().clean(&fragment.content.inner_html(), &config);
            self.insert_at_caret(manager, &cleaned);
            Ok(Vec::new())
        } else {
            Ok(vec![self.insert_block(manager, &fragment, false)?])
        }
    }

    /// Put markup at the caret inside the current block.
    fn insert_at_caret(&self, manager: &mut BlockManager, markup: &str) {
        let Some(block) = manager.current_block() else {
            return;
        };
        let id = block.id().clone();
        let caret_inside = manager
            .caret()
            .focused()
            .and_then(|node| manager.get_block_by_child_node(node))
            .is_some_and(|b| b.id() == &id);
        if !caret_inside {
            if let Some(input) = block.current_input() {
                manager.caret().set_to_input(input, CaretPosition::End);
            }
        }
        manager.caret().insert_html_at_caret(markup);
        manager.block_did_mutate(&id, ChangeCause::Content);
    }

    fn insert_block(
        &self,
        manager: &mut BlockManager,
        fragment: &PasteFragment,
        can_replace: bool,
    ) -> Result<BlockId> {
        let replace = can_replace && manager.current_block().is_some_and(|b| b.is_empty());
        let id = manager.paste(&fragment.tool, &fragment.event, replace)?;
        focus_end(manager, &id);
        Ok(id)
    }

    /// One block per file a tool accepts; unclaimed files are skipped.
    fn process_files(
        &self,
        manager: &mut BlockManager,
        files: &[PastedFile],
    ) -> Result<Vec<BlockId>> {
        let matched: Vec<(String, PasteEvent)> = files
            .iter()
            .filter_map(|file| match self.rules.tool_for_file(file) {
                Some(tool) => Some((tool.to_string(), PasteEvent::File { file: file.clone() })),
                None => {
                    tracing::debug!(
                        file = %file.name,
                        mime = %file.mime,
                        "no tool accepts pasted file"
                    );
                    None
                }
            })
            .collect();

        let replace_first = current_is_empty_default(manager);
        let mut ids = Vec::with_capacity(matched.len());
        for (i, (tool, event)) in matched.iter().enumerate() {
            ids.push(manager.paste(tool, event, i == 0 && replace_first)?);
        }
        Ok(ids)
    }

    /// Re-insert exported blocks verbatim after sanitizing their data.
    fn insert_internal(
        &self,
        manager: &mut BlockManager,
        blocks: Vec<InternalBlock>,
    ) -> Result<Vec<BlockId>> {
        let mut ids = Vec::with_capacity(blocks.len());
        for InternalBlock { tool, data } in blocks {
            if manager.registry().block_tool(&tool).is_none() {
                tracing::warn!(tool = %tool, "pasted block has no available tool, skipping");
                continue;
            }
            let config = manager.registry().sanitize_config_for(&tool);
            let data = sanitize_data(&data, manager.sanitizer().as_ref(), &config);
            let replace = ids.is_empty() && current_is_empty_default(manager);
            let id = manager.insert(
                InsertOptions::tool(tool)
                    .with_data(data)
                    .replacing(replace)
                    .focused(),
            )?;
            focus_end(manager, &id);
            ids.push(id);
        }
        Ok(ids)
    }
}

fn push_inline(pieces: &mut Vec<Piece>, node: HtmlNode) {
    if let Some(Piece::Fragment(nodes)) = pieces.last_mut() {
        nodes.push(node);
    } else {
        pieces.push(Piece::Fragment(vec![node]));
    }
}

fn current_is_empty_default(manager: &BlockManager) -> bool {
    manager
        .current_block()
        .is_some_and(|b| b.tool().is_default && b.is_empty())
}

fn focus_end(manager: &mut BlockManager, id: &BlockId) {
    if let Some(index) = manager.get_block_index(id) {
        if let Err(e) = manager.focus_block(index as isize, CaretPosition::End) {
            tracing::debug!(block = %id, error = %e, "could not focus pasted block");
        }
    }
}
