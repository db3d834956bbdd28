//! Presentation-surface collaborators.
//!
//! The core never paints anything. It talks to the presentation layer through
//! two narrow traits: [`Surface`] for the node tree that tools render into,
//! and [`Caret`] for caret placement and extraction. [`MemorySurface`]
//! implements both in memory and backs the CLI and the tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use blocksmith_types::NodeId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One raw change record from the presentation watcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub target: NodeId,
    #[serde(default)]
    pub added_nodes: Vec<NodeId>,
    #[serde(default)]
    pub removed_nodes: Vec<NodeId>,
    #[serde(default)]
    pub attribute_name: Option<String>,
}

impl RawRecord {
    /// A character-data or attribute change on `target`.
    pub fn touched(target: NodeId) -> Self {
        Self {
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: None,
        }
    }

    /// Whether nodes were added or removed (the block's inputs may have changed).
    pub fn is_structural(&self) -> bool {
        !self.added_nodes.is_empty() || !self.removed_nodes.is_empty()
    }
}

/// A notification from the presentation watcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RawChange {
    Records(Vec<RawRecord>),
    /// The watcher saw something it could not describe.
    Unknown,
}

/// Presentation hints toggled by block state flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hint {
    Selected,
    Stretched,
    DropTarget,
    ReadOnly,
}

/// Where to put the caret inside a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaretPosition {
    #[default]
    Start,
    End,
    Default,
}

/// Node tree the tools render into.
pub trait Surface: Send + Sync {
    /// Create a block holder attached to the document root.
    fn create_holder(&self) -> NodeId;

    /// Create an element under `parent`.
    fn create_element(&self, parent: NodeId, tag: &str, focusable: bool) -> NodeId;

    /// Detach and drop a node and its subtree.
    fn remove(&self, node: NodeId);

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Focusable descendants of `root` in document order.
    fn focusable_inputs(&self, root: NodeId) -> Vec<NodeId>;

    fn inner_html(&self, node: NodeId) -> String;

    fn set_inner_html(&self, node: NodeId, html: &str);

    /// Text with markup stripped and entities decoded.
    fn text_content(&self, node: NodeId) -> String;

    /// Whether the subtree holds media (images, video, embeds).
    fn has_media(&self, node: NodeId) -> bool;

    fn set_hint(&self, node: NodeId, hint: Hint, enabled: bool);

    /// Attach keyboard/drag bindings for a block holder.
    fn bind_interactions(&self, holder: NodeId);

    fn unbind_interactions(&self, holder: NodeId);
}

/// Caret collaborator.
pub trait Caret: Send + Sync {
    /// Node currently holding the caret.
    fn focused(&self) -> Option<NodeId>;

    /// Remove and return the markup after the caret in the focused input.
    fn extract_fragment_after_caret(&self) -> String;

    /// Insert markup at the caret.
    fn insert_html_at_caret(&self, html: &str);

    /// Place the caret in `input` at `position`.
    fn set_to_input(&self, input: NodeId, position: CaretPosition);
}

pub type SharedSurface = Arc<dyn Surface>;
pub type SharedCaret = Arc<dyn Caret>;

// ============================================================================
// In-memory surface
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    tag: String,
    focusable: bool,
    html: String,
    hints: HashSet<Hint>,
    bindings: usize,
}

impl MemoryNode {
    fn new(parent: Option<NodeId>, tag: &str, focusable: bool) -> Self {
        Self {
            parent,
            children: Vec::new(),
            tag: tag.to_string(),
            focusable,
            html: String::new(),
            hints: HashSet::new(),
            bindings: 0,
        }
    }
}

#[derive(Debug)]
struct MemoryState {
    next_id: u64,
    nodes: HashMap<NodeId, MemoryNode>,
    /// Focused node and caret offset (in chars of its markup).
    caret: Option<(NodeId, usize)>,
}

/// In-memory node tree implementing [`Surface`] and [`Caret`].
#[derive(Debug)]
pub struct MemorySurface {
    root: NodeId,
    state: RwLock<MemoryState>,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

const MEDIA_TAGS: &[&str] = &["img", "video", "audio", "iframe", "embed", "object", "canvas"];

impl MemorySurface {
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(root, MemoryNode::new(None, "div", false));
        Self {
            root,
            state: RwLock::new(MemoryState {
                next_id: 1,
                nodes,
                caret: None,
            }),
        }
    }

    /// The document root every holder hangs from.
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn alloc(&self, parent: NodeId, tag: &str, focusable: bool) -> NodeId {
        let mut state = self.state.write();
        let id = NodeId(state.next_id);
        state.next_id += 1;
        state.nodes.insert(id, MemoryNode::new(Some(parent), tag, focusable));
        if let Some(p) = state.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        id
    }

    /// Create a node outside any block (e.g. a toolbar), for attribution tests.
    pub fn create_detached(&self, tag: &str) -> NodeId {
        self.alloc(self.root, tag, false)
    }

    pub fn has_hint(&self, node: NodeId, hint: Hint) -> bool {
        self.state
            .read()
            .nodes
            .get(&node)
            .is_some_and(|n| n.hints.contains(&hint))
    }

    /// Active interaction bindings on a holder.
    pub fn binding_count(&self, holder: NodeId) -> usize {
        self.state
            .read()
            .nodes
            .get(&holder)
            .map(|n| n.bindings)
            .unwrap_or(0)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.state.read().nodes.contains_key(&node)
    }

    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Put the caret at a char offset inside a node's markup.
    pub fn set_caret(&self, node: NodeId, offset: usize) {
        self.state.write().caret = Some((node, offset));
    }

    pub fn caret(&self) -> Option<(NodeId, usize)> {
        self.state.read().caret
    }

    fn collect_subtree(nodes: &HashMap<NodeId, MemoryNode>, root: NodeId, out: &mut Vec<NodeId>) {
        if let Some(node) = nodes.get(&root) {
            for child in &node.children {
                out.push(*child);
                Self::collect_subtree(nodes, *child, out);
            }
        }
    }
}

impl Surface for MemorySurface {
    fn create_holder(&self) -> NodeId {
        self.alloc(self.root, "div", false)
    }

    fn create_element(&self, parent: NodeId, tag: &str, focusable: bool) -> NodeId {
        self.alloc(parent, tag, focusable)
    }

    fn remove(&self, node: NodeId) {
        let mut state = self.state.write();
        let mut doomed = vec![node];
        Self::collect_subtree(&state.nodes, node, &mut doomed);
        if let Some(parent) = state.nodes.get(&node).and_then(|n| n.parent) {
            if let Some(p) = state.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != node);
            }
        }
        for id in &doomed {
            state.nodes.remove(id);
        }
        if state.caret.is_some_and(|(n, _)| doomed.contains(&n)) {
            state.caret = None;
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.read().nodes.get(&node).and_then(|n| n.parent)
    }

    fn focusable_inputs(&self, root: NodeId) -> Vec<NodeId> {
        let state = self.state.read();
        let mut all = Vec::new();
        Self::collect_subtree(&state.nodes, root, &mut all);
        all.into_iter()
            .filter(|id| state.nodes.get(id).is_some_and(|n| n.focusable))
            .collect()
    }

    fn inner_html(&self, node: NodeId) -> String {
        self.state
            .read()
            .nodes
            .get(&node)
            .map(|n| n.html.clone())
            .unwrap_or_default()
    }

    fn set_inner_html(&self, node: NodeId, html: &str) {
        if let Some(n) = self.state.write().nodes.get_mut(&node) {
            n.html = html.to_string();
        }
    }

    fn text_content(&self, node: NodeId) -> String {
        let state = self.state.read();
        let mut ids = vec![node];
        Self::collect_subtree(&state.nodes, node, &mut ids);
        ids.iter()
            .filter_map(|id| state.nodes.get(id))
            .map(|n| strip_markup(&n.html))
            .collect()
    }

    fn has_media(&self, node: NodeId) -> bool {
        let state = self.state.read();
        let mut ids = vec![node];
        Self::collect_subtree(&state.nodes, node, &mut ids);
        ids.iter().filter_map(|id| state.nodes.get(id)).any(|n| {
            MEDIA_TAGS.contains(&n.tag.as_str())
                || MEDIA_TAGS
                    .iter()
                    .any(|tag| n.html.to_ascii_lowercase().contains(&format!("<{tag}")))
        })
    }

    fn set_hint(&self, node: NodeId, hint: Hint, enabled: bool) {
        if let Some(n) = self.state.write().nodes.get_mut(&node) {
            if enabled {
                n.hints.insert(hint);
            } else {
                n.hints.remove(&hint);
            }
        }
    }

    fn bind_interactions(&self, holder: NodeId) {
        if let Some(n) = self.state.write().nodes.get_mut(&holder) {
            n.bindings += 1;
        }
    }

    fn unbind_interactions(&self, holder: NodeId) {
        if let Some(n) = self.state.write().nodes.get_mut(&holder) {
            n.bindings = n.bindings.saturating_sub(1);
        }
    }
}

impl Caret for MemorySurface {
    fn focused(&self) -> Option<NodeId> {
        self.state.read().caret.map(|(node, _)| node)
    }

    fn extract_fragment_after_caret(&self) -> String {
        let mut state = self.state.write();
        let Some((node, offset)) = state.caret else {
            return String::new();
        };
        let Some(n) = state.nodes.get_mut(&node) else {
            return String::new();
        };
        let split = char_to_byte(&n.html, offset);
        n.html.split_off(split)
    }

    fn insert_html_at_caret(&self, html: &str) {
        let mut state = self.state.write();
        let Some((node, offset)) = state.caret else {
            return;
        };
        let inserted = match state.nodes.get_mut(&node) {
            Some(n) => {
                let at = char_to_byte(&n.html, offset);
                n.html.insert_str(at, html);
                true
            }
            None => false,
        };
        if inserted {
            state.caret = Some((node, offset + html.chars().count()));
        }
    }

    fn set_to_input(&self, input: NodeId, position: CaretPosition) {
        let mut state = self.state.write();
        let len = state
            .nodes
            .get(&input)
            .map(|n| n.html.chars().count())
            .unwrap_or(0);
        let offset = match position {
            CaretPosition::Start | CaretPosition::Default => 0,
            CaretPosition::End => len,
        };
        state.caret = Some((input, offset));
    }
}

fn char_to_byte(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

/// Strip tags and decode entities.
pub fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    html_escape::decode_html_entities(&out).into_owned()
}
