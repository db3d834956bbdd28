//! Sanitize rule sets and the `clean(html, config)` collaborator.
//!
//! A rule set maps lowercase tag names to a rule: `true` keeps the tag without
//! attributes, `false` (or absence) unwraps it keeping its text, and a map
//! keeps the tag with the listed attributes (`true` keeps the value, a string
//! forces it).

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::html::{self, Element, HtmlNode};

/// Per-attribute rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeRule {
    Keep(bool),
    Force(String),
}

/// Per-tag rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagRule {
    Keep(bool),
    Attributes(IndexMap<String, AttributeRule>),
}

impl Default for TagRule {
    fn default() -> Self {
        TagRule::Keep(true)
    }
}

/// Tag name -> rule. Order is the declaration order.
pub type SanitizeConfig = IndexMap<String, TagRule>;

/// Merge rule sets; later sets win on conflicting tags.
pub fn merge_configs<'a>(configs: impl IntoIterator<Item = &'a SanitizeConfig>) -> SanitizeConfig {
    let mut merged = SanitizeConfig::new();
    for config in configs {
        for (tag, rule) in config {
            merged.insert(tag.to_ascii_lowercase(), rule.clone());
        }
    }
    merged
}

/// Markup cleaner consumed by the core as a pure function.
pub trait Sanitizer: Send + Sync {
    fn clean(&self, html: &str, config: &SanitizeConfig) -> String;
}

/// Clean every string in a block payload, recursing into arrays and objects.
pub fn sanitize_data(
    data: &serde_json::Map<String, serde_json::Value>,
    sanitizer: &dyn Sanitizer,
    config: &SanitizeConfig,
) -> serde_json::Map<String, serde_json::Value> {
    fn clean_value(
        value: &serde_json::Value,
        sanitizer: &dyn Sanitizer,
        config: &SanitizeConfig,
    ) -> serde_json::Value {
        use serde_json::Value;
        match value {
            Value::String(s) => Value::String(sanitizer.clean(s, config)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| clean_value(v, sanitizer, config))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(sanitize_data(map, sanitizer, config)),
            other => other.clone(),
        }
    }

    data.iter()
        .map(|(k, v)| (k.clone(), clean_value(v, sanitizer, config)))
        .collect()
}

pub type SharedSanitizer = Arc<dyn Sanitizer>;

/// Whitelist cleaner over the fragment tree.
///
/// Tags without a keeping rule are unwrapped; `script`, `style` and
/// `template` are removed with their content.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagSanitizer;

const DROP_WITH_CONTENT: &[&str] = &["script", "style", "template"];

impl TagSanitizer {
    fn clean_nodes(nodes: Vec<HtmlNode>, config: &SanitizeConfig) -> Vec<HtmlNode> {
        let mut out = Vec::new();
        for node in nodes {
            match node {
                HtmlNode::Text(_) => out.push(node),
                HtmlNode::Element(e) => {
                    if DROP_WITH_CONTENT.contains(&e.tag.as_str()) {
                        continue;
                    }
                    let children = Self::clean_nodes(e.children, config);
                    match config.get(&e.tag) {
                        Some(TagRule::Keep(true)) => out.push(HtmlNode::Element(Element {
                            tag: e.tag,
                            attrs: Vec::new(),
                            children,
                        })),
                        Some(TagRule::Attributes(rules)) => {
                            let mut attrs = Vec::new();
                            for (name, rule) in rules {
                                match rule {
                                    AttributeRule::Keep(true) => {
                                        if let Some((_, v)) =
                                            e.attrs.iter().find(|(k, _)| k == name)
                                        {
                                            attrs.push((name.clone(), v.clone()));
                                        }
                                    }
                                    AttributeRule::Keep(false) => {}
                                    AttributeRule::Force(value) => {
                                        attrs.push((name.clone(), value.clone()))
                                    }
                                }
                            }
                            out.push(HtmlNode::Element(Element {
                                tag: e.tag,
                                attrs,
                                children,
                            }));
                        }
                        _ => out.extend(children),
                    }
                }
            }
        }
        out
    }
}

impl Sanitizer for TagSanitizer {
    fn clean(&self, markup: &str, config: &SanitizeConfig) -> String {
        let nodes = html::parse_fragment(markup);
        html::render(&Self::clean_nodes(nodes, config))
    }
}
