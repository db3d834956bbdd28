//! Paste rule tables collected from the block tools.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::html::Element;
use crate::sanitize::{AttributeRule, SanitizeConfig, TagRule};
use crate::tools::{FilePasteRule, PasteConfig, PastedFile, PatternRule, TagPasteRule, ToolRegistry};

static MIME_TYPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[-\w]+/([-+\w]+|\*)$").ok());

fn is_valid_mime(mime: &str) -> bool {
    MIME_TYPE.as_ref().is_some_and(|re| re.is_match(mime))
}

/// Which tool claims which pasted content.
#[derive(Debug, Default, Clone)]
pub struct PasteRules {
    tags: Vec<(TagPasteRule, String)>,
    patterns: Vec<(PatternRule, String)>,
    files: IndexMap<String, FilePasteRule>,
    exceptions: Vec<String>,
}

impl PasteRules {
    /// Walk every available block tool in registration order.
    ///
    /// A `(tag, class)` pair keeps its first claimant. File rules with a
    /// malformed mime type lose that entry.
    pub fn collect(registry: &ToolRegistry) -> Self {
        let mut rules = Self::default();
        for tool in registry.block_tools() {
            match &tool.paste {
                PasteConfig::Disabled => rules.exceptions.push(tool.name.clone()),
                PasteConfig::None => {}
                PasteConfig::Rules {
                    tags,
                    patterns,
                    files,
                } => {
                    for tag in tags {
                        rules.claim_tag(tag, &tool.name);
                    }
                    for pattern in patterns {
                        rules.patterns.push((pattern.clone(), tool.name.clone()));
                    }
                    if let Some(files) = files {
                        rules.add_files(files, &tool.name);
                    }
                }
            }
        }
        tracing::debug!(
            tags = rules.tags.len(),
            patterns = rules.patterns.len(),
            file_tools = rules.files.len(),
            exceptions = rules.exceptions.len(),
            "paste rules collected"
        );
        rules
    }

    fn claim_tag(&mut self, rule: &TagPasteRule, tool: &str) {
        let claimed = self
            .tags
            .iter()
            .find(|(r, _)| r.tag == rule.tag && r.class == rule.class);
        if let Some((_, owner)) = claimed {
            tracing::warn!(
                tag = %rule.tag,
                class = ?rule.class,
                tool,
                owner = %owner,
                "paste tag already claimed, skipping"
            );
            return;
        }
        self.tags.push((rule.clone(), tool.to_string()));
    }

    fn add_files(&mut self, files: &FilePasteRule, tool: &str) {
        let mut mime_types = Vec::new();
        for mime in &files.mime_types {
            if is_valid_mime(mime) {
                mime_types.push(mime.clone());
            } else {
                tracing::warn!(tool, mime = %mime, "invalid mime type in paste config, skipping");
            }
        }
        let extensions: Vec<String> = files
            .extensions
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();
        if mime_types.is_empty() && extensions.is_empty() {
            return;
        }
        self.files.insert(
            tool.to_string(),
            FilePasteRule {
                mime_types,
                extensions,
            },
        );
    }

    /// Tools whose paste handling is disabled.
    pub fn exceptions(&self) -> &[String] {
        &self.exceptions
    }

    pub fn is_exception(&self, tool: &str) -> bool {
        self.exceptions.iter().any(|t| t == tool)
    }

    pub fn has_file_rules(&self) -> bool {
        !self.files.is_empty()
    }

    /// The tool claiming `element`. Class-scoped rules are checked first.
    pub fn tool_for_element(&self, element: &Element) -> Option<&str> {
        self.tags
            .iter()
            .filter(|(r, _)| r.class.is_some())
            .chain(self.tags.iter().filter(|(r, _)| r.class.is_none()))
            .find(|(r, _)| r.matches(element))
            .map(|(_, tool)| tool.as_str())
    }

    /// Tag rules owned by `tool`.
    pub fn tags_of<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = &'a TagPasteRule> {
        self.tags
            .iter()
            .filter(move |(_, t)| t == tool)
            .map(|(r, _)| r)
    }

    /// First pattern, in registration order, matching the whole text.
    pub fn match_pattern(&self, text: &str) -> Option<(&str, &str)> {
        self.patterns
            .iter()
            .find(|(rule, _)| rule.matches_fully(text))
            .map(|(rule, tool)| (tool.as_str(), rule.key.as_str()))
    }

    /// First tool accepting `file` by extension or mime type.
    pub fn tool_for_file(&self, file: &PastedFile) -> Option<&str> {
        let extension = file.extension();
        let (file_type, file_subtype) = file.mime.split_once('/').unwrap_or((&file.mime, ""));
        self.files
            .iter()
            .find(|(_, rule)| {
                let by_extension = !extension.is_empty() && rule.extensions.contains(&extension);
                let by_mime = rule.mime_types.iter().any(|mime| {
                    let (t, sub) = mime.split_once('/').unwrap_or((mime, ""));
                    t == file_type && (sub == file_subtype || sub == "*")
                });
                by_extension || by_mime
            })
            .map(|(tool, _)| tool.as_str())
    }

    /// Rules keeping every claimed tag through the first clean. A tag
    /// claimed with and without a class keeps its class.
    pub fn tags_sanitize_config(&self) -> SanitizeConfig {
        let mut config = SanitizeConfig::new();
        for (rule, _) in &self.tags {
            if rule.class.is_some() || !config.contains_key(&rule.tag) {
                config.insert(rule.tag.clone(), tag_rule(rule));
            }
        }
        config
    }

    /// Rules keeping the tags claimed by `tool`.
    pub fn tool_tags_sanitize_config(&self, tool: &str) -> SanitizeConfig {
        self.tags_of(tool)
            .map(|rule| (rule.tag.clone(), tag_rule(rule)))
            .collect()
    }
}

/// A claimed tag keeps its declared rule; a class-scoped tag keeps its class.
fn tag_rule(rule: &TagPasteRule) -> TagRule {
    let base = rule.sanitize.clone().unwrap_or_default();
    if rule.class.is_none() {
        return base;
    }
    match base {
        TagRule::Keep(false) => TagRule::Keep(false),
        TagRule::Keep(true) => TagRule::Attributes(
            [("class".to_string(), AttributeRule::Keep(true))]
                .into_iter()
                .collect(),
        ),
        TagRule::Attributes(mut attrs) => {
            attrs.insert("class".to_string(), AttributeRule::Keep(true));
            TagRule::Attributes(attrs)
        }
    }
}
