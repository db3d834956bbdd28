//! Editor configuration.
//!
//! Plugins are code and are handed to the editor directly; everything else
//! (per-tool settings, allow-lists, the default block, timings, initial data)
//! is plain data loadable from TOML:
//!
//! ```toml
//! default_block = "paragraph"
//! batch_time_ms = 400
//! read_only = false
//! inline_toolbar = { type = "allow_list", tools = ["bold", "link"] }
//!
//! [tools.header]
//! config = { levels = [2, 3] }
//! tunes = { type = "allow_list", tools = ["anchor"] }
//!
//! [tools.image]
//! paste = false
//! ```

use std::path::Path;
use std::time::Duration;

use blocksmith_types::OutputData;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{EditorError, Result};
use crate::tools::ToolboxEntry;

/// Default quiet window for the mutation observer.
pub const DEFAULT_BATCH_TIME_MS: u64 = 400;

/// Default block tool.
pub const DEFAULT_BLOCK: &str = "paragraph";

/// Filter for which inline tools or tunes a block tool enables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "tools", rename_all = "snake_case")]
pub enum ToolFilter {
    /// Every available tool of the kind.
    #[default]
    All,

    /// Only these, in this order.
    AllowList(Vec<String>),

    /// Everything except these.
    DenyList(Vec<String>),

    /// Nothing.
    Disabled,
}

impl ToolFilter {
    /// Create an allow list filter.
    pub fn allow<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowList(tools.into_iter().map(Into::into).collect())
    }

    /// Create a deny list filter.
    pub fn deny<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::DenyList(tools.into_iter().map(Into::into).collect())
    }

    /// Check if a tool is allowed by this filter.
    pub fn allows(&self, tool_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::AllowList(allowed) => allowed.iter().any(|t| t == tool_name),
            Self::DenyList(denied) => !denied.iter().any(|t| t == tool_name),
            Self::Disabled => false,
        }
    }

    /// Select from `available` (in registry order), honoring allow-list order.
    pub fn select<'a>(&self, available: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let available: Vec<&str> = available.into_iter().collect();
        match self {
            Self::AllowList(allowed) => allowed
                .iter()
                .filter(|name| available.contains(&name.as_str()))
                .cloned()
                .collect(),
            _ => available
                .into_iter()
                .filter(|name| self.allows(name))
                .map(str::to_string)
                .collect(),
        }
    }
}

/// User settings for one tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSettings {
    /// Opaque config handed to the tool's prepare and render hooks.
    #[serde(default)]
    pub config: serde_json::Value,

    /// Inline tools enabled inside this block tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_toolbar: Option<ToolFilter>,

    /// Tunes attached to blocks of this tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunes: Option<ToolFilter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,

    /// Replaces the tool's own toolbox entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolbox: Option<Vec<ToolboxEntry>>,

    /// `false` puts the tool on the paste exception list.
    #[serde(default = "default_true")]
    pub paste: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            config: serde_json::Value::Null,
            inline_toolbar: None,
            tunes: None,
            shortcut: None,
            toolbox: None,
            paste: true,
        }
    }
}

impl ToolSettings {
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_inline_toolbar(mut self, filter: ToolFilter) -> Self {
        self.inline_toolbar = Some(filter);
        self
    }

    pub fn with_tunes(mut self, filter: ToolFilter) -> Self {
        self.tunes = Some(filter);
        self
    }

    pub fn without_paste(mut self) -> Self {
        self.paste = false;
        self
    }
}

/// Editor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EditorConfig {
    /// Tool used for new empty blocks and unmatched paste content.
    #[serde(default = "default_block")]
    pub default_block: String,

    #[serde(default)]
    pub read_only: bool,

    /// Quiet window before batched change events are flushed.
    #[serde(default = "default_batch_time_ms")]
    pub batch_time_ms: u64,

    /// Global inline tool filter for tools without their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_toolbar: Option<ToolFilter>,

    /// Global tune filter for tools without their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunes: Option<ToolFilter>,

    /// Per-tool settings, in configured order.
    #[serde(default)]
    pub tools: IndexMap<String, ToolSettings>,

    /// Document to render on startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<OutputData>,
}

fn default_block() -> String {
    DEFAULT_BLOCK.to_string()
}

fn default_batch_time_ms() -> u64 {
    DEFAULT_BATCH_TIME_MS
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_block: default_block(),
            read_only: false,
            batch_time_ms: DEFAULT_BATCH_TIME_MS,
            inline_toolbar: None,
            tunes: None,
            tools: IndexMap::new(),
            data: None,
        }
    }
}

impl EditorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| EditorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EditorError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_block.trim().is_empty() {
            return Err(EditorError::Config("default_block must not be empty".into()));
        }
        if self.batch_time_ms == 0 {
            return Err(EditorError::Config("batch_time_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn batch_time(&self) -> Duration {
        Duration::from_millis(self.batch_time_ms)
    }

    /// Settings for a tool, or defaults.
    pub fn tool_settings(&self, name: &str) -> ToolSettings {
        self.tools.get(name).cloned().unwrap_or_default()
    }

    pub fn with_default_block(mut self, name: impl Into<String>) -> Self {
        self.default_block = name.into();
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_batch_time(mut self, batch_time: Duration) -> Self {
        self.batch_time_ms = batch_time.as_millis() as u64;
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>, settings: ToolSettings) -> Self {
        self.tools.insert(name.into(), settings);
        self
    }

    pub fn with_data(mut self, data: OutputData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_tunes(mut self, filter: ToolFilter) -> Self {
        self.tunes = Some(filter);
        self
    }

    pub fn with_inline_toolbar(mut self, filter: ToolFilter) -> Self {
        self.inline_toolbar = Some(filter);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.default_block, "paragraph");
        assert_eq!(config.batch_time(), Duration::from_millis(400));
        assert!(config.tool_settings("anything").paste);
    }

    #[test]
    fn test_parse_toml() {
        let config = EditorConfig::from_toml_str(
            r#"
            default_block = "text"
            batch_time_ms = 250
            inline_toolbar = { type = "allow_list", tools = ["bold", "link"] }

            [tools.header]
            config = { levels = [2, 3] }
            tunes = { type = "deny_list", tools = ["anchor"] }

            [tools.image]
            paste = false
            "#,
        )
        .unwrap();

        assert_eq!(config.default_block, "text");
        assert_eq!(config.batch_time_ms, 250);
        assert_eq!(
            config.inline_toolbar,
            Some(ToolFilter::allow(["bold", "link"]))
        );
        let header = config.tool_settings("header");
        assert_eq!(header.config["levels"], serde_json::json!([2, 3]));
        assert_eq!(header.tunes, Some(ToolFilter::deny(["anchor"])));
        assert!(!config.tool_settings("image").paste);
        assert_eq!(config.tools.keys().collect::<Vec<_>>(), vec!["header", "image"]);
    }

    #[test]
    fn test_validation() {
        assert!(EditorConfig::from_toml_str("default_block = \"\"").is_err());
        assert!(EditorConfig::from_toml_str("batch_time_ms = 0").is_err());
        assert!(EditorConfig::from_toml_str("batch_time_ms = \"x\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "read_only = true").unwrap();
        let config = EditorConfig::load(file.path()).unwrap();
        assert!(config.read_only);
    }

    #[test]
    fn test_filter_select_keeps_allow_list_order() {
        let available = ["bold", "italic", "link"];
        assert_eq!(
            ToolFilter::allow(["link", "missing", "bold"]).select(available),
            vec!["link", "bold"]
        );
        assert_eq!(
            ToolFilter::deny(["italic"]).select(available),
            vec!["bold", "link"]
        );
        assert!(ToolFilter::Disabled.select(available).is_empty());
        assert_eq!(ToolFilter::All.select(available).len(), 3);
    }
}
