//! Tool registry.
//!
//! Preparation runs every tool's `prepare` hook concurrently. Each outcome is
//! isolated: a tool that errors, panics or answers `false` lands in the
//! unavailable set (blocks that reference it become stubs) and the rest carry
//! on. What remains is frozen into [`ToolDescriptor`]s, classified by shape,
//! with each block tool's enabled inline tools and tunes resolved.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use indexmap::IndexMap;

use super::builtin::{self, STUB_TOOL};
use super::{
    BlockCapabilities, BlockTool, BlockTune, PasteConfig, ToolKind, ToolPlugin, ToolboxEntry,
};
use crate::config::{EditorConfig, ToolFilter, ToolSettings};
use crate::conversion::ConversionConfig;
use crate::error::{EditorError, Result};
use crate::events::{EditorEvent, SharedEventBus};
use crate::sanitize::{SanitizeConfig, merge_configs};

/// A prepared tool. Immutable after preparation.
#[derive(Debug)]
pub struct ToolDescriptor {
    pub name: String,
    pub plugin: ToolPlugin,
    pub settings: ToolSettings,
    pub title: Option<String>,
    pub sanitize: SanitizeConfig,
    pub read_only_supported: bool,
    /// Shipped with the editor rather than configured.
    pub is_internal: bool,
    /// The configured default block tool.
    pub is_default: bool,
    /// Optional hooks (block tools only).
    pub capabilities: BlockCapabilities,
    pub paste: PasteConfig,
    pub conversion: ConversionConfig,
    pub toolbox: Vec<ToolboxEntry>,
    /// Enabled inline tools, in order (block tools only).
    pub inline_tools: Vec<String>,
    /// Enabled user tunes, in order (block tools only).
    pub tunes: Vec<String>,
}

impl ToolDescriptor {
    pub fn kind(&self) -> ToolKind {
        self.plugin.kind()
    }

    pub fn block_plugin(&self) -> Option<&Arc<dyn BlockTool>> {
        match &self.plugin {
            ToolPlugin::Block(t) => Some(t),
            _ => None,
        }
    }

    pub fn tune_plugin(&self) -> Option<&Arc<dyn BlockTune>> {
        match &self.plugin {
            ToolPlugin::Tune(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_stub(&self) -> bool {
        self.name == STUB_TOOL
    }

    /// Display title: configured, declared, or the name.
    pub fn display_title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.name.clone())
    }
}

/// A tool that failed preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnavailableTool {
    pub name: String,
    pub kind: ToolKind,
    pub reason: String,
}

/// Registry of prepared tools for one editor instance.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<ToolDescriptor>>,
    unavailable: IndexMap<String, UnavailableTool>,
    default_tool: String,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("available", &self.tools.keys().collect::<Vec<_>>())
            .field("unavailable", &self.unavailable.keys().collect::<Vec<_>>())
            .field("default_tool", &self.default_tool)
            .finish()
    }
}

impl ToolRegistry {
    /// Prepare the built-in tools plus `plugins` (a plugin named like a
    /// built-in replaces it).
    ///
    /// Fails only when the default block tool is not available afterwards.
    pub async fn prepare(
        plugins: impl IntoIterator<Item = (String, ToolPlugin)>,
        config: &EditorConfig,
        bus: Option<&SharedEventBus>,
    ) -> Result<Self> {
        let mut entries: IndexMap<String, ToolPlugin> =
            builtin::internal_tools().into_iter().collect();
        let mut internal: HashSet<String> = entries.keys().cloned().collect();
        for (name, plugin) in plugins {
            internal.remove(&name);
            entries.insert(name, plugin);
        }

        for name in config.tools.keys() {
            if !entries.contains_key(name) {
                tracing::warn!(tool = %name, "settings given for a tool that is not registered");
            }
        }

        let outcomes = join_all(entries.iter().map(|(name, plugin)| async move {
            let settings = config.tool_settings(name);
            let outcome = AssertUnwindSafe(plugin.prepare(name, &settings.config))
                .catch_unwind()
                .await;
            let outcome = match outcome {
                Ok(Ok(true)) => Ok(()),
                Ok(Ok(false)) => Err("prepare returned false".to_string()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("prepare panicked".to_string()),
            };
            (name.clone(), outcome)
        }))
        .await;

        let mut registry = ToolRegistry {
            default_tool: config.default_block.clone(),
            ..Default::default()
        };
        let mut prepared: IndexMap<String, ToolDescriptor> = IndexMap::new();

        for (name, outcome) in outcomes {
            let Some(plugin) = entries.get(&name) else {
                continue;
            };
            match outcome {
                Ok(()) => {
                    tracing::debug!(tool = %name, kind = %plugin.kind(), "tool prepared");
                    let settings = config.tool_settings(&name);
                    prepared.insert(
                        name.clone(),
                        describe(&name, plugin.clone(), settings, internal.contains(&name), config),
                    );
                }
                Err(reason) => {
                    tracing::warn!(tool = %name, reason = %reason, "tool preparation failed");
                    if let Some(bus) = bus {
                        bus.emit(EditorEvent::ToolPreparationFailed {
                            tool: name.clone(),
                            reason: reason.clone(),
                        });
                    }
                    registry.unavailable.insert(
                        name.clone(),
                        UnavailableTool {
                            name,
                            kind: plugin.kind(),
                            reason,
                        },
                    );
                }
            }
        }

        let inline_names: Vec<String> = prepared
            .values()
            .filter(|d| d.kind() == ToolKind::Inline)
            .map(|d| d.name.clone())
            .collect();
        let tune_names: Vec<String> = prepared
            .values()
            .filter(|d| d.kind() == ToolKind::Tune && !d.is_internal)
            .map(|d| d.name.clone())
            .collect();

        for descriptor in prepared.values_mut() {
            if descriptor.kind() != ToolKind::Block {
                continue;
            }
            let inline_filter = descriptor
                .settings
                .inline_toolbar
                .clone()
                .or_else(|| config.inline_toolbar.clone())
                .unwrap_or_default();
            let tune_filter = descriptor
                .settings
                .tunes
                .clone()
                .or_else(|| config.tunes.clone())
                .unwrap_or_default();
            descriptor.inline_tools = inline_filter.select(inline_names.iter().map(String::as_str));
            descriptor.tunes = tune_filter.select(tune_names.iter().map(String::as_str));
        }

        registry.tools = prepared
            .into_iter()
            .map(|(name, d)| (name, Arc::new(d)))
            .collect();

        match registry.tools.get(&registry.default_tool) {
            Some(d) if d.kind() == ToolKind::Block => {}
            _ => return Err(EditorError::ToolNotFound(registry.default_tool.clone())),
        }
        if registry.block_tool(STUB_TOOL).is_none() {
            return Err(EditorError::ToolNotFound(STUB_TOOL.to_string()));
        }

        tracing::info!(
            available = registry.tools.len(),
            unavailable = registry.unavailable.len(),
            default = %registry.default_tool,
            "tools prepared"
        );
        Ok(registry)
    }

    /// Any available tool.
    pub fn get(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.tools.get(name).cloned()
    }

    /// An available block tool.
    pub fn block_tool(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.tools
            .get(name)
            .filter(|d| d.kind() == ToolKind::Block)
            .cloned()
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_unavailable(&self, name: &str) -> bool {
        self.unavailable.contains_key(name)
    }

    pub fn unavailable(&self) -> impl Iterator<Item = &UnavailableTool> {
        self.unavailable.values()
    }

    /// Available tool names in registration order.
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    fn of_kind(&self, kind: ToolKind) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.tools.values().filter(move |d| d.kind() == kind)
    }

    pub fn block_tools(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.of_kind(ToolKind::Block)
    }

    pub fn inline_tools(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.of_kind(ToolKind::Inline)
    }

    /// User tunes (internal tunes excluded).
    pub fn block_tunes(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.of_kind(ToolKind::Tune).filter(|d| !d.is_internal)
    }

    /// Tunes attached to every block.
    pub fn internal_tunes(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.of_kind(ToolKind::Tune).filter(|d| d.is_internal)
    }

    pub fn default_tool_name(&self) -> &str {
        &self.default_tool
    }

    /// The default block tool. Present by construction.
    pub fn default_tool(&self) -> Option<Arc<ToolDescriptor>> {
        self.block_tool(&self.default_tool)
    }

    pub fn stub_tool(&self) -> Option<Arc<ToolDescriptor>> {
        self.block_tool(STUB_TOOL)
    }

    /// Every inline tool's sanitize rules; later tools win.
    pub fn all_inline_sanitize_config(&self) -> SanitizeConfig {
        let configs: Vec<&SanitizeConfig> = self.inline_tools().map(|d| &d.sanitize).collect();
        merge_configs(configs)
    }

    /// A block tool's own rules plus those of its enabled inline tools.
    pub fn sanitize_config_for(&self, name: &str) -> SanitizeConfig {
        let Some(tool) = self.block_tool(name) else {
            return SanitizeConfig::new();
        };
        let inline: Vec<Arc<ToolDescriptor>> =
            tool.inline_tools.iter().filter_map(|n| self.get(n)).collect();
        merge_configs(std::iter::once(&tool.sanitize).chain(inline.iter().map(|d| &d.sanitize)))
    }

    /// Whether content for this tool must fall back to the default tool.
    pub fn is_paste_exception(&self, name: &str) -> bool {
        self.block_tool(name)
            .is_some_and(|d| matches!(d.paste, PasteConfig::Disabled))
    }

    /// Available block tools that cannot run read-only.
    pub fn tools_without_read_only_support(&self) -> Vec<String> {
        self.block_tools()
            .filter(|d| !d.read_only_supported)
            .map(|d| d.name.clone())
            .collect()
    }

    /// Call every tool's `reset` hook.
    pub async fn destroy(&self) {
        join_all(self.tools.values().map(|d| d.plugin.reset())).await;
        tracing::debug!("tools reset");
    }
}

fn describe(
    name: &str,
    plugin: ToolPlugin,
    settings: ToolSettings,
    is_internal: bool,
    config: &EditorConfig,
) -> ToolDescriptor {
    let (capabilities, paste, conversion, toolbox) = match &plugin {
        ToolPlugin::Block(tool) => {
            let paste = if settings.paste {
                tool.paste_config()
            } else {
                PasteConfig::Disabled
            };
            let toolbox = settings.toolbox.clone().unwrap_or_else(|| tool.toolbox());
            (tool.capabilities(), paste, tool.conversion_config(), toolbox)
        }
        _ => (
            BlockCapabilities::default(),
            PasteConfig::None,
            ConversionConfig::default(),
            Vec::new(),
        ),
    };

    ToolDescriptor {
        name: name.to_string(),
        title: plugin.title(),
        sanitize: plugin.sanitize(),
        read_only_supported: plugin.is_read_only_supported(),
        is_internal,
        is_default: name == config.default_block,
        capabilities,
        paste,
        conversion,
        toolbox,
        inline_tools: Vec::new(),
        tunes: Vec::new(),
        settings,
        plugin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EditorEvent, EventBus};
    use crate::testing::{EchoTool, FailingTool, NamedTune, PanickingTool};
    use parking_lot::Mutex;

    fn plugins(list: Vec<(&str, ToolPlugin)>) -> Vec<(String, ToolPlugin)> {
        list.into_iter().map(|(n, p)| (n.to_string(), p)).collect()
    }

    #[tokio::test]
    async fn test_builtins_only() {
        let registry = ToolRegistry::prepare(Vec::new(), &EditorConfig::default(), None)
            .await
            .unwrap();
        assert_eq!(registry.default_tool_name(), "paragraph");
        assert!(registry.default_tool().is_some());
        assert!(registry.stub_tool().is_some());
        assert_eq!(registry.inline_tools().count(), 3);
        assert_eq!(registry.internal_tunes().count(), 3);
        assert_eq!(registry.block_tunes().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_preparation_isolated() {
        let bus = Arc::new(EventBus::new());
        let failures = Arc::new(Mutex::new(Vec::new()));
        let seen = failures.clone();
        bus.on("tools.prepare_failed", move |event| {
            if let EditorEvent::ToolPreparationFailed { tool, .. } = event {
                seen.lock().push(tool.clone());
            }
        });

        let registry = ToolRegistry::prepare(
            plugins(vec![
                ("broken", ToolPlugin::block(FailingTool::errors())),
                ("declined", ToolPlugin::block(FailingTool::declines())),
                ("panics", ToolPlugin::block(PanickingTool)),
                ("echo", ToolPlugin::block(EchoTool::new())),
            ]),
            &EditorConfig::default(),
            Some(&bus),
        )
        .await
        .unwrap();

        assert!(registry.is_available("echo"));
        for name in ["broken", "declined", "panics"] {
            assert!(registry.is_unavailable(name), "{name} should be unavailable");
            assert!(registry.block_tool(name).is_none());
        }
        let mut failed = failures.lock().clone();
        failed.sort();
        assert_eq!(failed, vec!["broken", "declined", "panics"]);
    }

    #[tokio::test]
    async fn test_missing_default_tool_is_fatal() {
        let config = EditorConfig::default().with_default_block("nope");
        let err = ToolRegistry::prepare(Vec::new(), &config, None)
            .await
            .unwrap_err();
        assert_eq!(err, EditorError::ToolNotFound("nope".into()));
    }

    #[tokio::test]
    async fn test_enabled_inline_tools_and_tunes() {
        let config = EditorConfig::default()
            .with_inline_toolbar(ToolFilter::allow(["link", "bold"]))
            .with_tool(
                "echo",
                ToolSettings::default()
                    .with_tunes(ToolFilter::allow(["anchor"]))
                    .with_inline_toolbar(ToolFilter::Disabled),
            );
        let registry = ToolRegistry::prepare(
            plugins(vec![
                ("echo", ToolPlugin::block(EchoTool::new())),
                ("anchor", ToolPlugin::tune(NamedTune::new("anchor"))),
                ("align", ToolPlugin::tune(NamedTune::new("align"))),
            ]),
            &config,
            None,
        )
        .await
        .unwrap();

        let echo = registry.block_tool("echo").unwrap();
        assert!(echo.inline_tools.is_empty());
        assert_eq!(echo.tunes, vec!["anchor"]);

        let paragraph = registry.block_tool("paragraph").unwrap();
        assert_eq!(paragraph.inline_tools, vec!["link", "bold"]);
        assert_eq!(paragraph.tunes, vec!["anchor", "align"]);
    }

    #[tokio::test]
    async fn test_inline_sanitize_merge() {
        let registry = ToolRegistry::prepare(Vec::new(), &EditorConfig::default(), None)
            .await
            .unwrap();
        let merged = registry.all_inline_sanitize_config();
        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["b", "i", "a"]);

        let paragraph = registry.sanitize_config_for("paragraph");
        assert!(paragraph.contains_key("br"));
        assert!(paragraph.contains_key("a"));
    }

    #[tokio::test]
    async fn test_user_tool_replaces_builtin() {
        let registry = ToolRegistry::prepare(
            plugins(vec![("paragraph", ToolPlugin::block(EchoTool::new()))]),
            &EditorConfig::default(),
            None,
        )
        .await
        .unwrap();
        let paragraph = registry.block_tool("paragraph").unwrap();
        assert!(!paragraph.is_internal);
        assert!(paragraph.is_default);
    }

    #[tokio::test]
    async fn test_paste_exception_and_read_only_support() {
        let config =
            EditorConfig::default().with_tool("echo", ToolSettings::default().without_paste());
        let registry = ToolRegistry::prepare(
            plugins(vec![
                ("echo", ToolPlugin::block(EchoTool::new())),
                ("rw", ToolPlugin::block(EchoTool::new().without_read_only())),
            ]),
            &config,
            None,
        )
        .await
        .unwrap();
        assert!(registry.is_paste_exception("echo"));
        assert!(!registry.is_paste_exception("paragraph"));
        assert_eq!(registry.tools_without_read_only_support(), vec!["rw"]);
    }
}
