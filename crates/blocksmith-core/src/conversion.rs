//! Block conversion rules.
//!
//! Converting a block between tools goes through a bridge value: the source
//! tool exports its saved data to a [`ConversionValue`], the bridge is
//! sanitized against the target tool, and the target tool imports it as its
//! initial data.

use std::sync::Arc;

use blocksmith_types::BlockData;
use serde_json::Value;

use crate::sanitize::{SanitizeConfig, Sanitizer};

/// The canonical bridge between two tools.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionValue {
    Text(String),
    Record(BlockData),
}

impl ConversionValue {
    /// Flatten to text: records join their string fields with a space.
    pub fn as_text(&self) -> String {
        match self {
            ConversionValue::Text(s) => s.clone(),
            ConversionValue::Record(map) => map
                .values()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Clean every string in the bridge.
    pub fn sanitize(self, sanitizer: &dyn Sanitizer, config: &SanitizeConfig) -> Self {
        match self {
            ConversionValue::Text(s) => ConversionValue::Text(sanitizer.clean(&s, config)),
            ConversionValue::Record(map) => ConversionValue::Record(
                map.into_iter()
                    .map(|(k, v)| match v {
                        Value::String(s) => (k, Value::String(sanitizer.clean(&s, config))),
                        other => (k, other),
                    })
                    .collect(),
            ),
        }
    }
}

pub type ExportFn = Arc<dyn Fn(&BlockData) -> ConversionValue + Send + Sync>;
pub type ImportFn = Arc<dyn Fn(&ConversionValue, &Value) -> BlockData + Send + Sync>;

/// How a tool exports its data.
#[derive(Clone)]
pub enum ExportRule {
    /// Export one string property as text.
    Property(String),
    /// Export several properties as a record.
    Fields(Vec<String>),
    Custom(ExportFn),
}

/// How a tool imports a bridge value.
#[derive(Clone)]
pub enum ImportRule {
    /// Text lands in this property; a record is taken as-is.
    Property(String),
    /// Called with the bridge and the tool's config.
    Custom(ImportFn),
}

impl std::fmt::Debug for ExportRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportRule::Property(p) => write!(f, "Property({p})"),
            ExportRule::Fields(fields) => write!(f, "Fields({fields:?})"),
            ExportRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl std::fmt::Debug for ImportRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportRule::Property(p) => write!(f, "Property({p})"),
            ImportRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Conversion rules declared by a block tool.
#[derive(Debug, Clone, Default)]
pub struct ConversionConfig {
    pub export: Option<ExportRule>,
    pub import: Option<ImportRule>,
}

impl ConversionConfig {
    /// Same property for both directions, the common text-tool case.
    pub fn property(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            export: Some(ExportRule::Property(name.clone())),
            import: Some(ImportRule::Property(name)),
        }
    }

    pub fn can_export(&self) -> bool {
        self.export.is_some()
    }

    pub fn can_import(&self) -> bool {
        self.import.is_some()
    }

    /// Map saved data to the bridge. `None` if no export rule.
    pub fn export(&self, data: &BlockData) -> Option<ConversionValue> {
        let rule = self.export.as_ref()?;
        Some(match rule {
            ExportRule::Property(prop) => ConversionValue::Text(
                data.get(prop)
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default(),
            ),
            ExportRule::Fields(fields) => ConversionValue::Record(
                fields
                    .iter()
                    .filter_map(|f| data.get(f).map(|v| (f.clone(), v.clone())))
                    .collect(),
            ),
            ExportRule::Custom(f) => f(data),
        })
    }

    /// Map the bridge to initial data. `None` if no import rule.
    pub fn import(&self, value: &ConversionValue, config: &Value) -> Option<BlockData> {
        let rule = self.import.as_ref()?;
        Some(match rule {
            ImportRule::Property(prop) => match value {
                ConversionValue::Text(s) => {
                    let mut data = BlockData::new();
                    data.insert(prop.clone(), Value::String(s.clone()));
                    data
                }
                ConversionValue::Record(map) => map.clone(),
            },
            ImportRule::Custom(f) => f(value, config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::TagSanitizer;
    use blocksmith_types::block_data;
    use serde_json::json;

    #[test]
    fn test_property_round_trip() {
        let cfg = ConversionConfig::property("text");
        let data = block_data(json!({"text": "Hello <b>there</b>"}));
        let bridge = cfg.export(&data).unwrap();
        assert_eq!(bridge, ConversionValue::Text("Hello <b>there</b>".into()));
        assert_eq!(cfg.import(&bridge, &Value::Null).unwrap(), data);
    }

    #[test]
    fn test_fields_export_record() {
        let cfg = ConversionConfig {
            export: Some(ExportRule::Fields(vec!["text".into(), "level".into()])),
            import: None,
        };
        let bridge = cfg
            .export(&block_data(json!({"text": "T", "level": 2, "extra": true})))
            .unwrap();
        assert_eq!(
            bridge,
            ConversionValue::Record(block_data(json!({"text": "T", "level": 2})))
        );
        assert!(!cfg.can_import());
        assert!(cfg.import(&bridge, &Value::Null).is_none());
    }

    #[test]
    fn test_custom_import_sees_config() {
        let cfg = ConversionConfig {
            export: None,
            import: Some(ImportRule::Custom(Arc::new(|value: &ConversionValue, config: &Value| {
                block_data(json!({"items": [value.as_text()], "style": config["style"]}))
            }))),
        };
        let data = cfg
            .import(&ConversionValue::Text("one".into()), &json!({"style": "ordered"}))
            .unwrap();
        assert_eq!(data, block_data(json!({"items": ["one"], "style": "ordered"})));
    }

    #[test]
    fn test_bridge_sanitized() {
        let bridge = ConversionValue::Text("a <b>b</b> <i>c</i>".into());
        let mut cfg = SanitizeConfig::new();
        cfg.insert("b".into(), crate::sanitize::TagRule::Keep(true));
        assert_eq!(
            bridge.sanitize(&TagSanitizer, &cfg),
            ConversionValue::Text("a <b>b</b> c".into())
        );
    }
}
