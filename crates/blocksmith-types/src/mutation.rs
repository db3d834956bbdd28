//! Semantic mutation vocabulary.
//!
//! The observer turns raw presentation changes into these kinds; the block
//! manager raises them directly for structural commands.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// What happened to a block.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MutationKind {
    Added,
    Removed,
    Changed,
    Moved,
}

impl MutationKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Event-bus subject for this kind, e.g. `block.changed`.
    pub fn subject(&self) -> &'static str {
        match self {
            MutationKind::Added => "block.added",
            MutationKind::Removed => "block.removed",
            MutationKind::Changed => "block.changed",
            MutationKind::Moved => "block.moved",
        }
    }

    /// Whether the kind alters document structure (block count or order).
    pub fn is_structural(&self) -> bool {
        !matches!(self, MutationKind::Changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        assert_eq!(MutationKind::Changed.to_string(), "changed");
        assert_eq!(MutationKind::from_str("MOVED"), Some(MutationKind::Moved));
        assert_eq!(MutationKind::from_str("bogus"), None);
        assert_eq!(MutationKind::Added.subject(), "block.added");
    }

    #[test]
    fn test_structural_kinds() {
        assert!(MutationKind::Added.is_structural());
        assert!(MutationKind::Removed.is_structural());
        assert!(MutationKind::Moved.is_structural());
        assert!(!MutationKind::Changed.is_structural());
    }
}
