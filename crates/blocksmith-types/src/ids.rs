//! Block identifiers.
//!
//! Blocks are keyed by short opaque string tokens. Generated ids are the first
//! 10 hex characters of a random UUIDv4; ids read back from a snapshot are kept
//! verbatim, whatever their shape, so foreign documents round-trip unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of a generated block id.
pub const BLOCK_ID_LEN: usize = 10;

/// A block identifier, unique within one document.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    /// Generate a new random id.
    pub fn new() -> Self {
        let hex = uuid::Uuid::new_v4().as_simple().to_string();
        Self(hex[..BLOCK_ID_LEN].to_string())
    }

    /// Wrap an existing id string (e.g. from a saved snapshot).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty. Empty ids are replaced on block creation.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BlockId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for BlockId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

/// Opaque handle to a node of the presentation surface.
///
/// The core never looks inside a node; it only asks the surface collaborator
/// about parents, focusable descendants and content.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_short_hex() {
        let id = BlockId::new();
        assert_eq!(id.as_str().len(), BLOCK_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = BlockId::new();
        let b = BlockId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_foreign_ids_kept_verbatim() {
        let id = BlockId::from("Xk-9_abc");
        assert_eq!(id.to_string(), "Xk-9_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"Xk-9_abc\"");
        let back: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
