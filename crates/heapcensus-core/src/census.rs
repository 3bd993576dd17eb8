//! Identity of one retained census bucket.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::size_class::size_label;

/// Key under which retained addresses are grouped.
///
/// `size` is always the byte size of the underlying allocation, so a census
/// bucket can be matched against an analyzer's `avg_size` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CensusKey {
    /// Untyped `malloc(size)` blocks.
    Block { size: usize },
    /// One typed object per allocation.
    Object { type_name: String, size: usize },
    /// `per_block` logical instances sharing one allocation of `size` bytes.
    Grouped {
        type_name: String,
        per_block: usize,
        size: usize,
    },
}

impl CensusKey {
    #[must_use]
    pub fn block(size: usize) -> Self {
        Self::Block { size }
    }

    #[must_use]
    pub fn object(type_name: impl Into<String>, size: usize) -> Self {
        Self::Object {
            type_name: type_name.into(),
            size,
        }
    }

    #[must_use]
    pub fn grouped(type_name: impl Into<String>, per_block: usize, element_size: usize) -> Self {
        Self::Grouped {
            type_name: type_name.into(),
            per_block,
            size: per_block.saturating_mul(element_size),
        }
    }

    /// Byte size of each allocation in this bucket.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Block { size } | Self::Object { size, .. } | Self::Grouped { size, .. } => *size,
        }
    }

    /// Type name for typed buckets, `None` for raw blocks.
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::Block { .. } => None,
            Self::Object { type_name, .. } | Self::Grouped { type_name, .. } => Some(type_name),
        }
    }

    /// Number of logical instances carried by one allocation.
    #[must_use]
    pub fn instances_per_allocation(&self) -> usize {
        match self {
            Self::Grouped { per_block, .. } => *per_block,
            _ => 1,
        }
    }
}

impl fmt::Display for CensusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block { size } => write!(f, "malloc({})", size_label(*size)),
            Self::Object { type_name, size } => write!(f, "{type_name} ({size} bytes)"),
            Self::Grouped {
                type_name,
                per_block,
                size,
            } => write!(f, "{type_name} x{per_block} ({size} bytes)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_fixture_narration() {
        assert_eq!(CensusKey::block(16).to_string(), "malloc(16)");
        assert_eq!(CensusKey::block(3 * 1024 * 1024).to_string(), "malloc(3MB)");
        assert_eq!(CensusKey::object("Dog", 24).to_string(), "Dog (24 bytes)");
        assert_eq!(
            CensusKey::grouped("Widget", 5, 32).to_string(),
            "Widget x5 (160 bytes)"
        );
    }

    #[test]
    fn grouped_size_is_whole_allocation() {
        let key = CensusKey::grouped("Widget", 3, 32);
        assert_eq!(key.size(), 96);
        assert_eq!(key.instances_per_allocation(), 3);
        assert_eq!(key.type_name(), Some("Widget"));
        assert_eq!(CensusKey::grouped("Widget", usize::MAX / 8, 16).size(), usize::MAX);
    }

    #[test]
    fn keys_round_trip_through_tagged_json() {
        let key = CensusKey::object("Cat", 16);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"kind":"object","type_name":"Cat","size":16}"#);
        let back: CensusKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn blocks_order_by_size() {
        let mut keys = vec![CensusKey::block(64), CensusKey::block(16), CensusKey::block(32)];
        keys.sort();
        assert_eq!(
            keys,
            vec![CensusKey::block(16), CensusKey::block(32), CensusKey::block(64)]
        );
    }
}
