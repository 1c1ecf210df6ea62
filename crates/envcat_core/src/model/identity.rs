//! Global identifiers shared by all catalog entity kinds.

use crate::error::{CatalogError, CatalogResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version-4 UUID identifying an entry, entry group or keyword.
pub type GlobalId = Uuid;

static CANONICAL_UUID_V4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("valid uuid v4 regex")
});

/// Entity kinds that carry a global identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Entry,
    EntryGroup,
    Keyword,
}

impl EntityKind {
    /// Storage and diagnostics label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::EntryGroup => "entry_group",
            Self::Keyword => "keyword",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "entry" => Some(Self::Entry),
            "entry_group" => Some(Self::EntryGroup),
            "keyword" => Some(Self::Keyword),
            _ => None,
        }
    }
}

/// Mints a fresh identifier.
pub fn new_global_id() -> GlobalId {
    Uuid::new_v4()
}

/// Parses a caller-supplied identifier.
///
/// Only the canonical lowercase hyphenated version-4 form is accepted;
/// anything else fails with `InvalidArgument` before any lookup happens.
pub fn parse_global_id(value: &str) -> CatalogResult<GlobalId> {
    if !CANONICAL_UUID_V4_RE.is_match(value) {
        return Err(CatalogError::InvalidArgument(format!(
            "`{value}` is not a canonical version-4 uuid"
        )));
    }
    Uuid::parse_str(value)
        .map_err(|err| CatalogError::InvalidArgument(format!("`{value}` is not a uuid: {err}")))
}
