//! Typed entry groups and their export semantics.

use crate::model::entry::EntryId;
use crate::model::identity::GlobalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type EntryGroupId = i64;

/// Group type. Built-in types carry fixed semantics; any other stored name
/// is a caller-defined descriptive type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupType {
    /// Fragments of one original dataset.
    Split,
    /// Mutually dependent datasets.
    Composite,
    Label,
    Project,
    Custom(String),
}

/// What `export_set` returns for a member of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPolicy {
    /// The whole membership travels together.
    BundleMembers,
    /// Only the requested entry.
    EntryOnly,
}

impl GroupType {
    /// Stored type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Split => "Split dataset",
            Self::Composite => "Composite",
            Self::Label => "Label",
            Self::Project => "Project",
            Self::Custom(name) => name.as_str(),
        }
    }

    /// Maps a stored name, case-insensitively, to a type.
    pub fn from_name(name: &str) -> Self {
        let trimmed = name.trim();
        match trimmed.to_lowercase().as_str() {
            "split dataset" | "split" => Self::Split,
            "composite" => Self::Composite,
            "label" => Self::Label,
            "project" => Self::Project,
            _ => Self::Custom(trimmed.to_string()),
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, Self::Split)
    }

    pub fn export_policy(&self) -> ExportPolicy {
        match self {
            Self::Split | Self::Composite => ExportPolicy::BundleMembers,
            Self::Label | Self::Project | Self::Custom(_) => ExportPolicy::EntryOnly,
        }
    }
}

/// Stored group with its ordered membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryGroup {
    pub id: EntryGroupId,
    pub uuid: GlobalId,
    pub group_type: GroupType,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Member entry ids in insertion order.
    pub members: Vec<EntryId>,
    pub publication: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl EntryGroup {
    pub fn contains(&self, entry_id: EntryId) -> bool {
        self.members.contains(&entry_id)
    }
}

/// Input for group creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntryGroup {
    pub group_type: GroupType,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Initial members; at least one is required.
    pub members: Vec<EntryId>,
}
