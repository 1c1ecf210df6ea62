//! Controlled-vocabulary model: thesauri and their keyword forests.
//!
//! # Responsibility
//! - Define the keyword/thesaurus read models and import rows.
//! - Own path splitting/joining with the `" > "` separator.
//!
//! # Invariants
//! - Keywords reference parents by id only; no in-memory back-references.
//! - `full_path` is the root-first join of ancestor values.

use crate::error::{CatalogError, CatalogResult};
use crate::model::identity::GlobalId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub type KeywordId = i64;
pub type ThesaurusId = i64;

/// Separator used when rendering a keyword path, root first.
pub const KEYWORD_PATH_SEPARATOR: &str = " > ";

static PATH_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*>\s*").expect("valid keyword path separator regex"));

/// Source vocabulary owning a set of keyword roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thesaurus {
    pub id: ThesaurusId,
    pub uuid: GlobalId,
    /// Short unique name, e.g. `GCMD`.
    pub name: String,
    pub title: String,
    pub organisation: String,
    /// Root URI of the vocabulary.
    pub url: String,
    pub description: Option<String>,
}

/// Input for thesaurus creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewThesaurus {
    pub name: String,
    pub title: String,
    pub organisation: String,
    pub url: String,
    pub description: Option<String>,
}

/// One node of a keyword forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: KeywordId,
    pub uuid: GlobalId,
    /// Display value of this level only.
    pub value: String,
    /// Thesaurus inherited from the root ancestor.
    pub thesaurus_id: ThesaurusId,
    /// `None` marks a root.
    pub parent_id: Option<KeywordId>,
    /// Direct children ordered by id.
    pub children: Vec<KeywordId>,
    /// Materialized root-first path, joined with [`KEYWORD_PATH_SEPARATOR`].
    pub full_path: String,
}

impl Keyword {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Number of ancestors; roots have depth 0.
    pub fn depth(&self) -> usize {
        self.full_path.matches(KEYWORD_PATH_SEPARATOR).count()
    }
}

/// Flat row from a controlled-vocabulary source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordImportRow {
    pub value: String,
    /// Full path including `value` as last segment.
    pub path: String,
    /// Thesaurus name.
    pub thesaurus: String,
}

impl KeywordImportRow {
    pub fn new(
        value: impl Into<String>,
        path: impl Into<String>,
        thesaurus: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            path: path.into(),
            thesaurus: thesaurus.into(),
        }
    }
}

/// Splits a rendered path into trimmed segments.
///
/// Tolerates irregular whitespace around `>`; blank segments are rejected.
pub fn split_keyword_path(path: &str) -> CatalogResult<Vec<String>> {
    let segments: Vec<String> = PATH_SEPARATOR_RE
        .split(path.trim())
        .map(|segment| segment.trim().to_string())
        .collect();
    if segments.iter().any(String::is_empty) {
        return Err(CatalogError::InvalidArgument(format!(
            "keyword path `{path}` contains an empty segment"
        )));
    }
    Ok(segments)
}

/// Joins segments root first.
pub fn join_keyword_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(KEYWORD_PATH_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_normalizes_whitespace_around_separator() {
        let segments =
            split_keyword_path("EARTH SCIENCE>TERRESTRIAL HYDROSPHERE  >  SURFACE WATER").unwrap();
        assert_eq!(
            segments,
            vec!["EARTH SCIENCE", "TERRESTRIAL HYDROSPHERE", "SURFACE WATER"]
        );
        assert_eq!(
            join_keyword_path(&segments),
            "EARTH SCIENCE > TERRESTRIAL HYDROSPHERE > SURFACE WATER"
        );
    }

    #[test]
    fn split_rejects_blank_segments() {
        for path in ["", "A >  > B", "A >", "> A"] {
            assert!(
                matches!(split_keyword_path(path), Err(CatalogError::InvalidArgument(_))),
                "{path:?} should be rejected"
            );
        }
    }

    #[test]
    fn depth_counts_separators() {
        let keyword = Keyword {
            id: 3,
            uuid: crate::model::identity::new_global_id(),
            value: "SURFACE WATER".to_string(),
            thesaurus_id: 1,
            parent_id: Some(2),
            children: Vec::new(),
            full_path: "EARTH SCIENCE > TERRESTRIAL HYDROSPHERE > SURFACE WATER".to_string(),
        };
        assert_eq!(keyword.depth(), 2);
        assert!(!keyword.is_root());
    }
}
