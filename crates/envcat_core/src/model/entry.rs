//! Entry model: the central dataset-metadata record and its owned parts.
//!
//! # Responsibility
//! - Define entry read models, creation drafts and partial updates.
//! - Validate mandatory fields before any write is attempted.
//! - Derive embargo state from stored timestamps.
//!
//! # Invariants
//! - A validated entry always names author, title, abstract, variable,
//!   license and a location or geometry.
//! - `embargo_end` defaults to publication plus the configured period
//!   (calendar years) only when embargo is requested.
//! - The current row of a version chain points at itself.

use crate::error::{CatalogError, CatalogResult};
use crate::model::identity::GlobalId;
use crate::model::keyword::KeywordId;
use crate::model::reference::{LicenseId, Person, PersonId, VariableId};
use crate::model::scale::{SpatialScale, TemporalScale};
use chrono::{DateTime, Months, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type EntryId = i64;
pub type DataSourceId = i64;

/// Encoding assumed when a data source does not declare one.
pub const DEFAULT_ENCODING: &str = "utf-8";

static DETAIL_STEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid detail stem regex"));

/// WGS84 reference point (lon/lat).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Storage technology behind a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    /// Table inside the catalog database.
    Internal,
    /// Service outside the catalog.
    External,
    Csv,
    /// Path on the local file system.
    Local,
    NetCdf,
}

impl DataSourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
            Self::Csv => "csv",
            Self::Local => "local",
            Self::NetCdf => "netcdf",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "internal" => Some(Self::Internal),
            "external" => Some(Self::External),
            "csv" => Some(Self::Csv),
            "local" => Some(Self::Local),
            "netcdf" => Some(Self::NetCdf),
            _ => None,
        }
    }
}

/// Where and how the observation values of one entry are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: DataSourceId,
    pub kind: DataSourceKind,
    pub path: String,
    /// Reader arguments as a JSON object.
    pub args: Map<String, Value>,
    pub encoding: String,
    pub temporal_scale: Option<TemporalScale>,
    pub spatial_scale: Option<SpatialScale>,
}

/// Input for data source creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDataSource {
    pub kind: DataSourceKind,
    pub path: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Defaults to [`DEFAULT_ENCODING`].
    pub encoding: Option<String>,
    pub temporal_scale: Option<TemporalScale>,
    pub spatial_scale: Option<SpatialScale>,
}

impl NewDataSource {
    pub fn new(kind: DataSourceKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            args: Map::new(),
            encoding: None,
            temporal_scale: None,
            spatial_scale: None,
        }
    }

    pub fn encoding_or_default(&self) -> &str {
        self.encoding.as_deref().unwrap_or(DEFAULT_ENCODING)
    }
}

impl From<&DataSource> for NewDataSource {
    fn from(value: &DataSource) -> Self {
        Self {
            kind: value.kind,
            path: value.path.clone(),
            args: value.args.clone(),
            encoding: Some(value.encoding.clone()),
            temporal_scale: value.temporal_scale.clone(),
            spatial_scale: value.spatial_scale.clone(),
        }
    }
}

/// Role qualifying a person association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PersonRole {
    /// First author; exactly one per entry.
    Author,
    CoAuthor,
    Contributor,
    Editor,
    Publisher,
    RightHolder,
    Owner,
    Originator,
}

impl PersonRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::CoAuthor => "coAuthor",
            Self::Contributor => "contributor",
            Self::Editor => "editor",
            Self::Publisher => "publisher",
            Self::RightHolder => "rightHolder",
            Self::Owner => "owner",
            Self::Originator => "originator",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "author" => Some(Self::Author),
            "coAuthor" => Some(Self::CoAuthor),
            "contributor" => Some(Self::Contributor),
            "editor" => Some(Self::Editor),
            "publisher" => Some(Self::Publisher),
            "rightHolder" => Some(Self::RightHolder),
            "owner" => Some(Self::Owner),
            "originator" => Some(Self::Originator),
            _ => None,
        }
    }
}

/// Role-qualified link between an entry and a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonAssociation {
    pub person: Person,
    pub role: PersonRole,
    /// Position among associations sharing a role, starting at 1.
    pub order: i64,
}

/// Keyword attached to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTag {
    pub keyword_id: KeywordId,
    pub uuid: GlobalId,
    pub full_path: String,
    /// Entry-specific label replacing the vocabulary value.
    pub alias: Option<String>,
}

/// Free key/value annotation on an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDetail {
    pub id: i64,
    pub key: String,
    /// Normalized key, unique per entry.
    pub stem: String,
    pub value: Value,
    pub description: Option<String>,
}

/// Normalizes a detail key: lowercase, runs of non-alphanumerics become `_`.
pub fn detail_stem(key: &str) -> String {
    DETAIL_STEM_RE
        .replace_all(&key.trim().to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// Stored catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub uuid: GlobalId,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub citation: Option<String>,
    pub external_id: Option<String>,
    pub location: Option<Point>,
    /// Richer geometry as WKT.
    pub geometry: Option<String>,
    pub license_id: LicenseId,
    pub variable_id: VariableId,
    /// Person holding the `author` association.
    pub author_id: PersonId,
    pub datasource: Option<DataSource>,
    pub embargo: bool,
    pub embargo_end: Option<DateTime<Utc>>,
    pub publication: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub version: u32,
    pub latest_version_id: EntryId,
}

impl Entry {
    pub fn is_latest_version(&self) -> bool {
        self.latest_version_id == self.id
    }

    /// True iff embargo is set and `at` lies before `embargo_end`.
    pub fn is_embargoed(&self, at: DateTime<Utc>) -> bool {
        match (self.embargo, self.embargo_end) {
            (true, Some(end)) => at < end,
            _ => false,
        }
    }
}

/// Computes the default embargo end by calendar-year arithmetic.
///
/// Feb 29 maps to Feb 28 when the target year is not a leap year.
pub fn default_embargo_end(
    publication: DateTime<Utc>,
    period_years: u32,
) -> CatalogResult<DateTime<Utc>> {
    publication
        .checked_add_months(Months::new(period_years.saturating_mul(12)))
        .ok_or_else(|| {
            CatalogError::InvalidArgument(format!(
                "embargo period of {period_years} years overflows from {publication}"
            ))
        })
}

/// Unvalidated entry creation input, as received from callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryDraft {
    pub author: Option<PersonId>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub variable: Option<VariableId>,
    pub license: Option<LicenseId>,
    pub location: Option<Point>,
    pub geometry: Option<String>,
    pub citation: Option<String>,
    pub external_id: Option<String>,
    pub datasource: Option<NewDataSource>,
    pub embargo: bool,
    pub embargo_end: Option<DateTime<Utc>>,
    /// Defaults to the creation instant.
    pub publication: Option<DateTime<Utc>>,
    pub keywords: Vec<KeywordId>,
}

/// Entry creation input that passed field validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub author_id: PersonId,
    pub title: String,
    pub abstract_text: String,
    pub variable_id: VariableId,
    pub license_id: LicenseId,
    pub location: Option<Point>,
    pub geometry: Option<String>,
    pub citation: Option<String>,
    pub external_id: Option<String>,
    pub datasource: Option<NewDataSource>,
    pub embargo: bool,
    pub embargo_end: Option<DateTime<Utc>>,
    pub publication: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub keywords: Vec<KeywordId>,
}

impl EntryDraft {
    /// Checks mandatory fields and resolves defaulted timestamps.
    ///
    /// Fields are checked in the order author, title, abstract, variable,
    /// license, location; blank strings count as absent.
    pub fn validate(
        self,
        now: DateTime<Utc>,
        embargo_period_years: u32,
    ) -> CatalogResult<NewEntry> {
        let author_id = self
            .author
            .ok_or(CatalogError::MissingRequiredField("author"))?;
        let title = non_blank(self.title).ok_or(CatalogError::MissingRequiredField("title"))?;
        let abstract_text =
            non_blank(self.abstract_text).ok_or(CatalogError::MissingRequiredField("abstract"))?;
        let variable_id = self
            .variable
            .ok_or(CatalogError::MissingRequiredField("variable"))?;
        let license_id = self
            .license
            .ok_or(CatalogError::MissingRequiredField("license"))?;
        let geometry = non_blank(self.geometry);
        let location = self.location.filter(|point| usable_point(*point));
        if location.is_none() && geometry.is_none() {
            return Err(CatalogError::MissingRequiredField("location"));
        }

        let publication = self.publication.unwrap_or(now);
        let embargo_end = match (self.embargo, self.embargo_end) {
            (_, Some(end)) => Some(end),
            (true, None) => Some(default_embargo_end(publication, embargo_period_years)?),
            (false, None) => None,
        };

        let mut keywords = self.keywords;
        keywords.sort_unstable();
        keywords.dedup();

        Ok(NewEntry {
            author_id,
            title,
            abstract_text,
            variable_id,
            license_id,
            location,
            geometry,
            citation: non_blank(self.citation),
            external_id: non_blank(self.external_id),
            datasource: self.datasource,
            embargo: self.embargo,
            embargo_end,
            publication,
            last_update: now,
            keywords,
        })
    }
}

/// Partial update of an entry's own attributes.
///
/// `None` leaves a field untouched; `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryChanges {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub citation: Option<Option<String>>,
    pub external_id: Option<Option<String>>,
    pub location: Option<Option<Point>>,
    pub geometry: Option<Option<String>>,
    pub license: Option<LicenseId>,
    pub variable: Option<VariableId>,
    pub embargo: Option<bool>,
    pub embargo_end: Option<Option<DateTime<Utc>>>,
}

impl EntryChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies the changes to `entry` and re-checks mandatory fields.
    ///
    /// Does not touch identity, version or timestamps other than a newly
    /// defaulted `embargo_end`.
    pub fn apply(&self, entry: &mut Entry, embargo_period_years: u32) -> CatalogResult<()> {
        if let Some(title) = &self.title {
            entry.title = non_blank(Some(title.clone()))
                .ok_or(CatalogError::MissingRequiredField("title"))?;
        }
        if let Some(abstract_text) = &self.abstract_text {
            entry.abstract_text = non_blank(Some(abstract_text.clone()))
                .ok_or(CatalogError::MissingRequiredField("abstract"))?;
        }
        if let Some(citation) = &self.citation {
            entry.citation = non_blank(citation.clone());
        }
        if let Some(external_id) = &self.external_id {
            entry.external_id = non_blank(external_id.clone());
        }
        if let Some(location) = self.location {
            entry.location = location.filter(|point| usable_point(*point));
        }
        if let Some(geometry) = &self.geometry {
            entry.geometry = non_blank(geometry.clone());
        }
        if entry.location.is_none() && entry.geometry.is_none() {
            return Err(CatalogError::MissingRequiredField("location"));
        }
        if let Some(license) = self.license {
            entry.license_id = license;
        }
        if let Some(variable) = self.variable {
            entry.variable_id = variable;
        }
        if let Some(embargo_end) = self.embargo_end {
            entry.embargo_end = embargo_end;
        }
        if let Some(embargo) = self.embargo {
            entry.embargo = embargo;
        }
        if entry.embargo && entry.embargo_end.is_none() {
            entry.embargo_end = Some(default_embargo_end(
                entry.publication,
                embargo_period_years,
            )?);
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|text| {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn usable_point(point: Point) -> bool {
    point.x.is_finite() && point.y.is_finite()
}
