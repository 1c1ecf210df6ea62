//! Core domain logic for the envcat environmental metadata catalog.
//! This crate is the single source of truth for catalog invariants.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use config::{CatalogConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use error::{CatalogError, CatalogResult};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::entry::{
    DataSource, DataSourceKind, Entry, EntryChanges, EntryDetail, EntryDraft, EntryId,
    KeywordTag, NewDataSource, PersonAssociation, PersonRole, Point,
};
pub use model::entry_group::{EntryGroup, EntryGroupId, ExportPolicy, GroupType, NewEntryGroup};
pub use model::identity::{new_global_id, parse_global_id, EntityKind, GlobalId};
pub use model::keyword::{Keyword, KeywordId, KeywordImportRow, NewThesaurus, Thesaurus};
pub use model::reference::{
    License, NewLicense, NewPerson, NewUnit, NewVariable, Person, Unit, Variable,
};
pub use model::scale::{BoundingBox, SpatialScale, TemporalExtent, TemporalScale};
pub use repo::entry_repo::{EntryQuery, EntryRepository, SqliteEntryRepository, VersionSelector};
pub use repo::group_repo::{EntryGroupRepository, SqliteEntryGroupRepository};
pub use repo::keyword_repo::{KeywordRepository, SqliteKeywordRepository};
pub use repo::reference_repo::{ReferenceRepository, SqliteReferenceRepository};
pub use search::fts::{search_entries, SearchError, SearchHit, SearchQuery, SearchResult};
pub use service::entry_service::EntryService;
pub use service::group_service::GroupService;
pub use service::identity_registry::{IdentityProbe, IdentityRegistry, ResolvedEntity};
pub use service::result_set::ResultSet;
pub use service::vocabulary_service::VocabularyService;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
