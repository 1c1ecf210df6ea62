//! Entry lifecycle use-case service.
//!
//! # Responsibility
//! - Validate creation drafts and partial edits before any write.
//! - Advance version chains instead of rewriting history.
//! - Derive embargo state.
//!
//! # Invariants
//! - Only the current row of a chain is edited or advanced; older rows are
//!   history and stay untouched.
//! - The embargo period comes from [`CatalogConfig`], never from a global.

use crate::config::CatalogConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::model::entry::{
    DataSource, Entry, EntryChanges, EntryDetail, EntryDraft, EntryId, KeywordTag,
    PersonAssociation, PersonRole,
};
use crate::model::identity::GlobalId;
use crate::model::keyword::KeywordId;
use crate::model::reference::PersonId;
use crate::model::scale::{SpatialScale, TemporalScale};
use crate::repo::entry_repo::{EntryQuery, EntryRepository};
use crate::repo::now_ms;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;

/// Entry service over an entry repository.
pub struct EntryService<R: EntryRepository> {
    repo: R,
    config: CatalogConfig,
}

impl<R: EntryRepository> EntryService<R> {
    pub fn new(repo: R, config: CatalogConfig) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Creates version 1 of a new logical dataset.
    ///
    /// Author, variable, license, keywords and data source are written in
    /// one transaction together with the entry.
    pub fn create(&self, draft: EntryDraft) -> CatalogResult<Entry> {
        let new_entry = draft.validate(now_ms(), self.config.embargo_period_years)?;
        match self.repo.create_entry(&new_entry) {
            Ok(entry) => {
                info!(
                    "event=entry_create module=entry status=ok entry_id={} embargo={}",
                    entry.id, entry.embargo
                );
                Ok(entry)
            }
            Err(err) => {
                debug!(
                    "event=entry_create module=entry status=rejected error_code={}",
                    err.code()
                );
                Err(err)
            }
        }
    }

    pub fn get(&self, id: EntryId) -> CatalogResult<Entry> {
        self.repo.get_entry(id)
    }

    pub fn get_by_uuid(&self, uuid: GlobalId) -> CatalogResult<Option<Entry>> {
        self.repo.get_entry_by_uuid(uuid)
    }

    /// Applies a partial update in place and refreshes `last_update`.
    ///
    /// Identifier and version number are unchanged.
    pub fn edit(&self, id: EntryId, changes: &EntryChanges) -> CatalogResult<Entry> {
        let mut entry = self.repo.get_entry(id)?;
        ensure_current(&entry)?;
        changes.apply(&mut entry, self.config.embargo_period_years)?;
        entry.last_update = now_ms();
        self.repo.update_entry(&entry)
    }

    /// Copies the current row forward with `changes` applied.
    pub fn new_version(&self, id: EntryId, changes: &EntryChanges) -> CatalogResult<Entry> {
        let base = self.repo.get_entry(id)?;
        ensure_current(&base)?;
        let mut candidate = base.clone();
        changes.apply(&mut candidate, self.config.embargo_period_years)?;

        match self.repo.create_version(id, &candidate, now_ms()) {
            Ok(entry) => {
                info!(
                    "event=entry_new_version module=entry status=ok entry_id={} previous_id={} version={}",
                    entry.id, base.id, entry.version
                );
                Ok(entry)
            }
            Err(err) => {
                debug!(
                    "event=entry_new_version module=entry status=rejected previous_id={} error_code={}",
                    base.id,
                    err.code()
                );
                Err(err)
            }
        }
    }

    /// All versions of the dataset `id` belongs to, oldest first.
    pub fn version_chain(&self, id: EntryId) -> CatalogResult<Vec<Entry>> {
        self.repo.version_chain(id)
    }

    /// Follows `latest_version_id` to the current row.
    pub fn current_version(&self, id: EntryId) -> CatalogResult<Entry> {
        let entry = self.repo.get_entry(id)?;
        if entry.is_latest_version() {
            return Ok(entry);
        }
        self.repo.get_entry(entry.latest_version_id)
    }

    pub fn is_embargoed(&self, entry: &Entry, at: DateTime<Utc>) -> bool {
        entry.is_embargoed(at)
    }

    /// Deletes one row with its data source and group memberships.
    pub fn delete(&self, id: EntryId) -> CatalogResult<()> {
        self.repo.delete_entry(id)?;
        info!("event=entry_delete module=entry status=ok entry_id={id}");
        Ok(())
    }

    pub fn add_person(
        &self,
        entry_id: EntryId,
        person_id: PersonId,
        role: PersonRole,
        order: i64,
    ) -> CatalogResult<()> {
        self.repo.add_person(entry_id, person_id, role, order)
    }

    pub fn list_persons(&self, entry_id: EntryId) -> CatalogResult<Vec<PersonAssociation>> {
        self.repo.list_persons(entry_id)
    }

    pub fn tag_keyword(
        &self,
        entry_id: EntryId,
        keyword_id: KeywordId,
        alias: Option<&str>,
    ) -> CatalogResult<()> {
        self.repo.tag_keyword(entry_id, keyword_id, alias)
    }

    pub fn keywords(&self, entry_id: EntryId) -> CatalogResult<Vec<KeywordTag>> {
        self.repo.keywords(entry_id)
    }

    pub fn set_detail(
        &self,
        entry_id: EntryId,
        key: &str,
        value: &Value,
        description: Option<&str>,
    ) -> CatalogResult<EntryDetail> {
        self.repo.set_detail(entry_id, key, value, description)
    }

    pub fn details(&self, entry_id: EntryId) -> CatalogResult<Vec<EntryDetail>> {
        self.repo.details(entry_id)
    }

    /// Replaces both scale triplets; `None` removes a triplet.
    pub fn replace_scales(
        &self,
        entry_id: EntryId,
        temporal: Option<TemporalScale>,
        spatial: Option<SpatialScale>,
    ) -> CatalogResult<DataSource> {
        self.repo
            .replace_scales(entry_id, temporal.as_ref(), spatial.as_ref())
    }

    pub fn find(&self, query: &EntryQuery) -> CatalogResult<Vec<Entry>> {
        self.repo.find_entries(query)
    }
}

fn ensure_current(entry: &Entry) -> CatalogResult<()> {
    if entry.is_latest_version() {
        return Ok(());
    }
    Err(CatalogError::ConstraintViolation(format!(
        "entry {} is version {} of a chain whose current row is entry {}",
        entry.id, entry.version, entry.latest_version_id
    )))
}
