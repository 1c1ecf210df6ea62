//! Entry group use-case service.
//!
//! # Responsibility
//! - Manage group membership on top of the group repository.
//! - Compute export fan-out and merged result sets.
//!
//! # Invariants
//! - Split and Composite groups export their full membership; every other
//!   type exports the requested entry alone.
//! - A result set never lists the same entry twice.

use crate::error::{CatalogError, CatalogResult};
use crate::model::entry::{Entry, EntryId};
use crate::model::entry_group::{
    EntryGroup, EntryGroupId, ExportPolicy, GroupType, NewEntryGroup,
};
use crate::repo::entry_repo::EntryRepository;
use crate::repo::group_repo::EntryGroupRepository;
use crate::service::identity_registry::ResolvedEntity;
use crate::service::result_set::ResultSet;
use log::{debug, info};

/// Group service over a group repository and the entry repository it
/// reads members from.
pub struct GroupService<G: EntryGroupRepository, E: EntryRepository> {
    groups: G,
    entries: E,
}

impl<G: EntryGroupRepository, E: EntryRepository> GroupService<G, E> {
    pub fn new(groups: G, entries: E) -> Self {
        Self { groups, entries }
    }

    pub fn register_group_type(&self, name: &str, description: &str) -> CatalogResult<GroupType> {
        self.groups.register_group_type(name, description)
    }

    pub fn list_group_types(&self) -> CatalogResult<Vec<GroupType>> {
        self.groups.list_group_types()
    }

    pub fn create_group(&self, group: &NewEntryGroup) -> CatalogResult<EntryGroup> {
        let created = self.groups.create_group(group)?;
        info!(
            "event=group_create module=group status=ok group_id={} type={} members={}",
            created.id,
            created.group_type.name(),
            created.members.len()
        );
        Ok(created)
    }

    pub fn get_group(&self, id: EntryGroupId) -> CatalogResult<EntryGroup> {
        self.groups.get_group(id)
    }

    /// Adds `entry_id` to the group.
    ///
    /// Fails with `ConstraintViolation` when a Split group is asked to take an
    /// entry that already belongs to another Split group.
    pub fn add_member(&self, group_id: EntryGroupId, entry_id: EntryId) -> CatalogResult<EntryGroup> {
        match self.groups.add_member(group_id, entry_id) {
            Ok(group) => {
                info!(
                    "event=group_add_member module=group status=ok group_id={group_id} entry_id={entry_id}"
                );
                Ok(group)
            }
            Err(err) => {
                debug!(
                    "event=group_add_member module=group status=rejected group_id={group_id} entry_id={entry_id} error_code={}",
                    err.code()
                );
                Err(err)
            }
        }
    }

    /// Removes one member; `None` means the group left with it.
    pub fn remove_member(
        &self,
        group_id: EntryGroupId,
        entry_id: EntryId,
    ) -> CatalogResult<Option<EntryGroup>> {
        let remaining = self.groups.remove_member(group_id, entry_id)?;
        if remaining.is_none() {
            info!("event=group_delete module=group status=ok group_id={group_id}");
        }
        Ok(remaining)
    }

    pub fn groups_of(&self, entry_id: EntryId) -> CatalogResult<Vec<EntryGroup>> {
        self.groups.groups_of(entry_id)
    }

    /// Entries that must be exported together with `entry_id` from `group_id`.
    pub fn export_set(
        &self,
        group_id: EntryGroupId,
        entry_id: EntryId,
    ) -> CatalogResult<Vec<Entry>> {
        let group = self.groups.get_group(group_id)?;
        if !group.contains(entry_id) {
            return Err(CatalogError::InvalidArgument(format!(
                "entry {entry_id} is not a member of group {group_id}"
            )));
        }
        match group.group_type.export_policy() {
            ExportPolicy::BundleMembers => self.load_members(&group),
            ExportPolicy::EntryOnly => Ok(vec![self.entries.get_entry(entry_id)?]),
        }
    }

    /// Merged view around one entry.
    ///
    /// The base group is the entry's first Composite group, otherwise its
    /// first Split group; without either the set holds the entry alone.
    pub fn result_set_for_entry(&self, entry_id: EntryId) -> CatalogResult<ResultSet> {
        let entry = self.entries.get_entry(entry_id)?;
        let groups = self.groups.groups_of(entry_id)?;
        let base = groups
            .iter()
            .find(|group| group.group_type == GroupType::Composite)
            .or_else(|| groups.iter().find(|group| group.group_type.is_split()));

        match base {
            Some(group) => {
                let members = self.load_members(group)?;
                Ok(ResultSet::new(Some(group.clone()), members))
            }
            None => Ok(ResultSet::single(entry)),
        }
    }

    pub fn result_set_for_group(&self, group_id: EntryGroupId) -> CatalogResult<ResultSet> {
        let group = self.groups.get_group(group_id)?;
        let members = self.load_members(&group)?;
        Ok(ResultSet::new(Some(group), members))
    }

    /// Result set for an entity found by the identity registry.
    pub fn result_set_for(&self, resolved: &ResolvedEntity) -> CatalogResult<ResultSet> {
        match resolved {
            ResolvedEntity::Entry(entry) => self.result_set_for_entry(entry.id),
            ResolvedEntity::EntryGroup(group) => self.result_set_for_group(group.id),
            ResolvedEntity::Keyword(keyword) => Err(CatalogError::InvalidArgument(format!(
                "keyword {} has no result set",
                keyword.uuid
            ))),
        }
    }

    fn load_members(&self, group: &EntryGroup) -> CatalogResult<Vec<Entry>> {
        group
            .members
            .iter()
            .map(|id| self.entries.get_entry(*id))
            .collect()
    }
}
