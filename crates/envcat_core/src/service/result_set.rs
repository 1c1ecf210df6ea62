//! Result sets: a base group plus its deduplicated member entries.

use crate::model::entry::{Entry, EntryId};
use crate::model::entry_group::EntryGroup;
use crate::model::identity::GlobalId;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Entries exported together, optionally anchored on a base group.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    group: Option<EntryGroup>,
    members: Vec<Entry>,
}

impl ResultSet {
    /// Builds a set from `members`, keeping first occurrences only.
    pub fn new(group: Option<EntryGroup>, members: Vec<Entry>) -> Self {
        let mut seen: HashSet<EntryId> = HashSet::new();
        let members = members
            .into_iter()
            .filter(|entry| seen.insert(entry.id))
            .collect();
        Self { group, members }
    }

    /// A set holding one entry and no base group.
    pub fn single(entry: Entry) -> Self {
        Self {
            group: None,
            members: vec![entry],
        }
    }

    pub fn group(&self) -> Option<&EntryGroup> {
        self.group.as_ref()
    }

    pub fn members(&self) -> &[Entry] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn uuids(&self) -> Vec<GlobalId> {
        self.members.iter().map(|entry| entry.uuid).collect()
    }

    pub fn contains_uuid(&self, uuid: GlobalId) -> bool {
        self.members.iter().any(|entry| entry.uuid == uuid)
    }

    /// Distinct values of `f` across members, in member order.
    pub fn distinct<T, F>(&self, f: F) -> Vec<T>
    where
        T: PartialEq,
        F: Fn(&Entry) -> T,
    {
        let mut values: Vec<T> = Vec::new();
        for entry in &self.members {
            let value = f(entry);
            if !values.contains(&value) {
                values.push(value);
            }
        }
        values
    }

    /// Earliest and latest publication date among members.
    pub fn publication_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.members.iter().map(|entry| entry.publication).min()?;
        let last = self.members.iter().map(|entry| entry.publication).max()?;
        Some((first, last))
    }
}

impl IntoIterator for ResultSet {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}
