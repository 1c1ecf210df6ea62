//! Cross-kind identifier resolution.
//!
//! # Responsibility
//! - Resolve one global identifier to the entity that owns it without the
//!   caller knowing the kind in advance.
//!
//! # Invariants
//! - Malformed identifiers fail with `InvalidArgument` before any probe runs.
//! - Probes run in `EntityKind` order and stop at the first hit.
//! - Resolution only reads.

use crate::error::{CatalogError, CatalogResult};
use crate::model::entry::Entry;
use crate::model::entry_group::EntryGroup;
use crate::model::identity::{parse_global_id, EntityKind, GlobalId};
use crate::model::keyword::Keyword;
use crate::repo::entry_repo::{EntryRepository, SqliteEntryRepository};
use crate::repo::group_repo::{EntryGroupRepository, SqliteEntryGroupRepository};
use crate::repo::keyword_repo::{KeywordRepository, SqliteKeywordRepository};
use log::debug;
use rusqlite::Connection;

/// Entity found by [`IdentityRegistry::resolve`], tagged with its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedEntity {
    Entry(Entry),
    EntryGroup(EntryGroup),
    Keyword(Keyword),
}

impl ResolvedEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Entry(_) => EntityKind::Entry,
            Self::EntryGroup(_) => EntityKind::EntryGroup,
            Self::Keyword(_) => EntityKind::Keyword,
        }
    }

    pub fn uuid(&self) -> GlobalId {
        match self {
            Self::Entry(entry) => entry.uuid,
            Self::EntryGroup(group) => group.uuid,
            Self::Keyword(keyword) => keyword.uuid,
        }
    }
}

/// Lookup of one entity kind by global identifier.
pub trait IdentityProbe {
    fn kind(&self) -> EntityKind;
    /// `Ok(None)` when no entity of this kind owns `uuid`.
    fn probe(&self, uuid: GlobalId) -> CatalogResult<Option<ResolvedEntity>>;
}

pub struct EntryProbe<R: EntryRepository>(pub R);

impl<R: EntryRepository> IdentityProbe for EntryProbe<R> {
    fn kind(&self) -> EntityKind {
        EntityKind::Entry
    }

    fn probe(&self, uuid: GlobalId) -> CatalogResult<Option<ResolvedEntity>> {
        Ok(self.0.get_entry_by_uuid(uuid)?.map(ResolvedEntity::Entry))
    }
}

pub struct GroupProbe<R: EntryGroupRepository>(pub R);

impl<R: EntryGroupRepository> IdentityProbe for GroupProbe<R> {
    fn kind(&self) -> EntityKind {
        EntityKind::EntryGroup
    }

    fn probe(&self, uuid: GlobalId) -> CatalogResult<Option<ResolvedEntity>> {
        Ok(self.0.get_group_by_uuid(uuid)?.map(ResolvedEntity::EntryGroup))
    }
}

pub struct KeywordProbe<R: KeywordRepository>(pub R);

impl<R: KeywordRepository> IdentityProbe for KeywordProbe<R> {
    fn kind(&self) -> EntityKind {
        EntityKind::Keyword
    }

    fn probe(&self, uuid: GlobalId) -> CatalogResult<Option<ResolvedEntity>> {
        Ok(self.0.get_keyword_by_uuid(uuid)?.map(ResolvedEntity::Keyword))
    }
}

/// Ordered set of probes, at most one per entity kind.
#[derive(Default)]
pub struct IdentityRegistry<'a> {
    probes: Vec<Box<dyn IdentityProbe + 'a>>,
}

impl<'a> IdentityRegistry<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry probing entries, entry groups and keywords on `conn`.
    pub fn for_connection(conn: &'a Connection) -> CatalogResult<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(EntryProbe(SqliteEntryRepository::try_new(conn)?)))?;
        registry.register(Box::new(GroupProbe(SqliteEntryGroupRepository::try_new(
            conn,
        )?)))?;
        registry.register(Box::new(KeywordProbe(SqliteKeywordRepository::try_new(
            conn,
        )?)))?;
        Ok(registry)
    }

    /// Adds a probe; a second probe for the same kind is rejected.
    pub fn register(&mut self, probe: Box<dyn IdentityProbe + 'a>) -> CatalogResult<()> {
        let kind = probe.kind();
        if self.probes.iter().any(|existing| existing.kind() == kind) {
            return Err(CatalogError::InvalidArgument(format!(
                "a probe for `{}` is already registered",
                kind.as_str()
            )));
        }
        self.probes.push(probe);
        self.probes.sort_by_key(|probe| probe.kind());
        Ok(())
    }

    /// Kinds in probing order.
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.probes.iter().map(|probe| probe.kind()).collect()
    }

    /// Resolves a canonical version-4 identifier string.
    pub fn resolve(&self, identifier: &str) -> CatalogResult<ResolvedEntity> {
        let uuid = parse_global_id(identifier)?;
        for probe in &self.probes {
            if let Some(entity) = probe.probe(uuid)? {
                debug!(
                    "event=identity_resolve module=identity status=ok kind={}",
                    entity.kind().as_str()
                );
                return Ok(entity);
            }
        }
        debug!("event=identity_resolve module=identity status=not_found");
        Err(CatalogError::not_found("identifier", uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentityProbe, IdentityRegistry, ResolvedEntity};
    use crate::error::{CatalogError, CatalogResult};
    use crate::model::identity::{EntityKind, GlobalId};
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingProbe {
        kind: EntityKind,
        calls: Rc<Cell<usize>>,
    }

    impl IdentityProbe for CountingProbe {
        fn kind(&self) -> EntityKind {
            self.kind
        }

        fn probe(&self, _uuid: GlobalId) -> CatalogResult<Option<ResolvedEntity>> {
            self.calls.set(self.calls.get() + 1);
            Ok(None)
        }
    }

    #[test]
    fn probes_are_kept_in_kind_order_and_deduplicated() {
        let calls = Rc::new(Cell::new(0));
        let mut registry = IdentityRegistry::new();
        for kind in [EntityKind::Keyword, EntityKind::Entry, EntityKind::EntryGroup] {
            registry
                .register(Box::new(CountingProbe {
                    kind,
                    calls: Rc::clone(&calls),
                }))
                .unwrap();
        }
        assert_eq!(
            registry.kinds(),
            vec![EntityKind::Entry, EntityKind::EntryGroup, EntityKind::Keyword]
        );
        let duplicate = registry.register(Box::new(CountingProbe {
            kind: EntityKind::Entry,
            calls: Rc::clone(&calls),
        }));
        assert!(matches!(duplicate, Err(CatalogError::InvalidArgument(_))));
    }

    #[test]
    fn malformed_identifier_fails_before_any_probe() {
        let calls = Rc::new(Cell::new(0));
        let mut registry = IdentityRegistry::new();
        registry
            .register(Box::new(CountingProbe {
                kind: EntityKind::Entry,
                calls: Rc::clone(&calls),
            }))
            .unwrap();

        let err = registry.resolve("not-a-uuid").unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(_)));
        assert_eq!(calls.get(), 0);

        let err = registry
            .resolve("6f1c4e2a-9b1d-4c3e-8a2b-1d2e3f4a5b6c")
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { kind: "identifier", .. }));
        assert_eq!(calls.get(), 1);
    }
}
