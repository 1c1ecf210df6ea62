//! Controlled-vocabulary use-case service.
//!
//! # Responsibility
//! - Resolve keywords to root-first paths and to their full subtree.
//! - Orchestrate vocabulary population (single paths and bulk import).
//!
//! # Invariants
//! - Traversals terminate on any stored data: a revisited node fails with
//!   `CorruptHierarchy` instead of looping.
//! - Re-parenting that would create a cycle fails with `InvalidHierarchy`
//!   and changes nothing.

use crate::error::{CatalogError, CatalogResult};
use crate::model::keyword::{
    Keyword, KeywordId, KeywordImportRow, NewThesaurus, Thesaurus, ThesaurusId,
};
use crate::repo::keyword_repo::KeywordRepository;
use log::{debug, info};
use std::collections::{HashSet, VecDeque};

/// Vocabulary service over a keyword repository.
pub struct VocabularyService<R: KeywordRepository> {
    repo: R,
}

impl<R: KeywordRepository> VocabularyService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn create_thesaurus(&self, thesaurus: &NewThesaurus) -> CatalogResult<Thesaurus> {
        self.repo.create_thesaurus(thesaurus)
    }

    pub fn find_thesaurus(&self, name: &str) -> CatalogResult<Option<Thesaurus>> {
        self.repo.find_thesaurus(name)
    }

    /// Adds one keyword by hand, e.g. an uncontrolled term.
    pub fn add_keyword(
        &self,
        thesaurus_id: ThesaurusId,
        parent_id: Option<KeywordId>,
        value: &str,
    ) -> CatalogResult<Keyword> {
        self.repo.create_keyword(thesaurus_id, parent_id, value)
    }

    /// Creates missing levels of `path` and returns the root-first chain.
    pub fn add_keyword_path(
        &self,
        thesaurus_id: ThesaurusId,
        path: &str,
    ) -> CatalogResult<Vec<Keyword>> {
        self.repo.ensure_path(thesaurus_id, path)
    }

    /// Imports a flat controlled-vocabulary listing in one transaction.
    pub fn import_vocabulary(&self, rows: &[KeywordImportRow]) -> CatalogResult<Vec<Keyword>> {
        match self.repo.import_rows(rows) {
            Ok(keywords) => {
                info!(
                    "event=vocabulary_import module=vocabulary status=ok rows={}",
                    keywords.len()
                );
                Ok(keywords)
            }
            Err(err) => {
                debug!(
                    "event=vocabulary_import module=vocabulary status=rejected rows={} error_code={}",
                    rows.len(),
                    err.code()
                );
                Err(err)
            }
        }
    }

    pub fn get_keyword(&self, id: KeywordId) -> CatalogResult<Keyword> {
        self.repo.get_keyword(id)
    }

    pub fn find_keyword_by_path(
        &self,
        thesaurus_id: ThesaurusId,
        path: &str,
    ) -> CatalogResult<Option<Keyword>> {
        self.repo.find_keyword_by_path(thesaurus_id, path)
    }

    /// Display values from the root down to `id`.
    pub fn full_path(&self, id: KeywordId) -> CatalogResult<Vec<String>> {
        let mut values = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if !visited.insert(current) {
                return Err(CatalogError::CorruptHierarchy(current));
            }
            let keyword = self.repo.get_keyword(current)?;
            values.push(keyword.value);
            cursor = keyword.parent_id;
        }
        values.reverse();
        Ok(values)
    }

    pub fn children(&self, id: KeywordId) -> CatalogResult<Vec<KeywordId>> {
        self.repo.child_ids(id)
    }

    /// Lazy breadth-first walk over all descendants of `id`.
    ///
    /// Fails eagerly with `NotFound` for an unknown start node.
    pub fn subtree(&self, id: KeywordId) -> CatalogResult<Subtree<'_, R>> {
        let start = self.repo.get_keyword(id)?;
        Ok(Subtree {
            repo: &self.repo,
            queue: start.children.into_iter().collect(),
            visited: HashSet::from([start.id]),
            finished: false,
        })
    }

    /// Moves `id` below `parent_id`, or to the root level when `None`.
    pub fn set_parent(
        &self,
        id: KeywordId,
        parent_id: Option<KeywordId>,
    ) -> CatalogResult<Keyword> {
        self.repo.set_parent(id, parent_id)
    }
}

/// Storage-backed breadth-first descendant iterator.
///
/// Yields each descendant once; stops after the first error.
pub struct Subtree<'a, R: KeywordRepository> {
    repo: &'a R,
    queue: VecDeque<KeywordId>,
    visited: HashSet<KeywordId>,
    finished: bool,
}

impl<R: KeywordRepository> Iterator for Subtree<'_, R> {
    type Item = CatalogResult<Keyword>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let id = self.queue.pop_front()?;
        if !self.visited.insert(id) {
            self.finished = true;
            return Some(Err(CatalogError::CorruptHierarchy(id)));
        }
        match self.repo.get_keyword(id) {
            Ok(keyword) => {
                self.queue.extend(keyword.children.iter().copied());
                Some(Ok(keyword))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
