//! Thesaurus/keyword repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist keyword forests as id-linked rows with materialized paths.
//! - Own write-time hierarchy checks: cycle prevention on re-parent and
//!   parent-before-child ordering on bulk import.
//!
//! # Invariants
//! - A keyword's thesaurus equals its root ancestor's thesaurus.
//! - `full_path` equals the root-first join of ancestor values.
//! - A rejected hierarchy write leaves every row unchanged.

use crate::error::{CatalogError, CatalogResult};
use crate::model::identity::{new_global_id, EntityKind, GlobalId};
use crate::model::keyword::{
    join_keyword_path, split_keyword_path, Keyword, KeywordId, KeywordImportRow, NewThesaurus,
    Thesaurus, ThesaurusId, KEYWORD_PATH_SEPARATOR,
};
use crate::repo::identity_repo::claim_global_id;
use crate::repo::{begin_immediate, ensure_schema_ready, parse_uuid};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet, VecDeque};

const KEYWORD_SELECT_SQL: &str = "SELECT
    id,
    uuid,
    value,
    thesaurus_id,
    parent_id,
    full_path
FROM keywords";

const THESAURUS_SELECT_SQL: &str = "SELECT
    id,
    uuid,
    name,
    title,
    organisation,
    url,
    description
FROM thesauri";

/// Repository interface for controlled vocabularies.
pub trait KeywordRepository {
    fn create_thesaurus(&self, thesaurus: &NewThesaurus) -> CatalogResult<Thesaurus>;
    fn get_thesaurus(&self, id: ThesaurusId) -> CatalogResult<Thesaurus>;
    fn find_thesaurus(&self, name: &str) -> CatalogResult<Option<Thesaurus>>;
    /// Creates one keyword below `parent_id`, or a root when `None`.
    fn create_keyword(
        &self,
        thesaurus_id: ThesaurusId,
        parent_id: Option<KeywordId>,
        value: &str,
    ) -> CatalogResult<Keyword>;
    fn get_keyword(&self, id: KeywordId) -> CatalogResult<Keyword>;
    fn get_keyword_by_uuid(&self, uuid: GlobalId) -> CatalogResult<Option<Keyword>>;
    fn find_keyword_by_path(
        &self,
        thesaurus_id: ThesaurusId,
        path: &str,
    ) -> CatalogResult<Option<Keyword>>;
    /// Direct children ordered by id; empty for leaves.
    fn child_ids(&self, id: KeywordId) -> CatalogResult<Vec<KeywordId>>;
    /// Re-parents `id` and recomputes the moved subtree's paths.
    fn set_parent(&self, id: KeywordId, parent_id: Option<KeywordId>) -> CatalogResult<Keyword>;
    /// Strict bulk import in one transaction.
    fn import_rows(&self, rows: &[KeywordImportRow]) -> CatalogResult<Vec<Keyword>>;
    /// Returns the chain for `path`, creating missing levels top-down.
    fn ensure_path(&self, thesaurus_id: ThesaurusId, path: &str) -> CatalogResult<Vec<Keyword>>;
}

/// SQLite-backed vocabulary repository.
pub struct SqliteKeywordRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteKeywordRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> CatalogResult<Self> {
        ensure_schema_ready(conn, &["thesauri", "keywords", "global_identifiers"])?;
        Ok(Self { conn })
    }
}

impl KeywordRepository for SqliteKeywordRepository<'_> {
    fn create_thesaurus(&self, thesaurus: &NewThesaurus) -> CatalogResult<Thesaurus> {
        let name = thesaurus.name.trim();
        if name.is_empty() {
            return Err(CatalogError::MissingRequiredField("name"));
        }
        self.conn.execute(
            "INSERT INTO thesauri (uuid, name, title, organisation, url, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                new_global_id().to_string(),
                name,
                thesaurus.title.trim(),
                thesaurus.organisation.trim(),
                thesaurus.url.trim(),
                thesaurus.description,
            ],
        )?;
        self.get_thesaurus(self.conn.last_insert_rowid())
    }

    fn get_thesaurus(&self, id: ThesaurusId) -> CatalogResult<Thesaurus> {
        load_thesaurus(self.conn, "id = ?1", &id)?
            .ok_or_else(|| CatalogError::not_found("thesaurus", id))
    }

    fn find_thesaurus(&self, name: &str) -> CatalogResult<Option<Thesaurus>> {
        load_thesaurus(self.conn, "name = ?1", &name.trim())
    }

    fn create_keyword(
        &self,
        thesaurus_id: ThesaurusId,
        parent_id: Option<KeywordId>,
        value: &str,
    ) -> CatalogResult<Keyword> {
        let tx = begin_immediate(self.conn)?;
        let parent = match parent_id {
            Some(parent_id) => {
                let parent = load_keyword(&tx, parent_id)?;
                if parent.thesaurus_id != thesaurus_id {
                    return Err(CatalogError::InvalidHierarchy(format!(
                        "parent keyword {parent_id} belongs to thesaurus {}, not {thesaurus_id}",
                        parent.thesaurus_id
                    )));
                }
                Some(parent)
            }
            None => {
                ensure_thesaurus_exists(&tx, thesaurus_id)?;
                None
            }
        };
        let id = insert_keyword(&tx, thesaurus_id, parent.as_ref(), value)?;
        tx.commit()?;
        self.get_keyword(id)
    }

    fn get_keyword(&self, id: KeywordId) -> CatalogResult<Keyword> {
        load_keyword(self.conn, id)
    }

    fn get_keyword_by_uuid(&self, uuid: GlobalId) -> CatalogResult<Option<Keyword>> {
        let id: Option<KeywordId> = self
            .conn
            .query_row(
                "SELECT id FROM keywords WHERE uuid = ?1;",
                [uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|id| load_keyword(self.conn, id)).transpose()
    }

    fn find_keyword_by_path(
        &self,
        thesaurus_id: ThesaurusId,
        path: &str,
    ) -> CatalogResult<Option<Keyword>> {
        let normalized = join_keyword_path(&split_keyword_path(path)?);
        find_id_by_path(self.conn, thesaurus_id, &normalized)?
            .map(|id| load_keyword(self.conn, id))
            .transpose()
    }

    fn child_ids(&self, id: KeywordId) -> CatalogResult<Vec<KeywordId>> {
        ensure_keyword_exists(self.conn, id)?;
        list_child_ids(self.conn, id)
    }

    fn set_parent(&self, id: KeywordId, parent_id: Option<KeywordId>) -> CatalogResult<Keyword> {
        let tx = begin_immediate(self.conn)?;
        let node = load_keyword(&tx, id)?;

        let (thesaurus_id, full_path) = match parent_id {
            Some(parent_id) => {
                if parent_id == id {
                    return Err(CatalogError::InvalidHierarchy(format!(
                        "keyword {id} cannot be its own parent"
                    )));
                }
                let parent = load_keyword(&tx, parent_id)?;
                if is_ancestor_or_self(&tx, id, &parent)? {
                    return Err(CatalogError::InvalidHierarchy(format!(
                        "keyword {parent_id} is a descendant of keyword {id}"
                    )));
                }
                (
                    parent.thesaurus_id,
                    format!("{}{KEYWORD_PATH_SEPARATOR}{}", parent.full_path, node.value),
                )
            }
            None => (node.thesaurus_id, node.value.clone()),
        };

        tx.execute(
            "UPDATE keywords
             SET parent_id = ?2, thesaurus_id = ?3, full_path = ?4
             WHERE id = ?1;",
            params![id, parent_id, thesaurus_id, full_path],
        )?;
        rewrite_descendant_paths(&tx, id, thesaurus_id, &full_path)?;
        tx.commit()?;
        self.get_keyword(id)
    }

    fn import_rows(&self, rows: &[KeywordImportRow]) -> CatalogResult<Vec<Keyword>> {
        let tx = begin_immediate(self.conn)?;
        let mut thesauri: HashMap<String, ThesaurusId> = HashMap::new();
        let mut prepared = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let name = row.thesaurus.trim().to_string();
            let thesaurus_id = match thesauri.get(&name).copied() {
                Some(id) => id,
                None => {
                    let thesaurus = load_thesaurus(&tx, "name = ?1", &name.as_str())?
                        .ok_or_else(|| CatalogError::not_found("thesaurus", &name))?;
                    thesauri.insert(name, thesaurus.id);
                    thesaurus.id
                }
            };
            let segments = split_keyword_path(&row.path)?;
            if segments.last().map(String::as_str) != Some(row.value.trim()) {
                return Err(CatalogError::InvalidArgument(format!(
                    "import row {index}: path `{}` does not end in value `{}`",
                    row.path, row.value
                )));
            }
            prepared.push((index, thesaurus_id, segments));
        }
        // Parents first; stable so siblings keep their source order.
        prepared.sort_by_key(|(_, _, segments)| segments.len());

        let mut seen = HashSet::new();
        let mut imported = Vec::with_capacity(prepared.len());
        for (index, thesaurus_id, segments) in prepared {
            let path = join_keyword_path(&segments);
            if !seen.insert((thesaurus_id, path.clone())) {
                return Err(CatalogError::ConstraintViolation(format!(
                    "import row {index}: duplicate keyword `{path}`"
                )));
            }
            if find_id_by_path(&tx, thesaurus_id, &path)?.is_some() {
                return Err(CatalogError::ConstraintViolation(format!(
                    "import row {index}: keyword `{path}` already exists"
                )));
            }

            let parent = match segments.split_last() {
                Some((_, ancestors)) if !ancestors.is_empty() => {
                    let parent_path = join_keyword_path(ancestors);
                    let parent_id = find_id_by_path(&tx, thesaurus_id, &parent_path)?
                        .ok_or_else(|| {
                            CatalogError::InvalidHierarchy(format!(
                                "import row {index}: parent `{parent_path}` of `{path}` does not exist"
                            ))
                        })?;
                    Some(load_keyword(&tx, parent_id)?)
                }
                _ => None,
            };
            let value = segments.last().map(String::as_str).unwrap_or_default();
            imported.push(insert_keyword(&tx, thesaurus_id, parent.as_ref(), value)?);
        }
        tx.commit()?;

        imported
            .into_iter()
            .map(|id| self.get_keyword(id))
            .collect()
    }

    fn ensure_path(&self, thesaurus_id: ThesaurusId, path: &str) -> CatalogResult<Vec<Keyword>> {
        let segments = split_keyword_path(path)?;
        let tx = begin_immediate(self.conn)?;
        ensure_thesaurus_exists(&tx, thesaurus_id)?;

        let mut chain_ids = Vec::with_capacity(segments.len());
        let mut parent: Option<Keyword> = None;
        for depth in 1..=segments.len() {
            let prefix = join_keyword_path(&segments[..depth]);
            let id = match find_id_by_path(&tx, thesaurus_id, &prefix)? {
                Some(id) => id,
                None => insert_keyword(&tx, thesaurus_id, parent.as_ref(), &segments[depth - 1])?,
            };
            parent = Some(load_keyword(&tx, id)?);
            chain_ids.push(id);
        }
        tx.commit()?;

        chain_ids
            .into_iter()
            .map(|id| self.get_keyword(id))
            .collect()
    }
}

fn insert_keyword(
    conn: &Connection,
    thesaurus_id: ThesaurusId,
    parent: Option<&Keyword>,
    value: &str,
) -> CatalogResult<KeywordId> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CatalogError::MissingRequiredField("value"));
    }
    if value.contains('>') {
        return Err(CatalogError::InvalidArgument(format!(
            "keyword value `{value}` must not contain `>`"
        )));
    }
    let full_path = match parent {
        Some(parent) => format!("{}{KEYWORD_PATH_SEPARATOR}{value}", parent.full_path),
        None => value.to_string(),
    };

    let uuid = new_global_id();
    conn.execute(
        "INSERT INTO keywords (uuid, value, thesaurus_id, parent_id, full_path)
         VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            uuid.to_string(),
            value,
            thesaurus_id,
            parent.map(|keyword| keyword.id),
            full_path,
        ],
    )?;
    let id = conn.last_insert_rowid();
    claim_global_id(conn, uuid, EntityKind::Keyword)?;
    Ok(id)
}

/// Walks up from `start`; true when `node` is reached.
fn is_ancestor_or_self(
    conn: &Connection,
    node: KeywordId,
    start: &Keyword,
) -> CatalogResult<bool> {
    let mut visited = HashSet::from([start.id]);
    let mut cursor = Some(start.id);
    while let Some(current) = cursor {
        if current == node {
            return Ok(true);
        }
        let parent = parent_of(conn, current)?;
        if let Some(parent) = parent {
            if !visited.insert(parent) {
                return Err(CatalogError::CorruptHierarchy(parent));
            }
        }
        cursor = parent;
    }
    Ok(false)
}

fn rewrite_descendant_paths(
    conn: &Connection,
    root: KeywordId,
    thesaurus_id: ThesaurusId,
    root_path: &str,
) -> CatalogResult<()> {
    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([(root, root_path.to_string())]);
    while let Some((current, current_path)) = queue.pop_front() {
        let mut stmt =
            conn.prepare("SELECT id, value FROM keywords WHERE parent_id = ?1 ORDER BY id;")?;
        let children = stmt
            .query_map([current], |row| {
                Ok((row.get::<_, KeywordId>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (child, value) in children {
            if !visited.insert(child) {
                return Err(CatalogError::CorruptHierarchy(child));
            }
            let child_path = format!("{current_path}{KEYWORD_PATH_SEPARATOR}{value}");
            conn.execute(
                "UPDATE keywords SET thesaurus_id = ?2, full_path = ?3 WHERE id = ?1;",
                params![child, thesaurus_id, child_path],
            )?;
            queue.push_back((child, child_path));
        }
    }
    Ok(())
}

fn parent_of(conn: &Connection, id: KeywordId) -> CatalogResult<Option<KeywordId>> {
    conn.query_row(
        "SELECT parent_id FROM keywords WHERE id = ?1;",
        [id],
        |row| row.get::<_, Option<KeywordId>>(0),
    )
    .optional()?
    .ok_or_else(|| CatalogError::not_found("keyword", id))
}

fn find_id_by_path(
    conn: &Connection,
    thesaurus_id: ThesaurusId,
    full_path: &str,
) -> CatalogResult<Option<KeywordId>> {
    Ok(conn
        .query_row(
            "SELECT id FROM keywords WHERE thesaurus_id = ?1 AND full_path = ?2;",
            params![thesaurus_id, full_path],
            |row| row.get(0),
        )
        .optional()?)
}

fn list_child_ids(conn: &Connection, id: KeywordId) -> CatalogResult<Vec<KeywordId>> {
    let mut stmt = conn.prepare("SELECT id FROM keywords WHERE parent_id = ?1 ORDER BY id;")?;
    let ids = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<KeywordId>, _>>()?;
    Ok(ids)
}

fn ensure_keyword_exists(conn: &Connection, id: KeywordId) -> CatalogResult<()> {
    parent_of(conn, id).map(|_| ())
}

fn ensure_thesaurus_exists(conn: &Connection, id: ThesaurusId) -> CatalogResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM thesauri WHERE id = ?1);",
        [id],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(CatalogError::not_found("thesaurus", id));
    }
    Ok(())
}

/// Loads one keyword with its direct children.
pub(crate) fn load_keyword(conn: &Connection, id: KeywordId) -> CatalogResult<Keyword> {
    let mut stmt = conn.prepare(&format!("{KEYWORD_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    let Some(row) = rows.next()? else {
        return Err(CatalogError::not_found("keyword", id));
    };
    let mut keyword = parse_keyword_row(row)?;
    keyword.children = list_child_ids(conn, id)?;
    Ok(keyword)
}

fn parse_keyword_row(row: &Row<'_>) -> CatalogResult<Keyword> {
    let uuid: String = row.get("uuid")?;
    Ok(Keyword {
        id: row.get("id")?,
        uuid: parse_uuid(&uuid, "keywords.uuid")?,
        value: row.get("value")?,
        thesaurus_id: row.get("thesaurus_id")?,
        parent_id: row.get("parent_id")?,
        children: Vec::new(),
        full_path: row.get("full_path")?,
    })
}

fn load_thesaurus(
    conn: &Connection,
    predicate: &str,
    value: &dyn rusqlite::ToSql,
) -> CatalogResult<Option<Thesaurus>> {
    let mut stmt = conn.prepare(&format!("{THESAURUS_SELECT_SQL} WHERE {predicate};"))?;
    let mut rows = stmt.query([value])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let uuid: String = row.get("uuid")?;
    Ok(Some(Thesaurus {
        id: row.get("id")?,
        uuid: parse_uuid(&uuid, "thesauri.uuid")?,
        name: row.get("name")?,
        title: row.get("title")?,
        organisation: row.get("organisation")?,
        url: row.get("url")?,
        description: row.get("description")?,
    }))
}
