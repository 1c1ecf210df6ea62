//! Entry group repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist typed groups and their ordered membership.
//! - Enforce membership invariants inside the writing transaction.
//!
//! # Invariants
//! - An entry belongs to at most one Split group; the check runs under the
//!   writer lock and is backed by a partial unique index.
//! - Members are current rows of their version chain.
//! - A stored group always has at least one member; removing the last one
//!   deletes the group and releases its identifier.

use crate::error::{CatalogError, CatalogResult};
use crate::model::entry::EntryId;
use crate::model::entry_group::{EntryGroup, EntryGroupId, GroupType, NewEntryGroup};
use crate::model::identity::{new_global_id, EntityKind, GlobalId};
use crate::repo::entry_repo::ensure_row_exists;
use crate::repo::identity_repo::{claim_global_id, release_global_id};
use crate::repo::{
    begin_immediate, bool_to_db, ensure_schema_ready, from_epoch_ms, now_ms, parse_uuid,
    to_epoch_ms,
};
use rusqlite::{params, Connection, OptionalExtension};

const GROUP_SELECT_SQL: &str = "SELECT
    g.id,
    g.uuid,
    t.name AS type_name,
    g.title,
    g.description,
    g.publication,
    g.last_update
FROM entrygroups g
INNER JOIN entrygroup_types t ON t.id = g.type_id";

/// Repository interface for entry groups.
pub trait EntryGroupRepository {
    /// Stores a caller-defined group type; built-in names are rejected.
    fn register_group_type(&self, name: &str, description: &str) -> CatalogResult<GroupType>;
    fn list_group_types(&self) -> CatalogResult<Vec<GroupType>>;
    /// Creates a group and adds `members` in order, all in one transaction.
    fn create_group(&self, group: &NewEntryGroup) -> CatalogResult<EntryGroup>;
    fn get_group(&self, id: EntryGroupId) -> CatalogResult<EntryGroup>;
    fn get_group_by_uuid(&self, uuid: GlobalId) -> CatalogResult<Option<EntryGroup>>;
    /// Adds one member. Re-adding an existing member is a no-op.
    fn add_member(&self, group_id: EntryGroupId, entry_id: EntryId) -> CatalogResult<EntryGroup>;
    /// Removes one member; returns `None` when the group was deleted.
    fn remove_member(
        &self,
        group_id: EntryGroupId,
        entry_id: EntryId,
    ) -> CatalogResult<Option<EntryGroup>>;
    /// Groups containing `entry_id`, ordered by id.
    fn groups_of(&self, entry_id: EntryId) -> CatalogResult<Vec<EntryGroup>>;
}

/// SQLite-backed entry group repository.
pub struct SqliteEntryGroupRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntryGroupRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> CatalogResult<Self> {
        ensure_schema_ready(
            conn,
            &[
                "entries",
                "entrygroup_types",
                "entrygroups",
                "entrygroup_members",
                "global_identifiers",
            ],
        )?;
        Ok(Self { conn })
    }
}

impl EntryGroupRepository for SqliteEntryGroupRepository<'_> {
    fn register_group_type(&self, name: &str, description: &str) -> CatalogResult<GroupType> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::MissingRequiredField("name"));
        }
        let group_type = GroupType::from_name(name);
        if !matches!(group_type, GroupType::Custom(_)) {
            return Err(CatalogError::ConstraintViolation(format!(
                "group type `{name}` is built in"
            )));
        }
        self.conn.execute(
            "INSERT INTO entrygroup_types (name, description) VALUES (?1, ?2);",
            params![name, description.trim()],
        )?;
        Ok(group_type)
    }

    fn list_group_types(&self) -> CatalogResult<Vec<GroupType>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM entrygroup_types ORDER BY id ASC;")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names.iter().map(|name| GroupType::from_name(name)).collect())
    }

    fn create_group(&self, group: &NewEntryGroup) -> CatalogResult<EntryGroup> {
        if group.members.is_empty() {
            return Err(CatalogError::MissingRequiredField("members"));
        }
        let tx = begin_immediate(self.conn)?;
        let type_id: i64 = tx
            .query_row(
                "SELECT id FROM entrygroup_types WHERE name = ?1;",
                [group.group_type.name()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| CatalogError::not_found("group type", group.group_type.name()))?;

        let uuid = new_global_id();
        let now = to_epoch_ms(now_ms());
        tx.execute(
            "INSERT INTO entrygroups (uuid, type_id, title, description, publication, last_update)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5);",
            params![uuid.to_string(), type_id, group.title, group.description, now],
        )?;
        let id = tx.last_insert_rowid();
        claim_global_id(&tx, uuid, EntityKind::EntryGroup)?;
        for entry_id in &group.members {
            insert_member(&tx, id, &group.group_type, *entry_id)?;
        }
        tx.commit()?;

        self.get_group(id)
    }

    fn get_group(&self, id: EntryGroupId) -> CatalogResult<EntryGroup> {
        load_group(self.conn, id)
    }

    fn get_group_by_uuid(&self, uuid: GlobalId) -> CatalogResult<Option<EntryGroup>> {
        let id: Option<EntryGroupId> = self
            .conn
            .query_row(
                "SELECT id FROM entrygroups WHERE uuid = ?1;",
                [uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|id| load_group(self.conn, id)).transpose()
    }

    fn add_member(&self, group_id: EntryGroupId, entry_id: EntryId) -> CatalogResult<EntryGroup> {
        let tx = begin_immediate(self.conn)?;
        let group = load_group(&tx, group_id)?;
        if insert_member(&tx, group_id, &group.group_type, entry_id)? {
            tx.execute(
                "UPDATE entrygroups SET last_update = ?2 WHERE id = ?1;",
                params![group_id, to_epoch_ms(now_ms())],
            )?;
        }
        tx.commit()?;
        self.get_group(group_id)
    }

    fn remove_member(
        &self,
        group_id: EntryGroupId,
        entry_id: EntryId,
    ) -> CatalogResult<Option<EntryGroup>> {
        let tx = begin_immediate(self.conn)?;
        let group = load_group(&tx, group_id)?;
        let removed = tx.execute(
            "DELETE FROM entrygroup_members WHERE group_id = ?1 AND entry_id = ?2;",
            params![group_id, entry_id],
        )?;
        if removed == 0 {
            return Err(CatalogError::not_found(
                "group member",
                format!("{group_id}/{entry_id}"),
            ));
        }

        let deleted = group.members.len() == 1;
        if deleted {
            tx.execute("DELETE FROM entrygroups WHERE id = ?1;", [group_id])?;
            release_global_id(&tx, group.uuid)?;
        } else {
            tx.execute(
                "UPDATE entrygroups SET last_update = ?2 WHERE id = ?1;",
                params![group_id, to_epoch_ms(now_ms())],
            )?;
        }
        tx.commit()?;

        if deleted {
            Ok(None)
        } else {
            self.get_group(group_id).map(Some)
        }
    }

    fn groups_of(&self, entry_id: EntryId) -> CatalogResult<Vec<EntryGroup>> {
        ensure_row_exists(self.conn, "entries", "entry", entry_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT group_id FROM entrygroup_members WHERE entry_id = ?1 ORDER BY group_id ASC;",
        )?;
        let ids = stmt
            .query_map([entry_id], |row| row.get::<_, EntryGroupId>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids.into_iter()
            .map(|id| load_group(self.conn, id))
            .collect()
    }
}

/// Inserts one membership row; `Ok(false)` when it already existed.
fn insert_member(
    conn: &Connection,
    group_id: EntryGroupId,
    group_type: &GroupType,
    entry_id: EntryId,
) -> CatalogResult<bool> {
    let latest: EntryId = conn
        .query_row(
            "SELECT latest_version_id FROM entries WHERE id = ?1;",
            [entry_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| CatalogError::not_found("entry", entry_id))?;
    if latest != entry_id {
        return Err(CatalogError::ConstraintViolation(format!(
            "entry {entry_id} is a history row; its current version is entry {latest}"
        )));
    }
    let already_member: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM entrygroup_members WHERE group_id = ?1 AND entry_id = ?2
        );",
        params![group_id, entry_id],
        |row| row.get(0),
    )?;
    if already_member == 1 {
        return Ok(false);
    }

    if group_type.is_split() {
        let other: Option<EntryGroupId> = conn
            .query_row(
                "SELECT group_id FROM entrygroup_members WHERE entry_id = ?1 AND is_split = 1;",
                [entry_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(other) = other {
            return Err(CatalogError::ConstraintViolation(format!(
                "entry {entry_id} already belongs to split group {other}"
            )));
        }
    }

    conn.execute(
        "INSERT INTO entrygroup_members (group_id, entry_id, is_split, sort_order)
         VALUES (
            ?1,
            ?2,
            ?3,
            (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM entrygroup_members WHERE group_id = ?1)
         );",
        params![group_id, entry_id, bool_to_db(group_type.is_split())],
    )?;
    Ok(true)
}

fn load_group(conn: &Connection, id: EntryGroupId) -> CatalogResult<EntryGroup> {
    let mut stmt = conn.prepare(&format!("{GROUP_SELECT_SQL} WHERE g.id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    let Some(row) = rows.next()? else {
        return Err(CatalogError::not_found("entry group", id));
    };
    let uuid: String = row.get("uuid")?;
    let type_name: String = row.get("type_name")?;
    let mut group = EntryGroup {
        id: row.get("id")?,
        uuid: parse_uuid(&uuid, "entrygroups.uuid")?,
        group_type: GroupType::from_name(&type_name),
        title: row.get("title")?,
        description: row.get("description")?,
        members: Vec::new(),
        publication: from_epoch_ms(row.get("publication")?, "entrygroups.publication")?,
        last_update: from_epoch_ms(row.get("last_update")?, "entrygroups.last_update")?,
    };

    let mut member_stmt = conn.prepare(
        "SELECT entry_id
         FROM entrygroup_members
         WHERE group_id = ?1
         ORDER BY sort_order ASC, entry_id ASC;",
    )?;
    group.members = member_stmt
        .query_map([id], |row| row.get::<_, EntryId>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(group)
}
