//! Entry repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist entries together with their owned data source, scale triplets,
//!   person associations, keyword tags and details.
//! - Maintain the version chain: every row of a chain points at the one
//!   current row, which points at itself.
//! - Serve discovery queries with version and embargo filtering.
//!
//! # Invariants
//! - Creation, version advancement and deletion each commit atomically.
//! - Only the current row of a chain may be advanced to a new version.
//! - Group memberships follow the current row of a chain.
//! - Deleting an entry never deletes shared reference data.

use crate::error::{CatalogError, CatalogResult};
use crate::model::entry::{
    detail_stem, DataSource, DataSourceId, DataSourceKind, Entry, EntryDetail, EntryId,
    KeywordTag, NewDataSource, NewEntry, PersonAssociation, PersonRole, Point,
};
use crate::model::entry_group::EntryGroupId;
use crate::model::identity::{new_global_id, EntityKind, GlobalId};
use crate::model::keyword::KeywordId;
use crate::model::reference::{LicenseId, PersonId, VariableId};
use crate::model::scale::{BoundingBox, SpatialScale, TemporalExtent, TemporalScale};
use crate::repo::identity_repo::{claim_global_id, release_global_id};
use crate::repo::reference_repo::parse_person_row;
use crate::repo::{
    begin_immediate, bool_from_db, bool_to_db, ensure_schema_ready, from_epoch_ms, now_ms,
    parse_uuid, to_epoch_ms,
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Map, Value as JsonValue};

const ENTRY_SELECT_SQL: &str = "SELECT
    e.id,
    e.uuid,
    e.title,
    e.abstract,
    e.citation,
    e.external_id,
    e.location_x,
    e.location_y,
    e.geometry_wkt,
    e.license_id,
    e.variable_id,
    e.datasource_id,
    e.embargo,
    e.embargo_end,
    e.publication,
    e.last_update,
    e.version,
    e.latest_version_id,
    (
        SELECT ep.person_id
        FROM entry_persons ep
        WHERE ep.entry_id = e.id AND ep.role = 'author'
    ) AS author_id
FROM entries e";

const REQUIRED_TABLES: [&str; 8] = [
    "entries",
    "datasources",
    "temporal_scales",
    "spatial_scales",
    "entry_persons",
    "entry_keywords",
    "entry_details",
    "global_identifiers",
];

/// Which rows of a version chain a query returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionSelector {
    /// Current rows only.
    #[default]
    Latest,
    All,
    Exact(u32),
}

/// Discovery filters for [`EntryRepository::find_entries`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryQuery {
    /// Case-insensitive title substring.
    pub title: Option<String>,
    /// Case-insensitive abstract substring.
    pub abstract_text: Option<String>,
    /// Exact identifier in an external system.
    pub external_id: Option<String>,
    pub variable: Option<VariableId>,
    pub license: Option<LicenseId>,
    /// Person holding the `author` role.
    pub author: Option<PersonId>,
    /// Person holding the `author` or `coAuthor` role.
    pub coauthor: Option<PersonId>,
    /// Detail `(key, value)` pairs that must all match. Keys compare by stem,
    /// values by JSON equality.
    pub details: Vec<(String, JsonValue)>,
    /// Point location inside this box, bounds inclusive. Entries located only
    /// by a geometry never match.
    pub within: Option<BoundingBox>,
    /// Keyword or any of its descendants.
    pub keyword: Option<KeywordId>,
    pub group: Option<EntryGroupId>,
    pub version: VersionSelector,
    /// Visibility instant for embargo filtering; `None` means now.
    pub at: Option<DateTime<Utc>>,
    pub include_embargoed: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for entries and their owned parts.
pub trait EntryRepository {
    fn create_entry(&self, entry: &NewEntry) -> CatalogResult<Entry>;
    fn get_entry(&self, id: EntryId) -> CatalogResult<Entry>;
    fn get_entry_by_uuid(&self, uuid: GlobalId) -> CatalogResult<Option<Entry>>;
    /// Writes the mutable attributes of `entry` to its row.
    fn update_entry(&self, entry: &Entry) -> CatalogResult<Entry>;
    /// Inserts `candidate` as the next version of `base_id` and re-points the
    /// whole chain to it.
    fn create_version(
        &self,
        base_id: EntryId,
        candidate: &Entry,
        now: DateTime<Utc>,
    ) -> CatalogResult<Entry>;
    /// All rows sharing the chain of `id`, ordered by version.
    fn version_chain(&self, id: EntryId) -> CatalogResult<Vec<Entry>>;
    fn delete_entry(&self, id: EntryId) -> CatalogResult<()>;
    fn add_person(
        &self,
        entry_id: EntryId,
        person_id: PersonId,
        role: PersonRole,
        order: i64,
    ) -> CatalogResult<()>;
    fn list_persons(&self, entry_id: EntryId) -> CatalogResult<Vec<PersonAssociation>>;
    fn tag_keyword(
        &self,
        entry_id: EntryId,
        keyword_id: KeywordId,
        alias: Option<&str>,
    ) -> CatalogResult<()>;
    fn keywords(&self, entry_id: EntryId) -> CatalogResult<Vec<KeywordTag>>;
    /// Inserts or replaces the detail whose key normalizes to the same stem.
    fn set_detail(
        &self,
        entry_id: EntryId,
        key: &str,
        value: &JsonValue,
        description: Option<&str>,
    ) -> CatalogResult<EntryDetail>;
    fn details(&self, entry_id: EntryId) -> CatalogResult<Vec<EntryDetail>>;
    /// Replaces both scale triplets of the entry's data source wholesale.
    fn replace_scales(
        &self,
        entry_id: EntryId,
        temporal: Option<&TemporalScale>,
        spatial: Option<&SpatialScale>,
    ) -> CatalogResult<DataSource>;
    fn find_entries(&self, query: &EntryQuery) -> CatalogResult<Vec<Entry>>;
}

/// SQLite-backed entry repository.
pub struct SqliteEntryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntryRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> CatalogResult<Self> {
        ensure_schema_ready(conn, &REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl EntryRepository for SqliteEntryRepository<'_> {
    fn create_entry(&self, entry: &NewEntry) -> CatalogResult<Entry> {
        let tx = begin_immediate(self.conn)?;
        ensure_row_exists(&tx, "persons", "person", entry.author_id)?;
        ensure_references_exist(&tx, entry.variable_id, entry.license_id)?;
        for keyword_id in &entry.keywords {
            ensure_row_exists(&tx, "keywords", "keyword", *keyword_id)?;
        }

        let datasource_id = entry
            .datasource
            .as_ref()
            .map(|datasource| insert_datasource(&tx, datasource))
            .transpose()?;
        let uuid = new_global_id();
        let (location_x, location_y) = split_point(entry.location);
        tx.execute(
            "INSERT INTO entries (
                uuid,
                title,
                abstract,
                citation,
                external_id,
                location_x,
                location_y,
                geometry_wkt,
                license_id,
                variable_id,
                datasource_id,
                embargo,
                embargo_end,
                publication,
                last_update,
                version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 1);",
            params![
                uuid.to_string(),
                entry.title,
                entry.abstract_text,
                entry.citation,
                entry.external_id,
                location_x,
                location_y,
                entry.geometry,
                entry.license_id,
                entry.variable_id,
                datasource_id,
                bool_to_db(entry.embargo),
                entry.embargo_end.map(to_epoch_ms),
                to_epoch_ms(entry.publication),
                to_epoch_ms(entry.last_update),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE entries SET latest_version_id = id WHERE id = ?1;",
            [id],
        )?;
        claim_global_id(&tx, uuid, EntityKind::Entry)?;

        tx.execute(
            "INSERT INTO entry_persons (entry_id, person_id, role, order_key)
             VALUES (?1, ?2, 'author', 1);",
            params![id, entry.author_id],
        )?;
        for keyword_id in &entry.keywords {
            tx.execute(
                "INSERT INTO entry_keywords (entry_id, keyword_id) VALUES (?1, ?2);",
                params![id, keyword_id],
            )?;
        }
        tx.commit()?;

        self.get_entry(id)
    }

    fn get_entry(&self, id: EntryId) -> CatalogResult<Entry> {
        load_entry(self.conn, id)
    }

    fn get_entry_by_uuid(&self, uuid: GlobalId) -> CatalogResult<Option<Entry>> {
        let id: Option<EntryId> = self
            .conn
            .query_row(
                "SELECT id FROM entries WHERE uuid = ?1;",
                [uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|id| load_entry(self.conn, id)).transpose()
    }

    fn update_entry(&self, entry: &Entry) -> CatalogResult<Entry> {
        let tx = begin_immediate(self.conn)?;
        ensure_references_exist(&tx, entry.variable_id, entry.license_id)?;
        let (location_x, location_y) = split_point(entry.location);
        let changed = tx.execute(
            "UPDATE entries
             SET
                title = ?2,
                abstract = ?3,
                citation = ?4,
                external_id = ?5,
                location_x = ?6,
                location_y = ?7,
                geometry_wkt = ?8,
                license_id = ?9,
                variable_id = ?10,
                embargo = ?11,
                embargo_end = ?12,
                last_update = ?13
             WHERE id = ?1;",
            params![
                entry.id,
                entry.title,
                entry.abstract_text,
                entry.citation,
                entry.external_id,
                location_x,
                location_y,
                entry.geometry,
                entry.license_id,
                entry.variable_id,
                bool_to_db(entry.embargo),
                entry.embargo_end.map(to_epoch_ms),
                to_epoch_ms(entry.last_update),
            ],
        )?;
        if changed == 0 {
            return Err(CatalogError::not_found("entry", entry.id));
        }
        tx.commit()?;
        self.get_entry(entry.id)
    }

    fn create_version(
        &self,
        base_id: EntryId,
        candidate: &Entry,
        now: DateTime<Utc>,
    ) -> CatalogResult<Entry> {
        let tx = begin_immediate(self.conn)?;
        let base = load_entry(&tx, base_id)?;
        if !base.is_latest_version() {
            return Err(CatalogError::ConstraintViolation(format!(
                "entry {base_id} is version {} but the current version is entry {}",
                base.version, base.latest_version_id
            )));
        }
        ensure_references_exist(&tx, candidate.variable_id, candidate.license_id)?;

        let datasource_id = candidate
            .datasource
            .as_ref()
            .map(|datasource| insert_datasource(&tx, &NewDataSource::from(datasource)))
            .transpose()?;
        let uuid = new_global_id();
        let (location_x, location_y) = split_point(candidate.location);
        tx.execute(
            "INSERT INTO entries (
                uuid,
                title,
                abstract,
                citation,
                external_id,
                location_x,
                location_y,
                geometry_wkt,
                license_id,
                variable_id,
                datasource_id,
                embargo,
                embargo_end,
                publication,
                last_update,
                version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16);",
            params![
                uuid.to_string(),
                candidate.title,
                candidate.abstract_text,
                candidate.citation,
                candidate.external_id,
                location_x,
                location_y,
                candidate.geometry,
                candidate.license_id,
                candidate.variable_id,
                datasource_id,
                bool_to_db(candidate.embargo),
                candidate.embargo_end.map(to_epoch_ms),
                to_epoch_ms(base.publication),
                to_epoch_ms(now),
                base.version + 1,
            ],
        )?;
        let new_id = tx.last_insert_rowid();
        claim_global_id(&tx, uuid, EntityKind::Entry)?;

        tx.execute(
            "INSERT INTO entry_persons (entry_id, person_id, role, order_key)
             SELECT ?2, person_id, role, order_key
             FROM entry_persons
             WHERE entry_id = ?1;",
            params![base_id, new_id],
        )?;
        tx.execute(
            "INSERT INTO entry_keywords (entry_id, keyword_id, alias)
             SELECT ?2, keyword_id, alias
             FROM entry_keywords
             WHERE entry_id = ?1;",
            params![base_id, new_id],
        )?;
        tx.execute(
            "INSERT INTO entry_details (entry_id, key, stem, value, description)
             SELECT ?2, key, stem, value, description
             FROM entry_details
             WHERE entry_id = ?1;",
            params![base_id, new_id],
        )?;
        // Groups hold the current row of a chain; history rows leave them.
        tx.execute(
            "UPDATE entrygroup_members SET entry_id = ?2 WHERE entry_id = ?1;",
            params![base_id, new_id],
        )?;

        tx.execute(
            "UPDATE entries
             SET latest_version_id = ?2
             WHERE latest_version_id = ?1 OR id = ?2;",
            params![base_id, new_id],
        )?;
        tx.commit()?;

        self.get_entry(new_id)
    }

    fn version_chain(&self, id: EntryId) -> CatalogResult<Vec<Entry>> {
        let entry = load_entry(self.conn, id)?;
        query_entries(
            self.conn,
            &format!("{ENTRY_SELECT_SQL} WHERE e.latest_version_id = ? ORDER BY e.version ASC;"),
            vec![Value::Integer(entry.latest_version_id)],
        )
    }

    fn delete_entry(&self, id: EntryId) -> CatalogResult<()> {
        let tx = begin_immediate(self.conn)?;
        let entry = load_entry(&tx, id)?;
        let group_ids = {
            let mut stmt =
                tx.prepare("SELECT group_id FROM entrygroup_members WHERE entry_id = ?1;")?;
            let ids = stmt
                .query_map([id], |row| row.get::<_, EntryGroupId>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        if entry.is_latest_version() {
            let successor: Option<EntryId> = tx
                .query_row(
                    "SELECT id
                     FROM entries
                     WHERE latest_version_id = ?1 AND id != ?1
                     ORDER BY version DESC
                     LIMIT 1;",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(successor) = successor {
                tx.execute(
                    "UPDATE entries SET latest_version_id = ?2 WHERE latest_version_id = ?1;",
                    params![id, successor],
                )?;
                tx.execute(
                    "UPDATE entrygroup_members SET entry_id = ?2 WHERE entry_id = ?1;",
                    params![id, successor],
                )?;
            }
        }

        tx.execute("DELETE FROM entries WHERE id = ?1;", [id])?;
        if let Some(datasource) = &entry.datasource {
            delete_datasource(&tx, datasource.id)?;
        }
        release_global_id(&tx, entry.uuid)?;

        for group_id in group_ids {
            let remaining: i64 = tx.query_row(
                "SELECT COUNT(*) FROM entrygroup_members WHERE group_id = ?1;",
                [group_id],
                |row| row.get(0),
            )?;
            if remaining == 0 {
                let uuid: String = tx.query_row(
                    "SELECT uuid FROM entrygroups WHERE id = ?1;",
                    [group_id],
                    |row| row.get(0),
                )?;
                tx.execute("DELETE FROM entrygroups WHERE id = ?1;", [group_id])?;
                release_global_id(&tx, parse_uuid(&uuid, "entrygroups.uuid")?)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn add_person(
        &self,
        entry_id: EntryId,
        person_id: PersonId,
        role: PersonRole,
        order: i64,
    ) -> CatalogResult<()> {
        if order < 1 {
            return Err(CatalogError::InvalidArgument(format!(
                "association order must start at 1, got {order}"
            )));
        }
        let tx = begin_immediate(self.conn)?;
        ensure_row_exists(&tx, "entries", "entry", entry_id)?;
        ensure_row_exists(&tx, "persons", "person", person_id)?;
        tx.execute(
            "INSERT INTO entry_persons (entry_id, person_id, role, order_key)
             VALUES (?1, ?2, ?3, ?4);",
            params![entry_id, person_id, role.as_str(), order],
        )?;
        touch_entry(&tx, entry_id)?;
        tx.commit()?;
        Ok(())
    }

    fn list_persons(&self, entry_id: EntryId) -> CatalogResult<Vec<PersonAssociation>> {
        ensure_row_exists(self.conn, "entries", "entry", entry_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT
                p.id AS id,
                p.uuid AS uuid,
                p.is_organisation AS is_organisation,
                p.first_name AS first_name,
                p.last_name AS last_name,
                p.organisation_name AS organisation_name,
                p.affiliation AS affiliation,
                ep.role AS role,
                ep.order_key AS order_key
             FROM entry_persons ep
             INNER JOIN persons p ON p.id = ep.person_id
             WHERE ep.entry_id = ?1
             ORDER BY
                CASE ep.role
                    WHEN 'author' THEN 0
                    WHEN 'coAuthor' THEN 1
                    WHEN 'contributor' THEN 2
                    WHEN 'editor' THEN 3
                    WHEN 'publisher' THEN 4
                    WHEN 'rightHolder' THEN 5
                    WHEN 'owner' THEN 6
                    ELSE 7
                END,
                ep.order_key ASC;",
        )?;
        let mut rows = stmt.query([entry_id])?;
        let mut associations = Vec::new();
        while let Some(row) = rows.next()? {
            let role_text: String = row.get("role")?;
            let role = PersonRole::from_db(&role_text).ok_or_else(|| {
                CatalogError::InvalidData(format!(
                    "invalid role `{role_text}` in entry_persons.role"
                ))
            })?;
            associations.push(PersonAssociation {
                person: parse_person_row(row)?,
                role,
                order: row.get("order_key")?,
            });
        }
        Ok(associations)
    }

    fn tag_keyword(
        &self,
        entry_id: EntryId,
        keyword_id: KeywordId,
        alias: Option<&str>,
    ) -> CatalogResult<()> {
        let tx = begin_immediate(self.conn)?;
        ensure_row_exists(&tx, "entries", "entry", entry_id)?;
        ensure_row_exists(&tx, "keywords", "keyword", keyword_id)?;
        tx.execute(
            "INSERT INTO entry_keywords (entry_id, keyword_id, alias)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (entry_id, keyword_id) DO UPDATE SET alias = excluded.alias;",
            params![
                entry_id,
                keyword_id,
                alias.map(str::trim).filter(|value| !value.is_empty()),
            ],
        )?;
        touch_entry(&tx, entry_id)?;
        tx.commit()?;
        Ok(())
    }

    fn keywords(&self, entry_id: EntryId) -> CatalogResult<Vec<KeywordTag>> {
        ensure_row_exists(self.conn, "entries", "entry", entry_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT k.id, k.uuid, k.full_path, ek.alias
             FROM entry_keywords ek
             INNER JOIN keywords k ON k.id = ek.keyword_id
             WHERE ek.entry_id = ?1
             ORDER BY k.full_path ASC;",
        )?;
        let mut rows = stmt.query([entry_id])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid: String = row.get("uuid")?;
            tags.push(KeywordTag {
                keyword_id: row.get("id")?,
                uuid: parse_uuid(&uuid, "keywords.uuid")?,
                full_path: row.get("full_path")?,
                alias: row.get("alias")?,
            });
        }
        Ok(tags)
    }

    fn set_detail(
        &self,
        entry_id: EntryId,
        key: &str,
        value: &JsonValue,
        description: Option<&str>,
    ) -> CatalogResult<EntryDetail> {
        let stem = detail_stem(key);
        if stem.is_empty() {
            return Err(CatalogError::MissingRequiredField("key"));
        }
        let encoded = serde_json::to_string(value)
            .map_err(|err| CatalogError::InvalidArgument(format!("detail `{key}`: {err}")))?;

        let tx = begin_immediate(self.conn)?;
        ensure_row_exists(&tx, "entries", "entry", entry_id)?;
        tx.execute(
            "INSERT INTO entry_details (entry_id, key, stem, value, description)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (entry_id, stem) DO UPDATE SET
                key = excluded.key,
                value = excluded.value,
                description = excluded.description;",
            params![entry_id, key.trim(), stem, encoded, description],
        )?;
        touch_entry(&tx, entry_id)?;
        tx.commit()?;

        self.details(entry_id)?
            .into_iter()
            .find(|detail| detail.stem == stem)
            .ok_or_else(|| CatalogError::not_found("entry detail", &stem))
    }

    fn details(&self, entry_id: EntryId) -> CatalogResult<Vec<EntryDetail>> {
        ensure_row_exists(self.conn, "entries", "entry", entry_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, key, stem, value, description
             FROM entry_details
             WHERE entry_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([entry_id])?;
        let mut details = Vec::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get("value")?;
            let value = serde_json::from_str(&raw).map_err(|err| {
                CatalogError::InvalidData(format!("invalid json in entry_details.value: {err}"))
            })?;
            details.push(EntryDetail {
                id: row.get("id")?,
                key: row.get("key")?,
                stem: row.get("stem")?,
                value,
                description: row.get("description")?,
            });
        }
        Ok(details)
    }

    fn replace_scales(
        &self,
        entry_id: EntryId,
        temporal: Option<&TemporalScale>,
        spatial: Option<&SpatialScale>,
    ) -> CatalogResult<DataSource> {
        let tx = begin_immediate(self.conn)?;
        let entry = load_entry(&tx, entry_id)?;
        let datasource = entry.datasource.ok_or_else(|| {
            CatalogError::InvalidArgument(format!("entry {entry_id} has no data source"))
        })?;
        let (old_temporal, old_spatial): (Option<i64>, Option<i64>) = tx.query_row(
            "SELECT temporal_scale_id, spatial_scale_id FROM datasources WHERE id = ?1;",
            [datasource.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let temporal_id = temporal
            .map(|scale| insert_temporal_scale(&tx, scale))
            .transpose()?;
        let spatial_id = spatial
            .map(|scale| insert_spatial_scale(&tx, scale))
            .transpose()?;
        tx.execute(
            "UPDATE datasources SET temporal_scale_id = ?2, spatial_scale_id = ?3 WHERE id = ?1;",
            params![datasource.id, temporal_id, spatial_id],
        )?;
        delete_scales(&tx, old_temporal, old_spatial)?;
        touch_entry(&tx, entry_id)?;
        tx.commit()?;

        load_datasource(self.conn, datasource.id)
    }

    fn find_entries(&self, query: &EntryQuery) -> CatalogResult<Vec<Entry>> {
        let mut sql = format!("{ENTRY_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        match query.version {
            VersionSelector::Latest => sql.push_str(" AND e.latest_version_id = e.id"),
            VersionSelector::All => {}
            VersionSelector::Exact(version) => {
                sql.push_str(" AND e.version = ?");
                bind_values.push(Value::Integer(i64::from(version)));
            }
        }
        if !query.include_embargoed {
            sql.push_str(" AND (e.embargo = 0 OR e.embargo_end IS NULL OR e.embargo_end <= ?)");
            let at = query.at.unwrap_or_else(Utc::now);
            bind_values.push(Value::Integer(to_epoch_ms(at)));
        }
        if let Some(title) = query.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            sql.push_str(" AND e.title LIKE ? ESCAPE '\\'");
            bind_values.push(Value::Text(format!("%{}%", escape_like(title))));
        }
        if let Some(text) = query
            .abstract_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            sql.push_str(" AND e.abstract LIKE ? ESCAPE '\\'");
            bind_values.push(Value::Text(format!("%{}%", escape_like(text))));
        }
        if let Some(external_id) = query.external_id.as_deref() {
            sql.push_str(" AND e.external_id = ?");
            bind_values.push(Value::Text(external_id.trim().to_string()));
        }
        if let Some(bbox) = query.within {
            if !bbox.is_valid() {
                return Err(CatalogError::InvalidArgument(format!(
                    "search box {bbox:?} must be finite with min <= max"
                )));
            }
            sql.push_str(" AND e.location_x BETWEEN ? AND ? AND e.location_y BETWEEN ? AND ?");
            bind_values.extend([
                Value::Real(bbox.min_x),
                Value::Real(bbox.max_x),
                Value::Real(bbox.min_y),
                Value::Real(bbox.max_y),
            ]);
        }
        if let Some(variable) = query.variable {
            sql.push_str(" AND e.variable_id = ?");
            bind_values.push(Value::Integer(variable));
        }
        if let Some(license) = query.license {
            sql.push_str(" AND e.license_id = ?");
            bind_values.push(Value::Integer(license));
        }
        if let Some(author) = query.author {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1 FROM entry_persons ep
                    WHERE ep.entry_id = e.id AND ep.role = 'author' AND ep.person_id = ?
                )",
            );
            bind_values.push(Value::Integer(author));
        }
        if let Some(coauthor) = query.coauthor {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1 FROM entry_persons ep
                    WHERE ep.entry_id = e.id
                      AND ep.role IN ('author', 'coAuthor')
                      AND ep.person_id = ?
                )",
            );
            bind_values.push(Value::Integer(coauthor));
        }
        for (key, value) in &query.details {
            let stem = detail_stem(key);
            if stem.is_empty() {
                return Err(CatalogError::MissingRequiredField("key"));
            }
            let encoded = serde_json::to_string(value)
                .map_err(|err| CatalogError::InvalidArgument(format!("detail `{key}`: {err}")))?;
            sql.push_str(
                " AND EXISTS (
                    SELECT 1 FROM entry_details d
                    WHERE d.entry_id = e.id AND d.stem = ? AND d.value = ?
                )",
            );
            bind_values.push(Value::Text(stem));
            bind_values.push(Value::Text(encoded));
        }
        if let Some(keyword) = query.keyword {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1
                    FROM entry_keywords ek
                    INNER JOIN keywords k ON k.id = ek.keyword_id
                    INNER JOIN keywords q ON q.id = ?
                    WHERE ek.entry_id = e.id
                      AND k.thesaurus_id = q.thesaurus_id
                      AND (
                        k.id = q.id
                        OR substr(k.full_path, 1, length(q.full_path) + 3) = q.full_path || ' > '
                      )
                )",
            );
            bind_values.push(Value::Integer(keyword));
        }
        if let Some(group) = query.group {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1 FROM entrygroup_members m
                    WHERE m.entry_id = e.id AND m.group_id = ?
                )",
            );
            bind_values.push(Value::Integer(group));
        }

        sql.push_str(" ORDER BY e.id ASC");
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1");
        }
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        query_entries(self.conn, &sql, bind_values)
    }
}

/// Loads one entry with its data source.
pub(crate) fn load_entry(conn: &Connection, id: EntryId) -> CatalogResult<Entry> {
    query_entries(
        conn,
        &format!("{ENTRY_SELECT_SQL} WHERE e.id = ?;"),
        vec![Value::Integer(id)],
    )?
    .pop()
    .ok_or_else(|| CatalogError::not_found("entry", id))
}

fn query_entries(
    conn: &Connection,
    sql: &str,
    bind_values: Vec<Value>,
) -> CatalogResult<Vec<Entry>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let datasource_id: Option<DataSourceId> = row.get("datasource_id")?;
        let mut entry = parse_entry_row(row)?;
        entry.datasource = datasource_id
            .map(|id| load_datasource(conn, id))
            .transpose()?;
        entries.push(entry);
    }
    Ok(entries)
}

fn parse_entry_row(row: &Row<'_>) -> CatalogResult<Entry> {
    let id: EntryId = row.get("id")?;
    let uuid: String = row.get("uuid")?;
    let location = match (
        row.get::<_, Option<f64>>("location_x")?,
        row.get::<_, Option<f64>>("location_y")?,
    ) {
        (Some(x), Some(y)) => Some(Point::new(x, y)),
        (None, None) => None,
        _ => {
            return Err(CatalogError::InvalidData(format!(
                "entry {id} has a half-set location"
            )))
        }
    };
    let author_id: Option<PersonId> = row.get("author_id")?;
    let version: i64 = row.get("version")?;
    let latest_version_id: Option<EntryId> = row.get("latest_version_id")?;

    Ok(Entry {
        id,
        uuid: parse_uuid(&uuid, "entries.uuid")?,
        title: row.get("title")?,
        abstract_text: row.get("abstract")?,
        citation: row.get("citation")?,
        external_id: row.get("external_id")?,
        location,
        geometry: row.get("geometry_wkt")?,
        license_id: row.get("license_id")?,
        variable_id: row.get("variable_id")?,
        author_id: author_id
            .ok_or_else(|| CatalogError::InvalidData(format!("entry {id} has no author")))?,
        datasource: None,
        embargo: bool_from_db(row.get("embargo")?, "entries.embargo")?,
        embargo_end: row
            .get::<_, Option<i64>>("embargo_end")?
            .map(|value| from_epoch_ms(value, "entries.embargo_end"))
            .transpose()?,
        publication: from_epoch_ms(row.get("publication")?, "entries.publication")?,
        last_update: from_epoch_ms(row.get("last_update")?, "entries.last_update")?,
        version: u32::try_from(version).map_err(|_| {
            CatalogError::InvalidData(format!("invalid version {version} in entries.version"))
        })?,
        latest_version_id: latest_version_id.ok_or_else(|| {
            CatalogError::InvalidData(format!("entry {id} is not linked to a version chain"))
        })?,
    })
}

fn insert_datasource(
    conn: &Connection,
    datasource: &NewDataSource,
) -> CatalogResult<DataSourceId> {
    let path = datasource.path.trim();
    if path.is_empty() {
        return Err(CatalogError::MissingRequiredField("path"));
    }
    let args = serde_json::to_string(&datasource.args)
        .map_err(|err| CatalogError::InvalidArgument(format!("data source args: {err}")))?;
    let temporal_id = datasource
        .temporal_scale
        .as_ref()
        .map(|scale| insert_temporal_scale(conn, scale))
        .transpose()?;
    let spatial_id = datasource
        .spatial_scale
        .as_ref()
        .map(|scale| insert_spatial_scale(conn, scale))
        .transpose()?;

    conn.execute(
        "INSERT INTO datasources (kind, path, args, encoding, temporal_scale_id, spatial_scale_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            datasource.kind.as_str(),
            path,
            args,
            datasource.encoding_or_default(),
            temporal_id,
            spatial_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_temporal_scale(conn: &Connection, scale: &TemporalScale) -> CatalogResult<i64> {
    let extent = scale.extent();
    conn.execute(
        "INSERT INTO temporal_scales (resolution_ms, observation_start, observation_end, support)
         VALUES (?1, ?2, ?3, ?4);",
        params![
            scale.resolution_ms(),
            to_epoch_ms(extent.start),
            to_epoch_ms(extent.end),
            scale.support(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_spatial_scale(conn: &Connection, scale: &SpatialScale) -> CatalogResult<i64> {
    let extent = scale.extent();
    conn.execute(
        "INSERT INTO spatial_scales (resolution_m, min_x, min_y, max_x, max_y, support)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            scale.resolution_m(),
            extent.min_x,
            extent.min_y,
            extent.max_x,
            extent.max_y,
            scale.support(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn load_datasource(conn: &Connection, id: DataSourceId) -> CatalogResult<DataSource> {
    let mut stmt = conn.prepare(
        "SELECT
            d.id,
            d.kind,
            d.path,
            d.args,
            d.encoding,
            t.resolution_ms,
            t.observation_start,
            t.observation_end,
            t.support AS temporal_support,
            s.resolution_m,
            s.min_x,
            s.min_y,
            s.max_x,
            s.max_y,
            s.support AS spatial_support
         FROM datasources d
         LEFT JOIN temporal_scales t ON t.id = d.temporal_scale_id
         LEFT JOIN spatial_scales s ON s.id = d.spatial_scale_id
         WHERE d.id = ?1;",
    )?;
    let mut rows = stmt.query([id])?;
    let Some(row) = rows.next()? else {
        return Err(CatalogError::not_found("data source", id));
    };

    let kind_text: String = row.get("kind")?;
    let kind = DataSourceKind::from_db(&kind_text).ok_or_else(|| {
        CatalogError::InvalidData(format!("invalid kind `{kind_text}` in datasources.kind"))
    })?;
    let args_text: String = row.get("args")?;
    let args: Map<String, JsonValue> = serde_json::from_str(&args_text).map_err(|err| {
        CatalogError::InvalidData(format!("invalid json object in datasources.args: {err}"))
    })?;

    let temporal_scale = match row.get::<_, Option<i64>>("resolution_ms")? {
        Some(resolution_ms) => {
            let extent = TemporalExtent {
                start: from_epoch_ms(
                    row.get("observation_start")?,
                    "temporal_scales.observation_start",
                )?,
                end: from_epoch_ms(
                    row.get("observation_end")?,
                    "temporal_scales.observation_end",
                )?,
            };
            let scale = TemporalScale::new(
                Duration::milliseconds(resolution_ms),
                extent,
                Some(row.get("temporal_support")?),
            )
            .map_err(|err| CatalogError::InvalidData(err.to_string()))?;
            Some(scale)
        }
        None => None,
    };
    let spatial_scale = match row.get::<_, Option<f64>>("resolution_m")? {
        Some(resolution_m) => {
            let extent = BoundingBox {
                min_x: row.get("min_x")?,
                min_y: row.get("min_y")?,
                max_x: row.get("max_x")?,
                max_y: row.get("max_y")?,
            };
            let scale = SpatialScale::new(resolution_m, extent, Some(row.get("spatial_support")?))
                .map_err(|err| CatalogError::InvalidData(err.to_string()))?;
            Some(scale)
        }
        None => None,
    };

    Ok(DataSource {
        id: row.get("id")?,
        kind,
        path: row.get("path")?,
        args,
        encoding: row.get("encoding")?,
        temporal_scale,
        spatial_scale,
    })
}

fn delete_datasource(conn: &Connection, id: DataSourceId) -> CatalogResult<()> {
    let (temporal_id, spatial_id): (Option<i64>, Option<i64>) = conn.query_row(
        "SELECT temporal_scale_id, spatial_scale_id FROM datasources WHERE id = ?1;",
        [id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    conn.execute("DELETE FROM datasources WHERE id = ?1;", [id])?;
    delete_scales(conn, temporal_id, spatial_id)
}

fn delete_scales(
    conn: &Connection,
    temporal_id: Option<i64>,
    spatial_id: Option<i64>,
) -> CatalogResult<()> {
    if let Some(temporal_id) = temporal_id {
        conn.execute("DELETE FROM temporal_scales WHERE id = ?1;", [temporal_id])?;
    }
    if let Some(spatial_id) = spatial_id {
        conn.execute("DELETE FROM spatial_scales WHERE id = ?1;", [spatial_id])?;
    }
    Ok(())
}

fn touch_entry(conn: &Connection, id: EntryId) -> CatalogResult<()> {
    conn.execute(
        "UPDATE entries SET last_update = ?2 WHERE id = ?1;",
        params![id, to_epoch_ms(now_ms())],
    )?;
    Ok(())
}

fn ensure_references_exist(
    conn: &Connection,
    variable_id: VariableId,
    license_id: LicenseId,
) -> CatalogResult<()> {
    ensure_row_exists(conn, "variables", "variable", variable_id)?;
    ensure_row_exists(conn, "licenses", "license", license_id)
}

/// Fails with `NotFound { kind }` when `table` has no row with `id`.
pub(crate) fn ensure_row_exists(
    conn: &Connection,
    table: &'static str,
    kind: &'static str,
    id: i64,
) -> CatalogResult<()> {
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1);"),
        [id],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(CatalogError::not_found(kind, id));
    }
    Ok(())
}

fn split_point(point: Option<Point>) -> (Option<f64>, Option<f64>) {
    match point {
        Some(point) => (Some(point.x), Some(point.y)),
        None => (None, None),
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
