//! Reference data repository: units, variables, licenses and persons.
//!
//! # Invariants
//! - Reference rows are shared by entries and never deleted through them.
//! - `get_*` of an absent id fails with `NotFound`.

use crate::error::{CatalogError, CatalogResult};
use crate::model::identity::new_global_id;
use crate::model::reference::{
    License, LicenseId, NewLicense, NewPerson, NewUnit, NewVariable, Person, PersonId, Unit,
    UnitId, Variable, VariableId,
};
use crate::repo::{bool_from_db, bool_to_db, ensure_schema_ready, parse_uuid};
use rusqlite::{params, Connection, OptionalExtension, Row};

const REQUIRED_TABLES: [&str; 4] = ["units", "variables", "licenses", "persons"];

/// Repository interface for reference data.
pub trait ReferenceRepository {
    fn create_unit(&self, unit: &NewUnit) -> CatalogResult<Unit>;
    fn get_unit(&self, id: UnitId) -> CatalogResult<Unit>;
    /// Units whose name (case-insensitive) or symbol equals `name_or_symbol`.
    fn find_units(&self, name_or_symbol: &str) -> CatalogResult<Vec<Unit>>;
    fn create_variable(&self, variable: &NewVariable) -> CatalogResult<Variable>;
    fn get_variable(&self, id: VariableId) -> CatalogResult<Variable>;
    /// Variables whose name (case-insensitive) or symbol equals `name_or_symbol`.
    fn find_variables(&self, name_or_symbol: &str) -> CatalogResult<Vec<Variable>>;
    fn create_license(&self, license: &NewLicense) -> CatalogResult<License>;
    fn get_license(&self, id: LicenseId) -> CatalogResult<License>;
    /// Looks up a license by its unique short title.
    fn find_license(&self, short_title: &str) -> CatalogResult<Option<License>>;
    fn create_person(&self, person: &NewPerson) -> CatalogResult<Person>;
    fn get_person(&self, id: PersonId) -> CatalogResult<Person>;
    /// Persons whose first, last or organisation name equals `name`,
    /// ignoring case.
    fn find_persons(&self, name: &str) -> CatalogResult<Vec<Person>>;
}

/// SQLite-backed reference data repository.
pub struct SqliteReferenceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReferenceRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> CatalogResult<Self> {
        ensure_schema_ready(conn, &REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl ReferenceRepository for SqliteReferenceRepository<'_> {
    fn create_unit(&self, unit: &NewUnit) -> CatalogResult<Unit> {
        let name = required_text(&unit.name, "name")?;
        let symbol = required_text(&unit.symbol, "symbol")?;
        self.conn.execute(
            "INSERT INTO units (name, symbol) VALUES (?1, ?2);",
            params![name, symbol],
        )?;
        self.get_unit(self.conn.last_insert_rowid())
    }

    fn get_unit(&self, id: UnitId) -> CatalogResult<Unit> {
        self.conn
            .query_row(
                "SELECT id, name, symbol FROM units WHERE id = ?1;",
                [id],
                parse_unit_row,
            )
            .optional()?
            .ok_or_else(|| CatalogError::not_found("unit", id))
    }

    fn find_units(&self, name_or_symbol: &str) -> CatalogResult<Vec<Unit>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, symbol
             FROM units
             WHERE name = ?1 COLLATE NOCASE OR symbol = ?1
             ORDER BY id ASC;",
        )?;
        let units = stmt
            .query_map([name_or_symbol.trim()], parse_unit_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(units)
    }

    fn create_variable(&self, variable: &NewVariable) -> CatalogResult<Variable> {
        let name = required_text(&variable.name, "name")?;
        let symbol = required_text(&variable.symbol, "symbol")?;
        self.get_unit(variable.unit_id)?;
        self.conn.execute(
            "INSERT INTO variables (name, symbol, unit_id, keyword_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![name, symbol, variable.unit_id, variable.keyword_id],
        )?;
        self.get_variable(self.conn.last_insert_rowid())
    }

    fn get_variable(&self, id: VariableId) -> CatalogResult<Variable> {
        self.conn
            .query_row(
                "SELECT id, name, symbol, unit_id, keyword_id FROM variables WHERE id = ?1;",
                [id],
                parse_variable_row,
            )
            .optional()?
            .ok_or_else(|| CatalogError::not_found("variable", id))
    }

    fn find_variables(&self, name_or_symbol: &str) -> CatalogResult<Vec<Variable>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, symbol, unit_id, keyword_id
             FROM variables
             WHERE name = ?1 COLLATE NOCASE OR symbol = ?1
             ORDER BY id ASC;",
        )?;
        let variables = stmt
            .query_map([name_or_symbol.trim()], parse_variable_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(variables)
    }

    fn create_license(&self, license: &NewLicense) -> CatalogResult<License> {
        let short_title = required_text(&license.short_title, "short_title")?;
        let title = required_text(&license.title, "title")?;
        self.conn.execute(
            "INSERT INTO licenses (
                short_title,
                title,
                summary,
                link,
                by_attribution,
                share_alike,
                commercial_use
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                short_title,
                title,
                license.summary,
                license.link,
                license.by_attribution.map(bool_to_db),
                license.share_alike.map(bool_to_db),
                license.commercial_use.map(bool_to_db),
            ],
        )?;
        self.get_license(self.conn.last_insert_rowid())
    }

    fn get_license(&self, id: LicenseId) -> CatalogResult<License> {
        self.query_license("id = ?1", id)?
            .ok_or_else(|| CatalogError::not_found("license", id))
    }

    fn find_license(&self, short_title: &str) -> CatalogResult<Option<License>> {
        self.query_license("short_title = ?1", short_title.trim())
    }

    fn create_person(&self, person: &NewPerson) -> CatalogResult<Person> {
        let last_name = trimmed(person.last_name.as_deref());
        let organisation_name = trimmed(person.organisation_name.as_deref());
        if person.is_organisation && organisation_name.is_none() {
            return Err(CatalogError::MissingRequiredField("organisation_name"));
        }
        if last_name.is_none() && organisation_name.is_none() {
            return Err(CatalogError::MissingRequiredField("last_name"));
        }

        self.conn.execute(
            "INSERT INTO persons (
                uuid,
                is_organisation,
                first_name,
                last_name,
                organisation_name,
                affiliation
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                new_global_id().to_string(),
                bool_to_db(person.is_organisation),
                trimmed(person.first_name.as_deref()),
                last_name,
                organisation_name,
                trimmed(person.affiliation.as_deref()),
            ],
        )?;
        self.get_person(self.conn.last_insert_rowid())
    }

    fn get_person(&self, id: PersonId) -> CatalogResult<Person> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id,
                uuid,
                is_organisation,
                first_name,
                last_name,
                organisation_name,
                affiliation
             FROM persons
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => parse_person_row(row),
            None => Err(CatalogError::not_found("person", id)),
        }
    }

    fn find_persons(&self, name: &str) -> CatalogResult<Vec<Person>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id,
                uuid,
                is_organisation,
                first_name,
                last_name,
                organisation_name,
                affiliation
             FROM persons
             WHERE first_name = ?1 COLLATE NOCASE
                OR last_name = ?1 COLLATE NOCASE
                OR organisation_name = ?1 COLLATE NOCASE
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([name.trim()])?;
        let mut persons = Vec::new();
        while let Some(row) = rows.next()? {
            persons.push(parse_person_row(row)?);
        }
        Ok(persons)
    }
}

impl SqliteReferenceRepository<'_> {
    fn query_license<P: rusqlite::ToSql>(
        &self,
        predicate: &str,
        value: P,
    ) -> CatalogResult<Option<License>> {
        let sql = format!(
            "SELECT
                id,
                short_title,
                title,
                summary,
                link,
                by_attribution,
                share_alike,
                commercial_use
             FROM licenses
             WHERE {predicate};"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![value])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(License {
            id: row.get("id")?,
            short_title: row.get("short_title")?,
            title: row.get("title")?,
            summary: row.get("summary")?,
            link: row.get("link")?,
            by_attribution: optional_bool(row.get("by_attribution")?, "licenses.by_attribution")?,
            share_alike: optional_bool(row.get("share_alike")?, "licenses.share_alike")?,
            commercial_use: optional_bool(row.get("commercial_use")?, "licenses.commercial_use")?,
        }))
    }
}

/// Parses a `persons` row selected with all person columns.
pub(crate) fn parse_person_row(row: &Row<'_>) -> CatalogResult<Person> {
    let uuid: String = row.get("uuid")?;
    Ok(Person {
        id: row.get("id")?,
        uuid: parse_uuid(&uuid, "persons.uuid")?,
        is_organisation: bool_from_db(row.get("is_organisation")?, "persons.is_organisation")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        organisation_name: row.get("organisation_name")?,
        affiliation: row.get("affiliation")?,
    })
}

fn parse_unit_row(row: &Row<'_>) -> rusqlite::Result<Unit> {
    Ok(Unit {
        id: row.get("id")?,
        name: row.get("name")?,
        symbol: row.get("symbol")?,
    })
}

fn parse_variable_row(row: &Row<'_>) -> rusqlite::Result<Variable> {
    Ok(Variable {
        id: row.get("id")?,
        name: row.get("name")?,
        symbol: row.get("symbol")?,
        unit_id: row.get("unit_id")?,
        keyword_id: row.get("keyword_id")?,
    })
}

fn optional_bool(value: Option<i64>, column: &'static str) -> CatalogResult<Option<bool>> {
    value.map(|raw| bool_from_db(raw, column)).transpose()
}

fn required_text<'a>(value: &'a str, field: &'static str) -> CatalogResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::MissingRequiredField(field));
    }
    Ok(trimmed)
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}
