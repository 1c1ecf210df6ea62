//! Repository layer: persistence contracts and their SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access traits per aggregate.
//! - Keep SQL details out of services.
//!
//! # Invariants
//! - Repositories refuse connections that are not migrated to the latest
//!   schema version.
//! - Multi-statement writes run inside one `BEGIN IMMEDIATE` transaction.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::error::{CatalogError, CatalogResult};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

pub mod entry_repo;
pub mod group_repo;
pub mod identity_repo;
pub mod keyword_repo;
pub mod reference_repo;

/// Checks schema version and the presence of `tables`.
pub(crate) fn ensure_schema_ready(conn: &Connection, tables: &[&'static str]) -> CatalogResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(CatalogError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in tables {
        if !table_exists(conn, table)? {
            return Err(CatalogError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> CatalogResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type IN ('table', 'view') AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Opens a write transaction holding SQLite's writer lock.
///
/// Callers must not already be inside a transaction on `conn`.
pub(crate) fn begin_immediate(conn: &Connection) -> CatalogResult<Transaction<'_>> {
    Ok(Transaction::new_unchecked(
        conn,
        TransactionBehavior::Immediate,
    )?)
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> CatalogResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| CatalogError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn to_epoch_ms(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn from_epoch_ms(value: i64, column: &'static str) -> CatalogResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(value).single().ok_or_else(|| {
        CatalogError::InvalidData(format!("timestamp {value} out of range in {column}"))
    })
}

pub(crate) fn bool_to_db(value: bool) -> i64 {
    i64::from(value)
}

pub(crate) fn bool_from_db(value: i64, column: &'static str) -> CatalogResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CatalogError::InvalidData(format!(
            "invalid boolean {other} in {column}"
        ))),
    }
}

/// Current instant truncated to the millisecond precision of storage.
pub(crate) fn now_ms() -> DateTime<Utc> {
    let now = Utc::now();
    from_epoch_ms(now.timestamp_millis(), "clock").unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::{bool_from_db, ensure_schema_ready, from_epoch_ms, to_epoch_ms};
    use crate::db::open_db_in_memory;
    use crate::error::CatalogError;
    use chrono::{TimeZone, Utc};
    use rusqlite::Connection;

    #[test]
    fn unmigrated_connection_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let err = ensure_schema_ready(&conn, &["entries"]).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UninitializedConnection {
                actual_version: 0,
                ..
            }
        ));
    }

    #[test]
    fn missing_table_is_named() {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch("DROP TABLE entry_details;").unwrap();
        let err = ensure_schema_ready(&conn, &["entries", "entry_details"]).unwrap_err();
        assert!(matches!(err, CatalogError::MissingRequiredTable("entry_details")));
    }

    #[test]
    fn epoch_millis_round_trip() {
        let instant = Utc.with_ymd_and_hms(2020, 5, 15, 12, 30, 0).unwrap();
        assert_eq!(from_epoch_ms(to_epoch_ms(instant), "t").unwrap(), instant);
        assert!(matches!(
            bool_from_db(2, "entries.embargo"),
            Err(CatalogError::InvalidData(_))
        ));
    }
}
