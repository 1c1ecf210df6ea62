//! Catalog error kinds shared by repositories and services.
//!
//! # Responsibility
//! - Name every failure a catalog operation can surface to callers.
//! - Map storage failures into semantic kinds where the cause is known.
//!
//! # Invariants
//! - Validation failures are raised before any write is attempted.
//! - Core code never logs-and-drops an error; every failure is returned.

use crate::db::DbError;
use crate::model::scale::ScaleDimension;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Error returned by catalog operations.
#[derive(Debug)]
pub enum CatalogError {
    /// Identifier or entity is absent. `kind` names what was searched.
    NotFound { kind: &'static str, id: String },
    /// Malformed identifier, out-of-range ratio, or otherwise unusable input.
    InvalidArgument(String),
    /// Entry creation or edit without a mandatory field.
    MissingRequiredField(&'static str),
    /// Scale triplet declared with only some of its components.
    IncompleteScale {
        dimension: ScaleDimension,
        missing: &'static str,
    },
    /// A keyword write would break the forest shape.
    InvalidHierarchy(String),
    /// Stored keyword parent pointers form a cycle.
    CorruptHierarchy(i64),
    /// Uniqueness or membership rule rejected the write.
    ConstraintViolation(String),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl CatalogError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code, used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::MissingRequiredField(_) => "missing_required_field",
            Self::IncompleteScale { .. } => "incomplete_scale",
            Self::InvalidHierarchy(_) => "invalid_hierarchy",
            Self::CorruptHierarchy(_) => "corrupt_hierarchy",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::Db(_) => "db_error",
            Self::UninitializedConnection { .. } => "uninitialized_connection",
            Self::MissingRequiredTable(_) => "missing_required_table",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::MissingRequiredField(field) => write!(f, "missing required field `{field}`"),
            Self::IncompleteScale { dimension, missing } => write!(
                f,
                "incomplete {} scale: `{missing}` is required once the scale is declared",
                dimension.as_str()
            ),
            Self::InvalidHierarchy(message) => write!(f, "invalid keyword hierarchy: {message}"),
            Self::CorruptHierarchy(node) => {
                write!(f, "corrupt keyword hierarchy: cycle reached at keyword {node}")
            }
            Self::ConstraintViolation(message) => write!(f, "constraint violation: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "catalog repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "catalog repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted catalog data: {message}"),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for CatalogError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(value: rusqlite::Error) -> Self {
        match &value {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(
                    message
                        .clone()
                        .unwrap_or_else(|| "storage constraint rejected the write".to_string()),
                )
            }
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CatalogError;
    use crate::model::scale::ScaleDimension;

    #[test]
    fn display_names_the_searched_kind_and_id() {
        let err = CatalogError::not_found("entry", 42);
        assert_eq!(err.to_string(), "entry not found: 42");
    }

    #[test]
    fn incomplete_scale_names_dimension_and_missing_part() {
        let err = CatalogError::IncompleteScale {
            dimension: ScaleDimension::Spatial,
            missing: "extent",
        };
        let text = err.to_string();
        assert!(text.contains("spatial"));
        assert!(text.contains("extent"));
    }

    #[test]
    fn sqlite_constraint_failures_become_constraint_violations() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT NOT NULL UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err: CatalogError = conn
            .execute("INSERT INTO t VALUES ('a');", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, CatalogError::ConstraintViolation(_)));
    }
}
