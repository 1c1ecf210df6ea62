//! Cross-kind global identifier claims.
//!
//! Every entity kind mints identifiers independently; claiming each one in
//! `global_identifiers` inside the creating transaction guarantees that no
//! two entities of different kinds share an identifier.

use crate::error::{CatalogError, CatalogResult};
use crate::model::identity::{EntityKind, GlobalId};
use rusqlite::{params, Connection, OptionalExtension};

/// Records `uuid` as owned by an entity of `kind`.
///
/// Fails with `ConstraintViolation` when the identifier is already claimed.
pub(crate) fn claim_global_id(
    conn: &Connection,
    uuid: GlobalId,
    kind: EntityKind,
) -> CatalogResult<()> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO global_identifiers (uuid, kind) VALUES (?1, ?2);",
        params![uuid.to_string(), kind.as_str()],
    )?;
    if inserted == 0 {
        return Err(CatalogError::ConstraintViolation(format!(
            "identifier {uuid} is already assigned"
        )));
    }
    Ok(())
}

pub(crate) fn release_global_id(conn: &Connection, uuid: GlobalId) -> CatalogResult<()> {
    conn.execute(
        "DELETE FROM global_identifiers WHERE uuid = ?1;",
        [uuid.to_string()],
    )?;
    Ok(())
}

/// Kind that claimed `uuid`, if any.
pub fn claimed_kind(conn: &Connection, uuid: GlobalId) -> CatalogResult<Option<EntityKind>> {
    let kind: Option<String> = conn
        .query_row(
            "SELECT kind FROM global_identifiers WHERE uuid = ?1;",
            [uuid.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    kind.map(|value| {
        EntityKind::from_db(&value).ok_or_else(|| {
            CatalogError::InvalidData(format!("invalid kind `{value}` in global_identifiers.kind"))
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::{claim_global_id, claimed_kind, release_global_id};
    use crate::db::open_db_in_memory;
    use crate::error::CatalogError;
    use crate::model::identity::{new_global_id, EntityKind};

    #[test]
    fn second_claim_of_same_identifier_fails_across_kinds() {
        let conn = open_db_in_memory().unwrap();
        let uuid = new_global_id();
        claim_global_id(&conn, uuid, EntityKind::Entry).unwrap();

        let err = claim_global_id(&conn, uuid, EntityKind::Keyword).unwrap_err();
        assert!(matches!(err, CatalogError::ConstraintViolation(_)));
        assert_eq!(claimed_kind(&conn, uuid).unwrap(), Some(EntityKind::Entry));

        release_global_id(&conn, uuid).unwrap();
        assert_eq!(claimed_kind(&conn, uuid).unwrap(), None);
        claim_global_id(&conn, uuid, EntityKind::Keyword).unwrap();
    }
}
