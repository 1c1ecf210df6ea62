//! SQLite FTS5-based search implementation.
//!
//! # Responsibility
//! - Provide keyword search over entry titles and abstracts.
//! - Return typed hits with stable identifiers.
//!
//! # Invariants
//! - Only the current row of each version chain is returned.
//! - Entries under embargo at the query instant are hidden unless requested.
//! - Result ordering is deterministic by rank, `last_update` and id.

use crate::config::{CatalogConfig, DEFAULT_SEARCH_LIMIT};
use crate::db::DbError;
use crate::model::entry::EntryId;
use crate::model::identity::GlobalId;
use crate::repo::{now_ms, to_epoch_ms};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Result type for search APIs.
pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error for query parsing, DB interaction and result decoding.
#[derive(Debug)]
pub enum SearchError {
    /// User-provided query cannot be parsed by FTS5 syntax.
    InvalidQuery {
        query: String,
        message: String,
    },
    Db(DbError),
    InvalidData(String),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuery { query, message } => {
                write!(f, "invalid full-text query `{query}`: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid search row: {message}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidQuery { .. } => None,
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for SearchError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Full-text query over the catalog.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// User query text.
    pub text: String,
    /// Maximum number of hits to return.
    pub limit: u32,
    /// Instant embargo visibility is evaluated at; `None` means now.
    pub at: Option<DateTime<Utc>>,
    pub include_embargoed: bool,
    /// Whether to pass text directly as raw FTS5 expression.
    ///
    /// Default is `false`: every whitespace-separated term is quoted and the
    /// terms are AND-ed.
    pub raw_fts_syntax: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: DEFAULT_SEARCH_LIMIT,
            at: None,
            include_embargoed: false,
            raw_fts_syntax: false,
        }
    }

    /// Query using the configured default limit.
    pub fn with_config(text: impl Into<String>, config: &CatalogConfig) -> Self {
        Self {
            limit: config.default_search_limit,
            ..Self::new(text)
        }
    }
}

/// Single search hit returned by [`search_entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub entry_id: EntryId,
    pub uuid: GlobalId,
    pub title: String,
    pub snippet: String,
}

/// Searches current entries via FTS5 and returns ranked results.
///
/// Returns an empty list for blank queries.
pub fn search_entries(conn: &Connection, query: &SearchQuery) -> SearchResult<Vec<SearchHit>> {
    let Some(match_expr) = build_match_expression(query) else {
        return Ok(Vec::new());
    };

    if query.limit == 0 {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "SELECT
            entries.id AS id,
            entries.uuid AS uuid,
            entries.title AS title,
            snippet(entries_fts, -1, '[', ']', ' ... ', 10) AS snippet
         FROM entries_fts
         JOIN entries ON entries.id = entries_fts.rowid
         WHERE entries_fts MATCH ?
           AND entries.latest_version_id = entries.id",
    );
    let mut bind_values: Vec<Value> = vec![Value::Text(match_expr.clone())];

    if !query.include_embargoed {
        let at = query.at.unwrap_or_else(now_ms);
        sql.push_str(
            " AND (entries.embargo = 0 OR entries.embargo_end IS NULL OR entries.embargo_end <= ?)",
        );
        bind_values.push(Value::Integer(to_epoch_ms(at)));
    }

    sql.push_str(" ORDER BY bm25(entries_fts), entries.last_update DESC, entries.id ASC LIMIT ?");
    bind_values.push(Value::Integer(i64::from(query.limit)));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query(params_from_iter(bind_values))
        .map_err(|err| map_query_error(err, &match_expr))?;
    let mut hits = Vec::new();

    while let Some(row) = rows
        .next()
        .map_err(|err| map_query_error(err, &match_expr))?
    {
        hits.push(parse_search_hit(row)?);
    }

    Ok(hits)
}

fn parse_search_hit(row: &Row<'_>) -> SearchResult<SearchHit> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text)
        .map_err(|_| SearchError::InvalidData(format!("invalid uuid `{uuid_text}`")))?;

    Ok(SearchHit {
        entry_id: row.get("id")?,
        uuid,
        title: row.get("title")?,
        snippet: row.get("snippet")?,
    })
}

fn build_match_expression(query: &SearchQuery) -> Option<String> {
    let text = query.text.trim();
    if text.is_empty() {
        return None;
    }

    if query.raw_fts_syntax {
        return Some(text.to_string());
    }

    let terms = text
        .split_whitespace()
        .map(escape_fts_term)
        .collect::<Vec<_>>();
    Some(terms.join(" AND "))
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

fn map_query_error(err: rusqlite::Error, query: &str) -> SearchError {
    if is_match_syntax_error(&err) {
        return SearchError::InvalidQuery {
            query: query.to_string(),
            message: err.to_string(),
        };
    }

    SearchError::Db(DbError::Sqlite(err))
}

fn is_match_syntax_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let msg = message.to_lowercase();
            (msg.contains("fts5") && msg.contains("syntax"))
                || msg.contains("malformed match expression")
                || msg.contains("unterminated")
                || msg.contains("no such column")
        }
        _ => false,
    }
}
