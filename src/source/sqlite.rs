//! Keyword source backed by a read-only SQLite FTS5 table.
//!
//! The table must expose `external_id`, `title` and `body` columns. Optional
//! `metadata` (JSON text), `project` and `updated_at` (unix seconds) columns
//! are used when present.
//!
//! The connection is opened with `SQLITE_OPEN_READ_ONLY` and
//! `PRAGMA query_only = ON`; no statement issued here can mutate the store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, InterruptHandle, OpenFlags};
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use super::{Calibration, SourceAdapter, SourceRequest};
use crate::core::{EvidenceItem, QueryFilters, SourceFamily, SourceId};
use crate::error::{ConfigError, SourceError};

/// Maximum number of search terms sent to FTS5.
const MAX_MATCH_TERMS: usize = 32;
/// Maximum body length kept per row.
const MAX_BODY_LEN: usize = 8_000;

/// Read-only keyword search over one FTS5 table.
#[derive(Debug, Clone)]
pub struct SqliteAdapter {
    id: SourceId,
    family: SourceFamily,
    path: PathBuf,
    table: String,
    calibration: Calibration,
}

#[derive(Default)]
struct InterruptSlot {
    handle: Option<InterruptHandle>,
    cancelled: bool,
}

/// Interrupts the blocking query when the retrieval future is dropped.
///
/// Timeouts and deadline aborts drop the future without polling it again, so
/// cancellation has to happen in `Drop`. A query that has not registered its
/// connection yet sees the cancelled flag and never starts.
struct QueryInterrupt {
    slot: Arc<Mutex<InterruptSlot>>,
    armed: bool,
}

impl QueryInterrupt {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(InterruptSlot::default())),
            armed: true,
        }
    }

    fn slot(&self) -> Arc<Mutex<InterruptSlot>> {
        Arc::clone(&self.slot)
    }

    const fn disarm(&mut self) {
        self.armed = false;
    }

    /// Makes `conn` interruptible, or fails if the caller already gave up.
    fn register(slot: &Mutex<InterruptSlot>, conn: &Connection) -> Result<(), SourceError> {
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.cancelled {
            return Err(SourceError::unavailable("query cancelled"));
        }
        slot.handle = Some(conn.get_interrupt_handle());
        Ok(())
    }
}

impl Drop for QueryInterrupt {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.cancelled = true;
        if let Some(handle) = slot.handle.take() {
            handle.interrupt();
            debug!("sqlite query interrupted");
        }
    }
}

/// Optional columns discovered on the table.
#[derive(Debug, Clone, Copy, Default)]
struct Columns {
    metadata: bool,
    project: bool,
    updated_at: bool,
}

impl SqliteAdapter {
    /// Creates an adapter over `table` in the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SourceSpec`] if `table` is not a plain identifier.
    pub fn new(
        id: SourceId,
        family: SourceFamily,
        path: impl Into<PathBuf>,
        table: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(ConfigError::SourceSpec {
                spec: table,
                reason: "table name must match [A-Za-z_][A-Za-z0-9_]*".to_string(),
            });
        }
        Ok(Self {
            id,
            family,
            path: path.into(),
            table,
            calibration: Calibration::Identity,
        })
    }

    /// Overrides the calibration (identity by default).
    #[must_use]
    pub const fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a read-only, query-only connection.
    fn open(path: &Path) -> rusqlite::Result<Connection> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "query_only", "ON")?;
        Ok(conn)
    }

    /// Builds an FTS5 match expression from free text.
    ///
    /// Every word is quoted so user text can never inject FTS operators.
    /// Returns `None` when the text has no searchable words.
    fn match_expression(text: &str) -> Option<String> {
        let mut seen = Vec::new();
        for word in text.unicode_words() {
            let term: String = word
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
                .to_lowercase();
            if term.is_empty() || seen.contains(&term) {
                continue;
            }
            seen.push(term);
            if seen.len() == MAX_MATCH_TERMS {
                break;
            }
        }
        if seen.is_empty() {
            return None;
        }
        Some(
            seen.iter()
                .map(|t| format!("\"{t}\""))
                .collect::<Vec<_>>()
                .join(" OR "),
        )
    }

    fn discover_columns(conn: &Connection, table: &str) -> rusqlite::Result<Columns> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(Columns {
            metadata: names.iter().any(|n| n == "metadata"),
            project: names.iter().any(|n| n == "project"),
            updated_at: names.iter().any(|n| n == "updated_at"),
        })
    }

    #[allow(clippy::cast_possible_wrap)]
    fn run(
        conn: &Connection,
        source: &SourceId,
        table: &str,
        expression: &str,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<EvidenceItem>, SourceError> {
        let columns = Self::discover_columns(conn, table).map_err(classify)?;

        let mut sql = format!(
            "SELECT external_id, title, body, {metadata}, {updated_at}, bm25({table}) AS rank \
             FROM {table} WHERE {table} MATCH ?",
            metadata = if columns.metadata { "metadata" } else { "NULL" },
            updated_at = if columns.updated_at {
                "CAST(updated_at AS INTEGER)"
            } else {
                "NULL"
            },
        );
        let mut params: Vec<Value> = vec![Value::Text(expression.to_string())];

        if let Some(project) = filters.project.as_ref().filter(|_| columns.project) {
            sql.push_str(" AND project = ?");
            params.push(Value::Text(project.clone()));
        }
        if columns.updated_at {
            if let Some(since) = filters.since {
                sql.push_str(" AND CAST(updated_at AS INTEGER) >= ?");
                params.push(Value::Integer(since));
            }
            if let Some(until) = filters.until {
                sql.push_str(" AND CAST(updated_at AS INTEGER) <= ?");
                params.push(Value::Integer(until));
            }
        }
        sql.push_str(" ORDER BY rank LIMIT ?");
        params.push(Value::Integer(limit as i64));

        let mut stmt = conn.prepare(&sql).map_err(classify)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, f64>(5)?,
                ))
            })
            .map_err(classify)?;

        let mut items = Vec::new();
        for row in rows {
            let (external_id, title, body, metadata, updated_at, rank) = row.map_err(classify)?;
            let mut body = body.unwrap_or_default();
            truncate_on_char_boundary(&mut body, MAX_BODY_LEN);
            let magnitude = rank.abs();
            let mut item = EvidenceItem::new(
                source.clone(),
                external_id,
                title.unwrap_or_default(),
                body,
                magnitude / (1.0 + magnitude),
            );
            item.updated_at = updated_at;
            item.metadata = parse_metadata(metadata.as_deref());
            items.push(item);
        }
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for SqliteAdapter {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn family(&self) -> SourceFamily {
        self.family
    }

    fn calibration(&self) -> Calibration {
        self.calibration
    }

    async fn retrieve(&self, request: &SourceRequest) -> Result<Vec<EvidenceItem>, SourceError> {
        let expression = Self::match_expression(&request.text)
            .ok_or_else(|| SourceError::invalid("query has no searchable terms"))?;

        let path = self.path.clone();
        let table = self.table.clone();
        let source = self.id.clone();
        let filters = request.filters.clone();
        let limit = request.max_results;
        let busy_timeout = request.timeout;
        let mut interrupt = QueryInterrupt::new();
        let slot = interrupt.slot();

        let task = tokio::task::spawn_blocking(move || {
            let conn = Self::open(&path).map_err(classify)?;
            conn.busy_timeout(busy_timeout).map_err(classify)?;
            QueryInterrupt::register(&slot, &conn)?;
            Self::run(&conn, &source, &table, &expression, &filters, limit)
        });
        tokio::pin!(task);

        tokio::select! {
            joined = &mut task => {
                interrupt.disarm();
                let items = joined
                    .map_err(|e| SourceError::unavailable(format!("query task failed: {e}")))??;
                debug!(source = %self.id, rows = items.len(), "sqlite query complete");
                Ok(items)
            }
            () = request.cancel.cancelled() => Err(SourceError::unavailable("query cancelled")),
        }
    }
}

/// Maps SQLite failures onto the source error taxonomy.
fn classify(err: rusqlite::Error) -> SourceError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _) => match code.code {
            ErrorCode::CannotOpen
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::OperationInterrupted
            | ErrorCode::SystemIoFailure
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseCorrupt => SourceError::unavailable(err.to_string()),
            _ => SourceError::invalid(err.to_string()),
        },
        rusqlite::Error::InvalidColumnType(..) | rusqlite::Error::FromSqlConversionFailure(..) => {
            SourceError::degraded(err.to_string())
        }
        _ => SourceError::unavailable(err.to_string()),
    }
}

fn parse_metadata(raw: Option<&str>) -> BTreeMap<String, serde_json::Value> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return BTreeMap::new();
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        Ok(other) => BTreeMap::from([("value".to_string(), other)]),
        Err(_) => BTreeMap::from([(
            "raw".to_string(),
            serde_json::Value::String(raw.to_string()),
        )]),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("tickets.db");
        let conn = Connection::open(&path).unwrap_or_else(|_| unreachable!());
        conn.execute_batch(
            "CREATE VIRTUAL TABLE tickets USING fts5(
                 external_id, title, body, metadata, project, updated_at
             );
             INSERT INTO tickets VALUES
                 ('PROJ-1', 'Login fails after upgrade', 'Session manager drops tokens on login',
                  '{\"status\": \"open\"}', 'PROJ', '1700000000'),
                 ('PROJ-2', 'Slow dashboard', 'Dashboard queries time out', NULL, 'PROJ', '1600000000'),
                 ('OPS-7', 'Login banner typo', 'Typo on the login page', 'not json', 'OPS', '1700000500');",
        )
        .unwrap_or_else(|_| unreachable!());
        (dir, path)
    }

    fn request(text: &str) -> SourceRequest {
        SourceRequest {
            text: text.to_string(),
            filters: QueryFilters::default(),
            max_results: 10,
            timeout: Duration::from_secs(2),
            cancel: CancellationToken::new(),
        }
    }

    fn adapter(path: &Path) -> SqliteAdapter {
        SqliteAdapter::new(SourceId::new("jira"), SourceFamily::Tickets, path, "tickets")
            .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn test_match_expression_quotes_terms() {
        let expr = SqliteAdapter::match_expression("login OR \"drop\" NEAR(x)");
        assert_eq!(
            expr.as_deref(),
            Some("\"login\" OR \"or\" OR \"drop\" OR \"near\" OR \"x\"")
        );
        assert!(SqliteAdapter::match_expression("?? !!").is_none());
    }

    #[test]
    fn test_rejects_bad_table_name() {
        let result = SqliteAdapter::new(
            SourceId::new("x"),
            SourceFamily::Code,
            "/tmp/x.db",
            "t; DROP TABLE t",
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_retrieve_ranks_and_parses_metadata() {
        let (_dir, path) = fixture();
        let items = adapter(&path)
            .retrieve(&request("login session"))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].external_id, "PROJ-1");
        assert!(items[0].score > items[1].score);
        assert!(items.iter().all(|i| (0.0..=1.0).contains(&i.score)));
        assert_eq!(
            items[0].metadata.get("status"),
            Some(&serde_json::Value::String("open".to_string()))
        );
        assert!(items[1].metadata.contains_key("raw"));
        assert_eq!(items[0].updated_at, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_retrieve_applies_filters() {
        let (_dir, path) = fixture();
        let mut req = request("login");
        req.filters.project = Some("OPS".to_string());
        let items = adapter(&path)
            .retrieve(&req)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].external_id, "OPS-7");

        let mut req = request("login");
        req.filters.until = Some(1_700_000_100);
        let items = adapter(&path)
            .retrieve(&req)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].external_id, "PROJ-1");
    }

    #[tokio::test]
    async fn test_fewer_rows_than_requested_is_success() {
        let (_dir, path) = fixture();
        let items = adapter(&path).retrieve(&request("dashboard")).await;
        assert_eq!(items.map(|v| v.len()), Ok(1));
    }

    #[tokio::test]
    async fn test_missing_database_is_unavailable() {
        let result = adapter(Path::new("/nonexistent/dir/none.db"))
            .retrieve(&request("login"))
            .await;
        assert!(matches!(result, Err(SourceError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_missing_table_is_invalid() {
        let (_dir, path) = fixture();
        let adapter = SqliteAdapter::new(SourceId::new("kb"), SourceFamily::KnowledgeBase, &path, "articles")
            .unwrap_or_else(|_| unreachable!());
        let result = adapter.retrieve(&request("login")).await;
        assert!(matches!(result, Err(SourceError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_empty_terms_is_invalid() {
        let (_dir, path) = fixture();
        let result = adapter(&path).retrieve(&request("!!!")).await;
        assert!(matches!(result, Err(SourceError::Invalid { .. })));
    }

    #[test]
    fn test_dropped_retrieval_interrupts_running_query() {
        let guard = QueryInterrupt::new();
        let slot = guard.slot();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let worker = std::thread::spawn(move || {
            let conn = Connection::open_in_memory().unwrap_or_else(|_| unreachable!());
            QueryInterrupt::register(&slot, &conn).unwrap_or_else(|_| unreachable!());
            let _ = ready_tx.send(());
            conn.query_row(
                "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 200000000) \
                 SELECT count(*) FROM n",
                [],
                |row| row.get::<_, i64>(0),
            )
        });

        ready_rx.recv().unwrap_or_else(|_| unreachable!());
        std::thread::sleep(Duration::from_millis(100));
        drop(guard);

        let result = worker.join().unwrap_or_else(|_| unreachable!());
        assert!(matches!(result.map_err(classify), Err(SourceError::Unavailable { .. })));
    }

    #[test]
    fn test_query_never_starts_after_cancellation() {
        let guard = QueryInterrupt::new();
        let slot = guard.slot();
        drop(guard);
        let conn = Connection::open_in_memory().unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            QueryInterrupt::register(&slot, &conn),
            Err(SourceError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_completed_query_is_not_interrupted() {
        let mut guard = QueryInterrupt::new();
        let slot = guard.slot();
        guard.disarm();
        drop(guard);
        let conn = Connection::open_in_memory().unwrap_or_else(|_| unreachable!());
        assert!(QueryInterrupt::register(&slot, &conn).is_ok());
    }

    #[test]
    fn test_connection_is_read_only() {
        let (_dir, path) = fixture();
        let conn = SqliteAdapter::open(&path).unwrap_or_else(|_| unreachable!());
        let write = conn.execute(
            "INSERT INTO tickets (external_id, title, body) VALUES ('X-1', 'x', 'x')",
            [],
        );
        assert!(write.is_err());
    }
}
