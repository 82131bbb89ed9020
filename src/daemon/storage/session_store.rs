use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use rusqlite::{params, types::ToSql, Connection, OpenFlags, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};

use super::entities::{AppSummary, SearchFilter, Session, WindowSummary};

const DB_FILE_NAME: &str = "focuswatch.db";

/// Forward-only schema migrations. `PRAGMA user_version` records how many of
/// these have been applied; new versions append, they never rewrite.
const MIGRATIONS: &[&str] = &["
    CREATE TABLE sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        app_id TEXT NOT NULL,
        app_name TEXT NOT NULL,
        window_title TEXT,
        started_at INTEGER NOT NULL,
        ended_at INTEGER
    );
    CREATE INDEX idx_sessions_started_at ON sessions(started_at);
    CREATE INDEX idx_sessions_app_id ON sessions(app_id);
    CREATE INDEX idx_sessions_app_id_started_at ON sessions(app_id, started_at);
"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("database schema version {0} is newer than this build supports")]
    SchemaTooNew(i64),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// The storage operations the tracking state machine performs. Kept narrow so
/// the machine can be exercised against substituted storage.
#[cfg_attr(test, mockall::automock)]
pub trait SessionBackend: Send + Sync {
    /// Persists `session` and returns it with the assigned id.
    fn insert(&self, session: Session) -> Result<Session>;

    /// Closes session `id` at `at`. Returns whether a row was closed.
    fn end_session(&self, id: i64, at: DateTime<Utc>) -> Result<bool>;
}

impl SessionBackend for SessionStore {
    fn insert(&self, session: Session) -> Result<Session> {
        SessionStore::insert(self, session)
    }

    fn end_session(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        SessionStore::end_session(self, id, at)
    }
}

/// Durable history of [Session] rows in a local SQLite file.
///
/// Writes go through a single mutex-guarded connection, one statement per
/// call, so a reader can never observe a half-written row. Reads open their
/// own short-lived read-only connection, which under WAL runs concurrently
/// with the writer.
pub struct SessionStore {
    writer: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SessionStore {
    /// Opens (or creates) the database inside `dir` and brings the schema up
    /// to date. Failure here is fatal for the daemon.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DB_FILE_NAME);
        info!("Opening session store at {path:?}");
        let mut conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        migrate(&mut conn)?;
        Ok(Self {
            writer: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// In-memory store. Reads share the writer connection since the database
    /// has no file to reopen; intended for tests.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        Ok(Self {
            writer: Mutex::new(conn),
            path: None,
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        match &self.path {
            Some(path) => {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                f(&conn)
            }
            None => f(&self.writer.lock().unwrap()),
        }
    }

    // Writes

    /// Persists `session` and returns it with the assigned id.
    pub fn insert(&self, session: Session) -> Result<Session> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (app_id, app_name, window_title, started_at, ended_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                session.app_id.as_ref(),
                session.app_name.as_ref(),
                session.window_title.as_deref(),
                session.started_at.timestamp(),
                session.ended_at.map(|v| v.timestamp()),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Inserted session {id} for {}", session.app_id);
        Ok(Session {
            id: Some(id),
            ..session
        })
    }

    /// Closes session `id` at `at`. Idempotent: a session that already has an
    /// end time keeps it. Returns whether a row was closed.
    pub fn end_session(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.writer.lock().unwrap();
        let changed = conn.execute(
            "UPDATE sessions SET ended_at = ? WHERE id = ? AND ended_at IS NULL",
            params![at.timestamp(), id],
        )?;
        Ok(changed > 0)
    }

    /// Deletes every open row. Called once at startup: an open row at that
    /// point survived an unclean shutdown and its true end time is unknown,
    /// so it is dropped rather than guessed at.
    pub fn delete_orphaned(&self) -> Result<usize> {
        let conn = self.writer.lock().unwrap();
        Ok(conn.execute("DELETE FROM sessions WHERE ended_at IS NULL", [])?)
    }

    /// Closes every open row at `at`. The controlled-shutdown counterpart of
    /// [Self::delete_orphaned], where "now" is a defensible end time. Safe to
    /// call without any in-memory state, e.g. from a termination signal path.
    pub fn close_all_open(&self, at: DateTime<Utc>) -> Result<usize> {
        let conn = self.writer.lock().unwrap();
        Ok(conn.execute(
            "UPDATE sessions SET ended_at = ? WHERE ended_at IS NULL",
            params![at.timestamp()],
        )?)
    }

    pub fn delete_by_id(&self, id: i64) -> Result<bool> {
        let conn = self.writer.lock().unwrap();
        let changed = conn.execute("DELETE FROM sessions WHERE id = ?", params![id])?;
        Ok(changed > 0)
    }

    pub fn delete_by_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize> {
        let conn = self.writer.lock().unwrap();
        Ok(conn.execute(
            "DELETE FROM sessions WHERE started_at >= ? AND started_at < ?",
            params![start.timestamp(), end.timestamp()],
        )?)
    }

    /// Deletes sessions whose app name contains `app_name`, optionally limited
    /// to a time range.
    pub fn delete_by_app_name(
        &self,
        app_name: &str,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<usize> {
        let pattern = format!("%{}%", escape_like(app_name));
        let conn = self.writer.lock().unwrap();
        let deleted = match range {
            Some((start, end)) => conn.execute(
                "DELETE FROM sessions WHERE app_name LIKE ? ESCAPE '\\'
                 AND started_at >= ? AND started_at < ?",
                params![pattern, start.timestamp(), end.timestamp()],
            )?,
            None => conn.execute(
                "DELETE FROM sessions WHERE app_name LIKE ? ESCAPE '\\'",
                params![pattern],
            )?,
        };
        Ok(deleted)
    }

    pub fn delete_all(&self) -> Result<usize> {
        let conn = self.writer.lock().unwrap();
        Ok(conn.execute("DELETE FROM sessions", [])?)
    }

    // Reads

    pub fn count_all(&self) -> Result<i64> {
        self.read(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?)
        })
    }

    pub fn fetch_session(&self, id: i64) -> Result<Option<Session>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"),
                    params![id],
                    row_to_session,
                )
                .optional()?)
        })
    }

    /// The open session, if any. If several open rows exist (which the daemon
    /// prevents, but a query must not rely on) the most recently started one
    /// is reported.
    pub fn fetch_current(&self) -> Result<Option<Session>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions
                         WHERE ended_at IS NULL ORDER BY started_at DESC LIMIT 1"
                    ),
                    [],
                    row_to_session,
                )
                .optional()?)
        })
    }

    /// Sessions whose start falls in `[start, end)`, oldest first.
    pub fn fetch_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Session>> {
        self.read(|conn| {
            let mut statement = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE started_at >= ? AND started_at < ? ORDER BY started_at ASC"
            ))?;
            let rows = statement
                .query_map(params![start.timestamp(), end.timestamp()], row_to_session)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Most recently started sessions, newest first.
    pub fn fetch_recent(&self, limit: usize) -> Result<Vec<Session>> {
        self.read(|conn| {
            let mut statement = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at DESC LIMIT ?"
            ))?;
            let rows = statement
                .query_map(params![limit as i64], row_to_session)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Free-text and filtered search, newest first. User input is escaped
    /// before it reaches a LIKE pattern, so `%`/`_` in queries match
    /// themselves.
    pub fn search_sessions(&self, filter: &SearchFilter) -> Result<Vec<Session>> {
        let mut clauses = Vec::<&str>::new();
        let mut bound = Vec::<Box<dyn ToSql>>::new();

        if let Some(query) = filter.query.as_deref().filter(|v| !v.is_empty()) {
            let pattern = format!("%{}%", escape_like(query));
            bound.push(Box::new(pattern.clone()));
            bound.push(Box::new(pattern));
            clauses.push(
                "(app_name LIKE ? ESCAPE '\\' OR COALESCE(window_title, '') LIKE ? ESCAPE '\\')",
            );
        }
        if let Some(app) = filter.app_name.as_deref().filter(|v| !v.is_empty()) {
            bound.push(Box::new(format!("%{}%", escape_like(app))));
            clauses.push("app_name LIKE ? ESCAPE '\\'");
        }
        if let Some((start, end)) = filter.range {
            bound.push(Box::new(start.timestamp()));
            bound.push(Box::new(end.timestamp()));
            clauses.push("started_at >= ? AND started_at < ?");
        }
        bound.push(Box::new(filter.limit.unwrap_or(100) as i64));

        let condition = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions {condition}
             ORDER BY started_at DESC LIMIT ?"
        );

        self.read(|conn| {
            let mut statement = conn.prepare(&sql)?;
            let rows = statement
                .query_map(rusqlite::params_from_iter(bound.iter()), row_to_session)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // Aggregation. Open sessions contribute their elapsed-so-far duration;
    // `now` is captured once by the caller and reused across all rows so the
    // aggregate is internally consistent.

    pub fn total_seconds(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.read(|conn| {
            Ok(conn.query_row(
                &format!(
                    "SELECT COALESCE(SUM({DURATION_EXPR}), 0) FROM sessions
                     WHERE started_at >= ? AND started_at < ?"
                ),
                params![now.timestamp(), start.timestamp(), end.timestamp()],
                |row| row.get(0),
            )?)
        })
    }

    /// Per-app totals for the range, longest first. Ties order by app id so
    /// results are reproducible.
    pub fn summarize_by_app(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<AppSummary>> {
        self.read(|conn| {
            let mut statement = conn.prepare(&format!(
                "SELECT app_id, app_name, SUM({DURATION_EXPR}) AS total_seconds, COUNT(*)
                 FROM sessions
                 WHERE started_at >= ? AND started_at < ?
                 GROUP BY app_id
                 ORDER BY total_seconds DESC, app_id ASC"
            ))?;
            let rows = statement
                .query_map(
                    params![now.timestamp(), start.timestamp(), end.timestamp()],
                    |row| {
                        Ok(AppSummary {
                            app_id: row.get(0)?,
                            app_name: row.get(1)?,
                            total_seconds: row.get(2)?,
                            session_count: row.get(3)?,
                        })
                    },
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Per-window totals for the range. Sessions without a title group under
    /// the empty string.
    pub fn summarize_by_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<WindowSummary>> {
        self.read(|conn| {
            let mut statement = conn.prepare(&format!(
                "SELECT app_id, app_name, COALESCE(window_title, '') AS window_title,
                        SUM({DURATION_EXPR}) AS total_seconds, COUNT(*)
                 FROM sessions
                 WHERE started_at >= ? AND started_at < ?
                 GROUP BY app_id, COALESCE(window_title, '')
                 ORDER BY total_seconds DESC, app_id ASC, window_title ASC"
            ))?;
            let rows = statement
                .query_map(
                    params![now.timestamp(), start.timestamp(), end.timestamp()],
                    |row| {
                        Ok(WindowSummary {
                            app_id: row.get(0)?,
                            app_name: row.get(1)?,
                            window_title: row.get(2)?,
                            total_seconds: row.get(3)?,
                            session_count: row.get(4)?,
                        })
                    },
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

const SESSION_COLUMNS: &str = "id, app_id, app_name, window_title, started_at, ended_at";

/// Seconds of attention a row represents, with the open-session end
/// substituted by the bound `now` and negative spans clamped away.
const DURATION_EXPR: &str = "MAX(0, COALESCE(ended_at, ?) - started_at)";

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: Some(row.get(0)?),
        app_id: row.get::<_, String>(1)?.into(),
        app_name: row.get::<_, String>(2)?.into(),
        window_title: row.get::<_, Option<String>>(3)?.map(Into::into),
        started_at: from_unix(row.get(4)?),
        ended_at: row.get::<_, Option<i64>>(5)?.map(from_unix),
    })
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Escapes `%`, `_` and `\` so user text matches literally inside a LIKE
/// pattern with `ESCAPE '\'`.
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn migrate(conn: &mut Connection) -> Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version as usize > MIGRATIONS.len() {
        return Err(StorageError::SchemaTooNew(version));
    }
    for (index, migration) in MIGRATIONS.iter().enumerate().skip(version as usize) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration)?;
        tx.pragma_update(None, "user_version", index as i64 + 1)?;
        tx.commit()?;
        info!("Applied schema migration v{}", index + 1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    use super::*;

    fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, hour, minute, 0).unwrap()
    }

    fn open_store(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::open(dir.path()).unwrap()
    }

    fn sample(app: &str, title: Option<&str>, started_at: DateTime<Utc>) -> Session {
        Session::open(
            format!("com.example.{app}").into(),
            app.into(),
            title.map(Into::into),
            started_at,
        )
    }

    #[test]
    fn insert_then_fetch_round_trips() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let inserted = store
            .insert(sample("editor", Some("notes.txt"), ts(10, 0)))
            .unwrap();
        let id = inserted.id.unwrap();

        let fetched = store.fetch_session(id).unwrap().unwrap();
        assert_eq!(fetched, inserted);
        assert_eq!(fetched.window_title.as_deref(), Some("notes.txt"));
        assert_eq!(fetched.ended_at, None);
    }

    #[test]
    fn end_session_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let id = store
            .insert(sample("editor", None, ts(10, 0)))
            .unwrap()
            .id
            .unwrap();

        assert!(store.end_session(id, ts(10, 30)).unwrap());
        // A second end must not move the recorded end time.
        assert!(!store.end_session(id, ts(11, 0)).unwrap());

        let fetched = store.fetch_session(id).unwrap().unwrap();
        assert_eq!(fetched.ended_at, Some(ts(10, 30)));
    }

    #[test]
    fn fetch_current_prefers_latest_open_row() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.insert(sample("first", None, ts(9, 0))).unwrap();
        let later = store.insert(sample("second", None, ts(10, 0))).unwrap();

        let current = store.fetch_current().unwrap().unwrap();
        assert_eq!(current.id, later.id);
    }

    #[test]
    fn fetch_range_is_ascending_and_half_open() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.insert(sample("b", None, ts(11, 0))).unwrap();
        store.insert(sample("a", None, ts(10, 0))).unwrap();
        store.insert(sample("c", None, ts(12, 0))).unwrap();

        let sessions = store.fetch_range(ts(10, 0), ts(12, 0)).unwrap();
        let names: Vec<_> = sessions.iter().map(|s| s.app_name.as_ref()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn search_matches_app_name_and_title() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store
            .insert(sample("editor", Some("project plan"), ts(10, 0)))
            .unwrap();
        store
            .insert(sample("browser", Some("cat videos"), ts(11, 0)))
            .unwrap();

        let filter = SearchFilter {
            query: Some("plan".into()),
            ..Default::default()
        };
        let found = store.search_sessions(&filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].app_name.as_ref(), "editor");

        let filter = SearchFilter {
            query: Some("BROWSER".into()),
            ..Default::default()
        };
        assert_eq!(store.search_sessions(&filter).unwrap().len(), 1);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store
            .insert(sample("editor", Some("100% done"), ts(10, 0)))
            .unwrap();
        store
            .insert(sample("editor", Some("100 percent done"), ts(11, 0)))
            .unwrap();

        let filter = SearchFilter {
            query: Some("100%".into()),
            ..Default::default()
        };
        let found = store.search_sessions(&filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].window_title.as_deref(), Some("100% done"));

        let filter = SearchFilter {
            query: Some("1__%".into()),
            ..Default::default()
        };
        assert!(store.search_sessions(&filter).unwrap().is_empty());
    }

    #[test]
    fn search_combines_filters_and_limit() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        for minute in 0..5 {
            store
                .insert(sample("editor", Some("doc"), ts(10, minute)))
                .unwrap();
        }
        store
            .insert(sample("browser", Some("doc"), ts(10, 6)))
            .unwrap();

        let filter = SearchFilter {
            query: Some("doc".into()),
            app_name: Some("editor".into()),
            range: Some((ts(10, 1), ts(10, 7))),
            limit: Some(2),
        };
        let found = store.search_sessions(&filter).unwrap();
        assert_eq!(found.len(), 2);
        // Newest first.
        assert!(found[0].started_at > found[1].started_at);
        assert!(found.iter().all(|s| s.app_name.as_ref() == "editor"));
    }

    #[test]
    fn delete_variants() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let kept = store.insert(sample("editor", None, ts(9, 0))).unwrap();
        let by_id = store.insert(sample("editor", None, ts(10, 0))).unwrap();
        store.insert(sample("browser", None, ts(11, 0))).unwrap();
        store.insert(sample("browser", None, ts(12, 0))).unwrap();

        assert!(store.delete_by_id(by_id.id.unwrap()).unwrap());
        assert!(!store.delete_by_id(by_id.id.unwrap()).unwrap());

        assert_eq!(store.delete_by_app_name("brow", None).unwrap(), 2);
        assert_eq!(store.count_all().unwrap(), 1);
        assert_eq!(
            store.fetch_session(kept.id.unwrap()).unwrap().unwrap().id,
            kept.id
        );

        store.insert(sample("editor", None, ts(13, 0))).unwrap();
        assert_eq!(store.delete_by_range(ts(12, 30), ts(14, 0)).unwrap(), 1);
        assert_eq!(store.delete_all().unwrap(), 1);
        assert_eq!(store.count_all().unwrap(), 0);
    }

    #[test]
    fn orphans_are_deleted_not_closed() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let closed = store.insert(sample("editor", None, ts(9, 0))).unwrap();
        store.end_session(closed.id.unwrap(), ts(9, 30)).unwrap();
        store.insert(sample("editor", None, ts(10, 0))).unwrap();

        assert_eq!(store.delete_orphaned().unwrap(), 1);
        assert_eq!(store.count_all().unwrap(), 1);
        assert!(store.fetch_current().unwrap().is_none());
    }

    #[test]
    fn close_all_open_stamps_given_instant() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let open = store.insert(sample("editor", None, ts(10, 0))).unwrap();

        assert_eq!(store.close_all_open(ts(10, 45)).unwrap(), 1);
        assert_eq!(store.close_all_open(ts(11, 0)).unwrap(), 0);

        let fetched = store.fetch_session(open.id.unwrap()).unwrap().unwrap();
        assert_eq!(fetched.ended_at, Some(ts(10, 45)));
    }

    #[test]
    fn aggregation_includes_open_sessions_at_pinned_now() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let closed = store
            .insert(sample("editor", Some("doc"), ts(10, 0)))
            .unwrap();
        store.end_session(closed.id.unwrap(), ts(10, 30)).unwrap();
        // Open session, 15 minutes old at the pinned `now`.
        store
            .insert(sample("browser", Some("news"), ts(10, 30)))
            .unwrap();

        let now = ts(10, 45);
        let total = store.total_seconds(ts(0, 0), ts(23, 0), now).unwrap();
        assert_eq!(total, 1800 + 900);

        let by_app = store.summarize_by_app(ts(0, 0), ts(23, 0), now).unwrap();
        assert_eq!(by_app.len(), 2);
        assert_eq!(by_app[0].app_name, "editor");
        assert_eq!(by_app[0].total_seconds, 1800);
        assert_eq!(by_app[1].app_name, "browser");
        assert_eq!(by_app[1].total_seconds, 900);

        // Aggregate equals the sum of individual durations.
        let sessions = store.fetch_range(ts(0, 0), ts(23, 0)).unwrap();
        let summed: i64 = sessions.iter().map(|s| s.elapsed(now).num_seconds()).sum();
        assert_eq!(total, summed);
    }

    #[test]
    fn window_summaries_group_missing_titles_together() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        for (title, minutes) in [(None, 10), (Some("doc"), 20), (None, 5)] {
            let started = ts(10, 0);
            let inserted = store.insert(sample("editor", title, started)).unwrap();
            store
                .end_session(
                    inserted.id.unwrap(),
                    started + Duration::minutes(minutes),
                )
                .unwrap();
        }

        let by_window = store
            .summarize_by_window(ts(0, 0), ts(23, 0), ts(12, 0))
            .unwrap();
        assert_eq!(by_window.len(), 2);
        assert_eq!(by_window[0].window_title, "doc");
        assert_eq!(by_window[0].total_seconds, 1200);
        assert_eq!(by_window[1].window_title, "");
        assert_eq!(by_window[1].total_seconds, 900);
        assert_eq!(by_window[1].session_count, 2);
    }

    #[test]
    fn in_memory_store_supports_reads_and_writes() {
        let store = SessionStore::open_in_memory().unwrap();
        let inserted = store.insert(sample("editor", None, ts(10, 0))).unwrap();
        store.end_session(inserted.id.unwrap(), ts(10, 5)).unwrap();
        assert_eq!(store.count_all().unwrap(), 1);
        assert!(store.fetch_current().unwrap().is_none());
    }

    #[test]
    fn reopening_preserves_rows_and_schema() {
        let dir = tempdir().unwrap();
        {
            let store = open_store(&dir);
            store.insert(sample("editor", None, ts(10, 0))).unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.count_all().unwrap(), 1);
    }
}
