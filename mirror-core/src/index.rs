//! ChangeIndex: SQLite-backed cache of page metadata and the sync log.
//!
//! Two tables:
//! - `pages`: one row per known page, primary key `id`.
//! - `sync_log`: append-only, one row per reconciliation pass.
//!
//! Every mutating call runs in its own transaction. [`ChangeIndex::apply_batch`]
//! is the one used at the end of a pass so that all record updates of that
//! pass land together or not at all.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::error::IndexError;
use crate::types::{Direction, Outcome, PageId, PageRecord, PageStatus, SyncLogEntry};

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;

    CREATE TABLE IF NOT EXISTS pages (
        id               TEXT PRIMARY KEY,
        title            TEXT NOT NULL,
        parent_id        TEXT,
        content_hash     TEXT NOT NULL,
        remote_edited_at TEXT NOT NULL,
        last_synced_at   TEXT NOT NULL,
        status           TEXT NOT NULL DEFAULT 'synced'
    );

    CREATE INDEX IF NOT EXISTS idx_pages_remote_edited ON pages(remote_edited_at);
    CREATE INDEX IF NOT EXISTS idx_pages_status ON pages(status);

    CREATE TABLE IF NOT EXISTS sync_log (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        run_at        TEXT NOT NULL,
        direction     TEXT NOT NULL,
        pages_touched INTEGER NOT NULL,
        outcome       TEXT NOT NULL,
        message       TEXT NOT NULL DEFAULT ''
    );
"#;

const PAGE_COLUMNS: &str =
    "id, title, parent_id, content_hash, remote_edited_at, last_synced_at, status";

#[derive(Debug)]
pub struct ChangeIndex {
    conn: Connection,
}

impl ChangeIndex {
    /// Open (creating if needed) the index database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| IndexError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        let index = Self { conn };
        index.migrate()?;
        Ok(index)
    }

    /// Open a private in-memory index. Used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let index = Self {
            conn: Connection::open_in_memory()?,
        };
        index.migrate()?;
        Ok(index)
    }

    fn migrate(&self) -> Result<(), IndexError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, id: &PageId) -> Result<Option<PageRecord>, IndexError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?1"),
                params![id.as_str()],
                RawPage::from_row,
            )
            .optional()?;
        raw.map(RawPage::into_record).transpose()
    }

    /// Every known record, newest remote edit first.
    pub fn list_all(&self) -> Result<Vec<PageRecord>, IndexError> {
        self.query_pages(
            &format!("SELECT {PAGE_COLUMNS} FROM pages ORDER BY remote_edited_at DESC, id"),
            params![],
        )
    }

    pub fn list_by_status(&self, status: PageStatus) -> Result<Vec<PageRecord>, IndexError> {
        self.query_pages(
            &format!(
                "SELECT {PAGE_COLUMNS} FROM pages WHERE status = ?1 \
                 ORDER BY remote_edited_at DESC, id"
            ),
            params![status.as_str()],
        )
    }

    /// Case-insensitive title search, newest remote edit first.
    pub fn search(&self, query: &str) -> Result<Vec<PageRecord>, IndexError> {
        let pattern = format!("%{}%", escape_like(query));
        self.query_pages(
            &format!(
                "SELECT {PAGE_COLUMNS} FROM pages WHERE title LIKE ?1 ESCAPE '\\' \
                 ORDER BY remote_edited_at DESC, id"
            ),
            params![pattern],
        )
    }

    /// Number of records per status, in [`PageStatus::ALL`] order.
    pub fn count_by_status(&self) -> Result<Vec<(PageStatus, usize)>, IndexError> {
        let mut counts = Vec::with_capacity(PageStatus::ALL.len());
        for status in PageStatus::ALL {
            let n: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM pages WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )?;
            counts.push((status, n as usize));
        }
        Ok(counts)
    }

    pub fn latest_log(&self) -> Result<Option<SyncLogEntry>, IndexError> {
        let raw = self
            .conn
            .query_row(
                "SELECT run_at, direction, pages_touched, outcome, message \
                 FROM sync_log ORDER BY id DESC LIMIT 1",
                params![],
                RawLog::from_row,
            )
            .optional()?;
        raw.map(RawLog::into_entry).transpose()
    }

    /// Number of log entries written so far.
    pub fn log_len(&self) -> Result<usize, IndexError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_log", params![], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Time of the most recent pass that ended in `success`.
    pub fn last_successful_sync(&self) -> Result<Option<DateTime<Utc>>, IndexError> {
        let at = self
            .conn
            .query_row(
                "SELECT run_at FROM sync_log WHERE outcome = 'success' \
                 ORDER BY id DESC LIMIT 1",
                params![],
                |row| row.get::<_, DateTime<Utc>>(0),
            )
            .optional()?;
        Ok(at)
    }

    fn query_pages(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<PageRecord>, IndexError> {
        let mut stmt = self.conn.prepare(sql)?;
        let raws = stmt
            .query_map(params, RawPage::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawPage::into_record).collect()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub fn upsert(&mut self, record: &PageRecord) -> Result<(), IndexError> {
        self.apply_batch(std::slice::from_ref(record), &[])
    }

    /// Mark a record deleted. Returns `false` when the id is unknown.
    pub fn mark_deleted(&mut self, id: &PageId) -> Result<bool, IndexError> {
        let changed = self.conn.execute(
            "UPDATE pages SET status = ?1 WHERE id = ?2",
            params![PageStatus::Deleted.as_str(), id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Upsert `records` and mark `deleted` ids as deleted in one transaction.
    pub fn apply_batch(
        &mut self,
        records: &[PageRecord],
        deleted: &[PageId],
    ) -> Result<(), IndexError> {
        let tx = self.conn.transaction()?;
        for record in records {
            upsert_tx(&tx, record)?;
        }
        for id in deleted {
            tx.execute(
                "UPDATE pages SET status = ?1 WHERE id = ?2",
                params![PageStatus::Deleted.as_str(), id.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn append_log(&mut self, entry: &SyncLogEntry) -> Result<(), IndexError> {
        self.conn.execute(
            "INSERT INTO sync_log(run_at, direction, pages_touched, outcome, message) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.run_at,
                entry.direction.as_str(),
                entry.pages_touched as i64,
                entry.outcome.as_str(),
                entry.message,
            ],
        )?;
        Ok(())
    }
}

fn upsert_tx(tx: &Transaction<'_>, record: &PageRecord) -> Result<(), IndexError> {
    let previous: Option<DateTime<Utc>> = tx
        .query_row(
            "SELECT last_synced_at FROM pages WHERE id = ?1",
            params![record.id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    // lastSyncedAt never moves backwards.
    let last_synced_at = previous.map_or(record.last_synced_at, |p| p.max(record.last_synced_at));

    tx.execute(
        r#"
        INSERT INTO pages(id, title, parent_id, content_hash, remote_edited_at, last_synced_at, status)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            parent_id = excluded.parent_id,
            content_hash = excluded.content_hash,
            remote_edited_at = excluded.remote_edited_at,
            last_synced_at = excluded.last_synced_at,
            status = excluded.status
        "#,
        params![
            record.id.as_str(),
            record.title,
            record.parent_id.as_ref().map(PageId::as_str),
            record.content_hash,
            record.remote_edited_at,
            last_synced_at,
            record.status.as_str(),
        ],
    )?;
    Ok(())
}

fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct RawPage {
    id: String,
    title: String,
    parent_id: Option<String>,
    content_hash: String,
    remote_edited_at: DateTime<Utc>,
    last_synced_at: DateTime<Utc>,
    status: String,
}

impl RawPage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            parent_id: row.get(2)?,
            content_hash: row.get(3)?,
            remote_edited_at: row.get(4)?,
            last_synced_at: row.get(5)?,
            status: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<PageRecord, IndexError> {
        let status = self.status.parse().map_err(|_| IndexError::Corrupt {
            column: "pages.status",
            value: self.status.clone(),
        })?;
        Ok(PageRecord {
            id: PageId(self.id),
            title: self.title,
            parent_id: self.parent_id.map(PageId),
            content_hash: self.content_hash,
            remote_edited_at: self.remote_edited_at,
            last_synced_at: self.last_synced_at,
            status,
        })
    }
}

struct RawLog {
    run_at: DateTime<Utc>,
    direction: String,
    pages_touched: i64,
    outcome: String,
    message: String,
}

impl RawLog {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_at: row.get(0)?,
            direction: row.get(1)?,
            pages_touched: row.get(2)?,
            outcome: row.get(3)?,
            message: row.get(4)?,
        })
    }

    fn into_entry(self) -> Result<SyncLogEntry, IndexError> {
        let direction: Direction = self.direction.parse().map_err(|_| IndexError::Corrupt {
            column: "sync_log.direction",
            value: self.direction.clone(),
        })?;
        let outcome: Outcome = self.outcome.parse().map_err(|_| IndexError::Corrupt {
            column: "sync_log.outcome",
            value: self.outcome.clone(),
        })?;
        Ok(SyncLogEntry {
            run_at: self.run_at,
            direction,
            pages_touched: self.pages_touched.max(0) as usize,
            outcome,
            message: self.message,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(id: &str, title: &str) -> PageRecord {
        PageRecord {
            id: PageId::from(id),
            title: title.to_string(),
            parent_id: None,
            content_hash: "h0".to_string(),
            remote_edited_at: at(0),
            last_synced_at: at(10),
            status: PageStatus::Synced,
        }
    }

    #[test]
    fn get_missing_returns_none() {
        let index = ChangeIndex::open_in_memory().unwrap();
        assert!(index.get(&PageId::from("nope")).unwrap().is_none());
    }

    #[test]
    fn upsert_then_get_roundtrips_every_field() {
        let mut index = ChangeIndex::open_in_memory().unwrap();
        let mut rec = record("a", "Alpha");
        rec.parent_id = Some(PageId::from("root"));
        rec.status = PageStatus::Conflict;
        index.upsert(&rec).unwrap();
        assert_eq!(index.get(&rec.id).unwrap(), Some(rec));
    }

    #[test]
    fn upsert_never_moves_last_synced_backwards() {
        let mut index = ChangeIndex::open_in_memory().unwrap();
        let rec = record("a", "Alpha");
        index.upsert(&rec).unwrap();

        let mut older = rec.clone();
        older.last_synced_at = rec.last_synced_at - Duration::hours(1);
        older.title = "Renamed".into();
        index.upsert(&older).unwrap();

        let stored = index.get(&rec.id).unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.last_synced_at, rec.last_synced_at);
    }

    #[test]
    fn mark_deleted_keeps_the_row() {
        let mut index = ChangeIndex::open_in_memory().unwrap();
        index.upsert(&record("a", "Alpha")).unwrap();
        assert!(index.mark_deleted(&PageId::from("a")).unwrap());
        assert!(!index.mark_deleted(&PageId::from("zzz")).unwrap());
        let stored = index.get(&PageId::from("a")).unwrap().unwrap();
        assert_eq!(stored.status, PageStatus::Deleted);
        assert_eq!(index.list_by_status(PageStatus::Deleted).unwrap().len(), 1);
    }

    #[test]
    fn apply_batch_upserts_and_deletes_together() {
        let mut index = ChangeIndex::open_in_memory().unwrap();
        index.upsert(&record("gone", "Gone")).unwrap();
        index
            .apply_batch(
                &[record("a", "Alpha"), record("b", "Beta")],
                &[PageId::from("gone")],
            )
            .unwrap();
        let all = index.list_all().unwrap();
        assert_eq!(all.len(), 3);
        let counts = index.count_by_status().unwrap();
        assert!(counts.contains(&(PageStatus::Synced, 2)));
        assert!(counts.contains(&(PageStatus::Deleted, 1)));
    }

    #[test]
    fn search_is_case_insensitive_and_escapes_wildcards() {
        let mut index = ChangeIndex::open_in_memory().unwrap();
        index.upsert(&record("a", "Meeting Notes")).unwrap();
        index.upsert(&record("b", "100% done")).unwrap();
        index.upsert(&record("c", "Other")).unwrap();

        let hits = index.search("meeting").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, PageId::from("a"));

        let hits = index.search("%").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, PageId::from("b"));
    }

    #[test]
    fn latest_log_returns_most_recent_entry() {
        let mut index = ChangeIndex::open_in_memory().unwrap();
        assert!(index.latest_log().unwrap().is_none());

        let first = SyncLogEntry {
            run_at: at(0),
            direction: Direction::Pull,
            pages_touched: 3,
            outcome: Outcome::Success,
            message: String::new(),
        };
        let second = SyncLogEntry {
            run_at: at(60),
            direction: Direction::Noop,
            pages_touched: 0,
            outcome: Outcome::Failed,
            message: "remote down".into(),
        };
        index.append_log(&first).unwrap();
        index.append_log(&second).unwrap();

        assert_eq!(index.latest_log().unwrap(), Some(second));
        assert_eq!(index.last_successful_sync().unwrap(), Some(at(0)));
        assert_eq!(index.log_len().unwrap(), 2);
    }

    #[test]
    fn corrupt_status_is_reported() {
        let index = ChangeIndex::open_in_memory().unwrap();
        index
            .conn
            .execute(
                "INSERT INTO pages VALUES ('x', 't', NULL, 'h', ?1, ?1, 'weird')",
                params![at(0)],
            )
            .unwrap();
        let err = index.get(&PageId::from("x")).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }), "got: {err}");
    }
}
