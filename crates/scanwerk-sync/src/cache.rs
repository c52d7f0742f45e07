// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local document cache backed by SQLite.
//
// Document metadata, pages and text blocks are stored as one JSON body per
// document; page bitmaps live in a separate blob table. An upsert replaces
// both inside a single transaction so a crash never leaves a document with
// half of its pages. Every row carries the SHA-256 content hash of the
// document it was written from, and loads are verified against it.
//
// Schema:
//   documents(
//     id            TEXT PRIMARY KEY,
//     owner         TEXT    NOT NULL,
//     title         TEXT    NOT NULL,
//     modified_at   TEXT    NOT NULL,   -- RFC 3339, microseconds, UTC
//     sync_state    TEXT    NOT NULL,
//     unsynced      INTEGER NOT NULL,   -- 1 = local edits since last sync
//     page_count    INTEGER NOT NULL,
//     content_hash  TEXT    NOT NULL,
//     body          TEXT    NOT NULL    -- serde_json Document
//   )
//   page_images(document_id, page_id, width, height, pixels BLOB)

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::integrity::verify_hash;
use scanwerk_core::model::{Document, RectifiedImage, SyncState};
use scanwerk_core::types::{DocumentId, PageId};

const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        title TEXT NOT NULL,
        modified_at TEXT NOT NULL,
        sync_state TEXT NOT NULL,
        unsynced INTEGER NOT NULL,
        page_count INTEGER NOT NULL,
        content_hash TEXT NOT NULL,
        body TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS documents_owner_modified
        ON documents (owner, modified_at DESC);
    CREATE TABLE IF NOT EXISTS page_images (
        document_id TEXT NOT NULL REFERENCES documents (id) ON DELETE CASCADE,
        page_id INTEGER NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        pixels BLOB NOT NULL,
        PRIMARY KEY (document_id, page_id)
    );
"#;

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> ScanwerkError + '_ {
    move |e| ScanwerkError::Database(format!("{context}: {e}"))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Listing row: everything needed to show a document without loading its
/// page bitmaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub id: DocumentId,
    pub owner: String,
    pub title: String,
    pub modified_at: DateTime<Utc>,
    pub sync_state: SyncState,
    pub unsynced: bool,
    pub page_count: u32,
    pub content_hash: String,
}

/// Local persistence for documents.
///
/// The cache is the one shared mutable resource in the pipeline. Reads
/// return snapshots; callers mutate their own copy and upsert it back.
pub trait LocalCache: Send + Sync {
    /// Load a full document, page images included.
    fn get(&self, id: DocumentId) -> Result<Option<Document>>;

    /// All documents of `owner`, most recently modified first.
    fn list_by_owner(&self, owner: &str) -> Result<Vec<DocumentEntry>>;

    /// Documents of `owner` whose title contains `query`, ignoring case.
    fn search(&self, owner: &str, query: &str) -> Result<Vec<DocumentEntry>>;

    /// Documents of `owner` with local edits the remote has not seen.
    fn list_unsynced(&self, owner: &str) -> Result<Vec<DocumentEntry>>;

    /// Insert or replace a document atomically.
    fn upsert(&self, doc: &Document) -> Result<()>;

    /// Remove a document. Returns whether it existed.
    fn delete(&self, id: DocumentId) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

/// `LocalCache` over a single SQLite connection.
///
/// `rusqlite` is synchronous; async callers should go through
/// `tokio::task::spawn_blocking` or accept the short blocking section.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (or create) the cache database at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err("open"))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err("WAL pragma"))?;
        let cache = Self::init(conn)?;
        info!("document cache opened");
        Ok(cache)
    }

    /// In-memory cache for tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open in-memory"))?;
        let cache = Self::init(conn)?;
        debug!("in-memory document cache opened");
        Ok(cache)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(db_err("foreign_keys pragma"))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(db_err("create tables"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the guard cannot leave SQLite mid-transaction:
        // an unfinished `Transaction` rolls back on drop.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn query_entries(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<DocumentEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql).map_err(db_err("prepare listing"))?;
        let rows = stmt
            .query_map(params, row_to_entry)
            .map_err(db_err("query listing"))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err("read listing row"))?);
        }
        Ok(entries)
    }
}

const ENTRY_COLUMNS: &str =
    "id, owner, title, modified_at, sync_state, unsynced, page_count, content_hash";

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentEntry> {
    let conversion = |index: usize, err: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, err)
    };

    let id: String = row.get(0)?;
    let id = DocumentId::parse(&id).ok_or_else(|| conversion(0, format!("bad id {id}").into()))?;
    let modified: String = row.get(3)?;
    let modified_at = DateTime::parse_from_rfc3339(&modified)
        .map_err(|e| conversion(3, Box::new(e)))?
        .with_timezone(&Utc);
    let state: String = row.get(4)?;
    let sync_state = serde_json::from_str(&state).map_err(|e| conversion(4, Box::new(e)))?;

    Ok(DocumentEntry {
        id,
        owner: row.get(1)?,
        title: row.get(2)?,
        modified_at,
        sync_state,
        unsynced: row.get::<_, i64>(5)? != 0,
        page_count: row.get(6)?,
        content_hash: row.get(7)?,
    })
}

impl LocalCache for SqliteCache {
    #[instrument(skip(self), fields(document = %id))]
    fn get(&self, id: DocumentId) -> Result<Option<Document>> {
        let conn = self.conn();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT body, content_hash FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err("get document"))?;
        let Some((body, stored_hash)) = row else {
            debug!("document not in cache");
            return Ok(None);
        };

        let mut doc: Document = serde_json::from_str(&body)?;

        let mut stmt = conn
            .prepare("SELECT page_id, width, height, pixels FROM page_images WHERE document_id = ?1")
            .map_err(db_err("prepare page images"))?;
        let images = stmt
            .query_map(params![id.to_string()], |row| {
                Ok((
                    PageId(row.get(0)?),
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })
            .map_err(db_err("query page images"))?;
        for image in images {
            let (page_id, width, height, pixels) = image.map_err(db_err("read page image"))?;
            match doc.attach_page_image(page_id, RectifiedImage::from_rgb8(width, height, pixels)?) {
                Ok(()) => {}
                Err(ScanwerkError::PageNotFound(_)) => {
                    warn!(page = %page_id, "orphaned page image ignored");
                }
                Err(err) => return Err(err),
            }
        }

        verify_hash(&doc.content_hash(), &stored_hash)?;
        debug!(pages = doc.pages().len(), "document loaded from cache");
        Ok(Some(doc))
    }

    fn list_by_owner(&self, owner: &str) -> Result<Vec<DocumentEntry>> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM documents WHERE owner = ?1
                 ORDER BY modified_at DESC, id"
            ),
            &[&owner],
        )
    }

    fn search(&self, owner: &str, query: &str) -> Result<Vec<DocumentEntry>> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM documents
                 WHERE owner = ?1 AND instr(lower(title), lower(?2)) > 0
                 ORDER BY modified_at DESC, id"
            ),
            &[&owner, &query.trim()],
        )
    }

    fn list_unsynced(&self, owner: &str) -> Result<Vec<DocumentEntry>> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM documents WHERE owner = ?1 AND unsynced = 1
                 ORDER BY modified_at DESC, id"
            ),
            &[&owner],
        )
    }

    #[instrument(skip_all, fields(document = %doc.id, pages = doc.pages().len()))]
    fn upsert(&self, doc: &Document) -> Result<()> {
        let body = serde_json::to_string(doc)?;
        let state = serde_json::to_string(&doc.sync.state)?;
        let hash = doc.content_hash();
        let id = doc.id.to_string();

        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_err("begin upsert"))?;
        tx.execute(
            "INSERT INTO documents
                (id, owner, title, modified_at, sync_state, unsynced, page_count, content_hash, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (id) DO UPDATE SET
                owner = excluded.owner,
                title = excluded.title,
                modified_at = excluded.modified_at,
                sync_state = excluded.sync_state,
                unsynced = excluded.unsynced,
                page_count = excluded.page_count,
                content_hash = excluded.content_hash,
                body = excluded.body",
            params![
                id,
                doc.owner,
                doc.title(),
                timestamp(doc.modified_at),
                state,
                doc.has_unsynced_changes() as i64,
                doc.pages().len() as i64,
                hash,
                body,
            ],
        )
        .map_err(db_err("upsert document"))?;
        tx.execute("DELETE FROM page_images WHERE document_id = ?1", params![id])
            .map_err(db_err("clear page images"))?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO page_images (document_id, page_id, width, height, pixels)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(db_err("prepare page image insert"))?;
            for page in doc.pages() {
                let image = page.image();
                insert
                    .execute(params![
                        id,
                        page.id().0,
                        image.width(),
                        image.height(),
                        image.pixels(),
                    ])
                    .map_err(db_err("insert page image"))?;
            }
        }
        tx.commit().map_err(db_err("commit upsert"))?;

        info!(content_hash = %hash, "document cached");
        Ok(())
    }

    #[instrument(skip(self), fields(document = %id))]
    fn delete(&self, id: DocumentId) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_err("begin delete"))?;
        tx.execute("DELETE FROM page_images WHERE document_id = ?1", params![id.to_string()])
            .map_err(db_err("delete page images"))?;
        let rows = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])
            .map_err(db_err("delete document"))?;
        tx.commit().map_err(db_err("commit delete"))?;

        info!(existed = rows > 0, "document deleted from cache");
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use scanwerk_core::geometry::Polygon;
    use scanwerk_core::model::{Page, TextBlock};

    use super::*;

    fn page_with_text(text: &str) -> Page {
        let image = RectifiedImage::from_rgb8(4, 2, vec![7; 4 * 2 * 3]).expect("image");
        let mut page = Page::new(image);
        page.apply_recognition(
            vec![TextBlock {
                polygon: Polygon::from_rect(0.0, 0.0, 4.0, 2.0),
                text: text.into(),
                confidence: 0.8,
                reading_order: 0,
                line: 0,
            }],
            "en",
        );
        page
    }

    fn document(owner: &str, title: &str) -> Document {
        let mut doc = Document::new(owner, title);
        doc.add_page(page_with_text("first"), None).expect("page");
        doc.add_page(page_with_text("second"), None).expect("page");
        doc
    }

    #[test]
    fn upsert_and_get_restores_images() {
        let cache = SqliteCache::open_in_memory().expect("cache");
        let doc = document("alice", "Lease");
        cache.upsert(&doc).expect("upsert");

        let loaded = cache.get(doc.id).expect("get").expect("present");
        assert_eq!(loaded, doc);
        assert_eq!(loaded.pages()[1].image().pixels(), &[7; 24][..]);
        assert_eq!(loaded.plain_text(), "first\n\nsecond");
    }

    #[test]
    fn missing_document_is_none() {
        let cache = SqliteCache::open_in_memory().expect("cache");
        assert!(cache.get(DocumentId::new()).expect("get").is_none());
    }

    #[test]
    fn upsert_replaces_pages() {
        let cache = SqliteCache::open_in_memory().expect("cache");
        let mut doc = document("alice", "Lease");
        cache.upsert(&doc).expect("first upsert");

        let first = doc.pages()[0].id();
        doc.remove_page(first).expect("remove");
        cache.upsert(&doc).expect("second upsert");

        let loaded = cache.get(doc.id).expect("get").expect("present");
        assert_eq!(loaded.pages().len(), 1);
        assert_eq!(loaded.plain_text(), "second");
    }

    #[test]
    fn listing_is_newest_first_and_per_owner() {
        let cache = SqliteCache::open_in_memory().expect("cache");
        let older = document("alice", "Older");
        let mut newer = document("alice", "Newer");
        newer.modified_at = older.modified_at + chrono::Duration::seconds(5);
        let other = document("bob", "Elsewhere");
        for doc in [&older, &newer, &other] {
            cache.upsert(doc).expect("upsert");
        }

        let titles: Vec<String> = cache
            .list_by_owner("alice")
            .expect("list")
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, ["Newer", "Older"]);
    }

    #[test]
    fn search_ignores_case() {
        let cache = SqliteCache::open_in_memory().expect("cache");
        cache.upsert(&document("alice", "Tax Return 2025")).expect("upsert");
        cache.upsert(&document("alice", "Recipe")).expect("upsert");

        let hits = cache.search("alice", "tax").expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Tax Return 2025");
        assert_eq!(hits[0].page_count, 2);
    }

    #[test]
    fn unsynced_listing_follows_sync_metadata() {
        let cache = SqliteCache::open_in_memory().expect("cache");
        let dirty = document("alice", "Dirty");
        let mut clean = document("alice", "Clean");
        clean.sync.state = SyncState::Synced;
        clean.sync.last_synced_at = Some(clean.modified_at);
        cache.upsert(&dirty).expect("upsert");
        cache.upsert(&clean).expect("upsert");

        let unsynced = cache.list_unsynced("alice").expect("unsynced");
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, dirty.id);
    }

    #[test]
    fn delete_removes_document_and_images() {
        let cache = SqliteCache::open_in_memory().expect("cache");
        let doc = document("alice", "Gone");
        cache.upsert(&doc).expect("upsert");

        assert!(cache.delete(doc.id).expect("delete"));
        assert!(!cache.delete(doc.id).expect("second delete"));
        assert!(cache.get(doc.id).expect("get").is_none());
    }

    #[test]
    fn tampered_row_fails_integrity_check() {
        let cache = SqliteCache::open_in_memory().expect("cache");
        let doc = document("alice", "Signed");
        cache.upsert(&doc).expect("upsert");
        cache
            .conn()
            .execute(
                "UPDATE page_images SET pixels = ?1 WHERE page_id = 1",
                params![vec![0u8; 24]],
            )
            .expect("tamper");

        assert!(matches!(
            cache.get(doc.id),
            Err(ScanwerkError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn file_backed_cache_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.db");
        let doc = document("alice", "Persistent");
        {
            let cache = SqliteCache::open(&path).expect("open");
            cache.upsert(&doc).expect("upsert");
        }
        let cache = SqliteCache::open(&path).expect("reopen");
        assert_eq!(cache.get(doc.id).expect("get"), Some(doc));
    }
}
