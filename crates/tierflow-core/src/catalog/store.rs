//! SQLite mirror of fabric entities.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::fts;
use super::query::{like_prefix, CatalogQuery};
use crate::config::CatalogConfig;
use crate::error::{Result, TierflowError};
use crate::models::{CatalogEntry, Entity, EntityKind, TagMap};

const ENTRY_COLUMNS: &str = "e.id, e.item_type, e.uuid, e.name, e.path, e.share_uuid, e.volume_uuid, \
     e.node_uuid, e.size_bytes, e.is_directory, e.replication_status, e.tags_json, \
     e.extended_info_json, e.created, e.modified, e.last_synced";

/// Timestamps are stored in a fixed-width UTC form so they compare as text.
pub(crate) fn db_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// One page of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage {
    pub entries: Vec<CatalogEntry>,
    /// Matches across all pages.
    pub total_count: usize,
    pub limit: usize,
    pub offset: usize,
    pub query_time_ms: f64,
}

/// Bookkeeping for the most recent sync of one entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub item_type: EntityKind,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub item_count: u64,
    pub generation: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub total_items: u64,
    pub items_by_kind: BTreeMap<String, u64>,
    pub stale_items: u64,
    pub stale_by_kind: BTreeMap<String, u64>,
    pub staleness_threshold_secs: u64,
    pub max_stale_entries: u64,
    pub integrity_ok: bool,
    /// Output of `PRAGMA integrity_check`, or the error that prevented it.
    pub integrity: Vec<String>,
    pub page_count: u64,
    pub page_size: u64,
    pub size_bytes: u64,
    pub oldest_sync: Option<DateTime<Utc>>,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindOverview {
    pub kind: EntityKind,
    pub count: u64,
    pub synced_last_24h: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogOverview {
    pub db_path: String,
    pub total_items: u64,
    pub kinds: Vec<KindOverview>,
}

/// Persistent catalog of fabric entities.
///
/// One row per `(item_type, uuid)`. Writes for one kind happen in a single
/// transaction, so readers never observe a half-synced kind.
pub struct CatalogStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
    staleness_threshold: Duration,
    max_stale_entries: u64,
}

impl CatalogStore {
    /// Create or open a store with default staleness policy.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let defaults = CatalogConfig::default();
        Self::with_policy(
            db_path,
            defaults.staleness_threshold(),
            defaults.max_stale_entries,
        )
    }

    /// Create or open the store described by `config`.
    pub fn open(config: &CatalogConfig) -> Result<Self> {
        Self::with_policy(
            config.db_path.clone(),
            config.staleness_threshold(),
            config.max_stale_entries,
        )
    }

    pub fn with_policy(
        db_path: impl Into<PathBuf>,
        staleness_threshold: Duration,
        max_stale_entries: u64,
    ) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| TierflowError::Io {
                    message: format!("Failed to create directory {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Self::open_connection(&db_path)?;
        info!(path = %db_path.display(), "Opened catalog store");

        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
            staleness_threshold,
            max_stale_entries,
        })
    }

    fn open_connection(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;
        fts::ensure_setup(&conn)?;
        Ok(conn)
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=30000;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            ",
        )?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS catalog_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_type TEXT NOT NULL,
                uuid TEXT NOT NULL,
                name TEXT NOT NULL,
                path TEXT,
                share_uuid TEXT,
                volume_uuid TEXT,
                node_uuid TEXT,
                size_bytes INTEGER,
                is_directory INTEGER NOT NULL DEFAULT 0,
                replication_status TEXT,
                tags_json TEXT NOT NULL DEFAULT '{}',
                extended_info_json TEXT NOT NULL DEFAULT '{}',
                created TEXT,
                modified TEXT,
                last_synced TEXT NOT NULL,
                sync_generation INTEGER NOT NULL DEFAULT 0,
                UNIQUE(item_type, uuid)
            );
            CREATE INDEX IF NOT EXISTS idx_entries_path ON catalog_entries(path);
            CREATE INDEX IF NOT EXISTS idx_entries_share ON catalog_entries(share_uuid);
            CREATE INDEX IF NOT EXISTS idx_entries_synced ON catalog_entries(item_type, last_synced);

            CREATE TABLE IF NOT EXISTS entry_tags (
                entry_id INTEGER NOT NULL REFERENCES catalog_entries(id) ON DELETE CASCADE,
                tag_key TEXT NOT NULL,
                tag_value TEXT NOT NULL,
                PRIMARY KEY (entry_id, tag_key)
            );
            CREATE INDEX IF NOT EXISTS idx_entry_tags_kv ON entry_tags(tag_key, tag_value);

            CREATE TABLE IF NOT EXISTS sync_state (
                item_type TEXT PRIMARY KEY,
                last_attempt TEXT,
                last_success TEXT,
                last_error TEXT,
                item_count INTEGER NOT NULL DEFAULT 0,
                generation INTEGER NOT NULL DEFAULT 0
            );
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TierflowError::database("Failed to acquire connection lock"))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn staleness_threshold(&self) -> Duration {
        self.staleness_threshold
    }

    /// Replace the snapshot of one entity kind.
    ///
    /// Upserts every entity and removes rows of the kind that were absent
    /// from `entities`, all in one transaction. Returns the number of rows
    /// written.
    pub fn replace_kind(
        &self,
        kind: EntityKind,
        entities: &[Entity],
        synced_at: DateTime<Utc>,
    ) -> Result<usize> {
        if let Some(other) = entities.iter().find(|e| e.kind() != kind) {
            return Err(TierflowError::invalid_params(format!(
                "{} entity {} in a {} sync",
                other.kind(),
                other.meta().uuid,
                kind
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let generation: i64 = tx
            .query_row(
                "SELECT generation FROM sync_state WHERE item_type = ?1",
                [kind.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0)
            + 1;

        for entity in entities {
            upsert_entry(&tx, &entity.to_entry(synced_at), generation)?;
        }

        let removed = tx.execute(
            "DELETE FROM catalog_entries WHERE item_type = ?1 AND sync_generation <> ?2",
            params![kind.as_str(), generation],
        )?;

        let now = db_timestamp(synced_at);
        tx.execute(
            "INSERT INTO sync_state (item_type, last_attempt, last_success, last_error, item_count, generation)
             VALUES (?1, ?2, ?2, NULL, ?3, ?4)
             ON CONFLICT(item_type) DO UPDATE SET
                 last_attempt = excluded.last_attempt,
                 last_success = excluded.last_success,
                 last_error = NULL,
                 item_count = excluded.item_count,
                 generation = excluded.generation",
            params![kind.as_str(), now, entities.len() as i64, generation],
        )?;
        tx.commit()?;

        debug!(kind = %kind, written = entities.len(), removed, "Replaced catalog snapshot");
        Ok(entities.len())
    }

    /// Note a failed sync attempt without touching the kind's rows.
    pub fn record_sync_failure(&self, kind: EntityKind, message: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_state (item_type, last_attempt, last_error) VALUES (?1, ?2, ?3)
             ON CONFLICT(item_type) DO UPDATE SET
                 last_attempt = excluded.last_attempt,
                 last_error = excluded.last_error",
            params![kind.as_str(), db_timestamp(at), message],
        )?;
        Ok(())
    }

    pub fn sync_states(&self) -> Result<Vec<SyncState>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT item_type, last_attempt, last_success, last_error, item_count, generation
             FROM sync_state ORDER BY item_type",
        )?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(0)?;
            let last_attempt: Option<String> = row.get(1)?;
            let last_success: Option<String> = row.get(2)?;
            Ok(SyncState {
                item_type: kind
                    .parse()
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
                last_attempt: last_attempt.map(|s| parse_timestamp(1, &s)).transpose()?,
                last_success: last_success.map(|s| parse_timestamp(2, &s)).transpose()?,
                last_error: row.get(3)?,
                item_count: row.get::<_, i64>(4)? as u64,
                generation: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// When `kind` last synced successfully.
    pub fn last_success(&self, kind: EntityKind) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .sync_states()?
            .into_iter()
            .find(|s| s.item_type == kind)
            .and_then(|s| s.last_success))
    }

    pub fn get(&self, kind: EntityKind, uuid: &str) -> Result<Option<CatalogEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {} FROM catalog_entries e WHERE e.item_type = ?1 AND e.uuid = ?2",
                    ENTRY_COLUMNS
                ),
                [kind.as_str(), uuid],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Number of rows, optionally of one kind.
    pub fn count(&self, kind: Option<EntityKind>) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = match kind {
            Some(kind) => conn.query_row(
                "SELECT COUNT(*) FROM catalog_entries WHERE item_type = ?1",
                [kind.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM catalog_entries", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    /// Run a search. Results are paged and deterministically ordered.
    pub fn search(&self, query: &CatalogQuery) -> Result<SearchPage> {
        let start = Instant::now();
        let conn = self.conn()?;

        let mut from = String::from("catalog_entries e");
        let mut where_parts: Vec<String> = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(fts_query) = query.fts_query() {
            from.push_str(&format!(" JOIN {t} ON {t}.rowid = e.id", t = fts::FTS_TABLE));
            where_parts.push(format!("{} MATCH ?", fts::FTS_TABLE));
            params_vec.push(Box::new(fts_query));
        }

        if let Some(kind) = query.item_type {
            where_parts.push("e.item_type = ?".to_string());
            params_vec.push(Box::new(kind.as_str()));
        }
        let uuid_filters = [
            ("e.share_uuid", &query.share_uuid),
            ("e.volume_uuid", &query.volume_uuid),
            ("e.node_uuid", &query.node_uuid),
        ];
        for (column, value) in uuid_filters {
            if let Some(value) = value {
                where_parts.push(format!("{} = ?", column));
                params_vec.push(Box::new(value.clone()));
            }
        }
        if let Some(prefix) = &query.path_prefix {
            where_parts.push("e.path LIKE ? ESCAPE '\\'".to_string());
            params_vec.push(Box::new(like_prefix(prefix)));
        }
        for (key, value) in &query.tags {
            where_parts.push(
                "EXISTS (SELECT 1 FROM entry_tags t WHERE t.entry_id = e.id AND t.tag_key = ? AND t.tag_value = ?)"
                    .to_string(),
            );
            params_vec.push(Box::new(key.clone()));
            params_vec.push(Box::new(value.clone()));
        }

        let where_clause = if where_parts.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_parts.join(" AND "))
        };

        let total_count: i64 = {
            let sql = format!("SELECT COUNT(*) FROM {} {}", from, where_clause);
            let mut stmt = conn.prepare(&sql)?;
            let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
            stmt.query_row(params_refs.as_slice(), |row| row.get(0))?
        };

        let limit = query.effective_limit();
        let sql = format!(
            "SELECT {} FROM {} {} ORDER BY {} LIMIT {} OFFSET {}",
            ENTRY_COLUMNS,
            from,
            where_clause,
            query.order_clause(),
            limit,
            query.offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            match row {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Error reading catalog row: {}", e),
            }
        }

        Ok(SearchPage {
            entries,
            total_count: total_count as usize,
            limit,
            offset: query.offset,
            query_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Row counts, staleness, and structural integrity of the store.
    pub fn health(&self) -> Result<HealthReport> {
        let conn = self.conn()?;
        let cutoff = chrono::Duration::from_std(self.staleness_threshold)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let cutoff = db_timestamp(cutoff);

        let mut items_by_kind = BTreeMap::new();
        let mut stale_by_kind = BTreeMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT item_type, COUNT(*), SUM(CASE WHEN last_synced < ?1 THEN 1 ELSE 0 END)
                 FROM catalog_entries GROUP BY item_type ORDER BY item_type",
            )?;
            let rows = stmt.query_map([&cutoff], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })?;
            for row in rows {
                let (kind, count, stale) = row?;
                items_by_kind.insert(kind.clone(), count as u64);
                if stale > 0 {
                    stale_by_kind.insert(kind, stale as u64);
                }
            }
        }
        let total_items = items_by_kind.values().sum();
        let stale_items: u64 = stale_by_kind.values().sum();

        let integrity = match integrity_check(&conn) {
            Ok(lines) => lines,
            Err(e) => vec![format!("integrity check failed: {}", e)],
        };
        let integrity_ok = integrity.len() == 1 && integrity[0] == "ok";

        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        let oldest: Option<String> =
            conn.query_row("SELECT MIN(last_synced) FROM catalog_entries", [], |row| row.get(0))?;
        let oldest_sync = oldest.map(|s| parse_timestamp(0, &s)).transpose()?;
        drop(conn);

        let size_bytes = ["", "-wal"]
            .iter()
            .filter_map(|suffix| std::fs::metadata(sidecar(&self.db_path, suffix)).ok())
            .map(|m| m.len())
            .sum();

        let mut issues = Vec::new();
        if !integrity_ok {
            issues.push(format!("integrity check reported: {}", integrity.join("; ")));
        }
        if stale_items > self.max_stale_entries {
            issues.push(format!(
                "{} entries not synced within {}s (allowed: {})",
                stale_items,
                self.staleness_threshold.as_secs(),
                self.max_stale_entries
            ));
        }
        for state in self.sync_states()? {
            if let Some(error) = state.last_error {
                issues.push(format!("last {} sync failed: {}", state.item_type, error));
            }
        }

        Ok(HealthReport {
            healthy: integrity_ok && stale_items <= self.max_stale_entries,
            total_items,
            items_by_kind,
            stale_items,
            stale_by_kind,
            staleness_threshold_secs: self.staleness_threshold.as_secs(),
            max_stale_entries: self.max_stale_entries,
            integrity_ok,
            integrity,
            page_count: page_count as u64,
            page_size: page_size as u64,
            size_bytes,
            oldest_sync,
            issues,
        })
    }

    /// Per-kind counts and sync recency.
    pub fn overview(&self) -> Result<CatalogOverview> {
        let states = self.sync_states()?;
        let conn = self.conn()?;
        let day_ago = db_timestamp(Utc::now() - chrono::Duration::hours(24));

        let mut kinds = Vec::new();
        for kind in EntityKind::SYNC_ORDER {
            let (count, recent): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN last_synced >= ?2 THEN 1 ELSE 0 END), 0)
                 FROM catalog_entries WHERE item_type = ?1",
                params![kind.as_str(), day_ago],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let state = states.iter().find(|s| s.item_type == kind);
            kinds.push(KindOverview {
                kind,
                count: count as u64,
                synced_last_24h: recent as u64,
                last_success: state.and_then(|s| s.last_success),
                last_error: state.and_then(|s| s.last_error.clone()),
            });
        }

        Ok(CatalogOverview {
            db_path: self.db_path.display().to_string(),
            total_items: kinds.iter().map(|k| k.count).sum(),
            kinds,
        })
    }

    /// Write a consistent snapshot of the store to `path`.
    ///
    /// Refuses to overwrite an existing file.
    pub fn backup(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if path.exists() {
            return Err(TierflowError::invalid_params(format!(
                "backup target {} already exists",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| TierflowError::io_with_path(e, parent))?;
            }
        }

        let target = path.to_string_lossy().into_owned();
        let conn = self.conn()?;
        conn.execute("VACUUM INTO ?1", [&target])?;
        info!(path = %path.display(), "Catalog backed up");
        Ok(path.to_path_buf())
    }

    /// Replace the store's contents with a backup made by [`backup`](Self::backup).
    ///
    /// The backup is validated before the live store is touched. Returns the
    /// number of entries restored.
    pub fn restore(&self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        check_restore_source(path, &self.db_path)?;

        let mut conn = self.conn()?;
        let live = std::mem::replace(&mut *conn, Connection::open_in_memory()?);
        if let Err((_, e)) = live.close() {
            warn!(error = %e, "Closing the live catalog connection reported an error");
        }

        let swapped = swap_in(path, &self.db_path).and_then(|_| Self::open_connection(&self.db_path));
        match swapped {
            Ok(restored) => {
                *conn = restored;
                let count = count_entries(&conn)?;
                info!(from = %path.display(), entries = count, "Catalog restored");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "Catalog restore failed; reopening the store");
                if let Ok(reopened) = Self::open_connection(&self.db_path) {
                    *conn = reopened;
                }
                Err(e)
            }
        }
    }

    /// Restore the catalog file at `db_path` from `backup` without opening
    /// the current file.
    ///
    /// Works when the file at `db_path` is missing or not a database at all,
    /// which [`restore`](Self::restore) cannot reach because the store fails
    /// to open. No store may have `db_path` open.
    pub fn restore_file(db_path: impl AsRef<Path>, backup: impl AsRef<Path>) -> Result<u64> {
        let (db_path, backup) = (db_path.as_ref(), backup.as_ref());
        check_restore_source(backup, db_path)?;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TierflowError::io_with_path(e, parent))?;
        }

        swap_in(backup, db_path)?;
        let conn = Self::open_connection(db_path)?;
        let count = count_entries(&conn)?;
        info!(from = %backup.display(), to = %db_path.display(), entries = count, "Catalog file restored");
        Ok(count)
    }
}

/// Reject restore sources that are missing, invalid, or the target itself.
fn check_restore_source(backup: &Path, db_path: &Path) -> Result<()> {
    if !backup.is_file() {
        return Err(TierflowError::not_found(format!("backup {}", backup.display())));
    }
    if same_file(backup, db_path) {
        return Err(TierflowError::invalid_params("cannot restore the store onto itself"));
    }
    validate_backup(backup)
}

/// Copy `backup` over `db_path` and drop the old file's WAL sidecars.
fn swap_in(backup: &Path, db_path: &Path) -> Result<()> {
    std::fs::copy(backup, db_path).map_err(|e| TierflowError::io_with_path(e, db_path))?;
    for suffix in ["-wal", "-shm"] {
        let sidecar = sidecar(db_path, suffix);
        if sidecar.exists() {
            std::fs::remove_file(&sidecar).map_err(|e| TierflowError::io_with_path(e, &sidecar))?;
        }
    }
    Ok(())
}

fn count_entries(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM catalog_entries", [], |row| row.get(0))?;
    Ok(count as u64)
}

fn row_to_entry(row: &Row) -> rusqlite::Result<CatalogEntry> {
    let item_type: String = row.get(1)?;
    let tags_json: String = row.get(11)?;
    let extended_json: String = row.get(12)?;
    let last_synced: String = row.get(15)?;

    let tags: TagMap = serde_json::from_str(&tags_json).unwrap_or_default();
    let extended_info = serde_json::from_str(&extended_json).unwrap_or(serde_json::Value::Null);

    Ok(CatalogEntry {
        id: row.get(0)?,
        item_type: item_type
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
        uuid: row.get(2)?,
        name: row.get(3)?,
        path: row.get(4)?,
        share_uuid: row.get(5)?,
        volume_uuid: row.get(6)?,
        node_uuid: row.get(7)?,
        size_bytes: row.get::<_, Option<i64>>(8)?.map(|s| s as u64),
        is_directory: row.get(9)?,
        replication_status: row.get(10)?,
        tags,
        extended_info,
        created: row.get(13)?,
        modified: row.get(14)?,
        last_synced: parse_timestamp(15, &last_synced)?,
    })
}

fn integrity_check(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

/// Open a candidate backup read-only and check it is an intact catalog.
fn validate_backup(path: &Path) -> Result<()> {
    let invalid = |reason: String| TierflowError::database(format!("{} is not a valid catalog backup: {}", path.display(), reason));

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| invalid(e.to_string()))?;
    let integrity = integrity_check(&conn).map_err(|e| invalid(e.to_string()))?;
    if integrity.len() != 1 || integrity[0] != "ok" {
        return Err(invalid(integrity.join("; ")));
    }
    let has_entries: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'catalog_entries'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| invalid(e.to_string()))?;
    if has_entries == 0 {
        return Err(invalid("missing catalog_entries table".to_string()));
    }
    Ok(())
}

fn sidecar(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
