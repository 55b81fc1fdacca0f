//! FTS5 index over catalog names and paths.
//!
//! The virtual table shares rowids with `catalog_entries` and is kept in
//! sync by triggers, so writers never touch it directly.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

pub(crate) const FTS_TABLE: &str = "catalog_fts";
const TOKENIZER: &str = "unicode61 remove_diacritics 1";

fn exists(conn: &Connection, kind: &str, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type=?1 AND name=?2",
        [kind, name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Create the FTS table and triggers if missing, repopulating when needed.
pub(crate) fn ensure_setup(conn: &Connection) -> Result<()> {
    let table_exists = exists(conn, "table", FTS_TABLE)?;
    let triggers_exist = exists(conn, "trigger", &format!("{}_ai", FTS_TABLE))?;

    if !table_exists {
        conn.execute(
            &format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(name, path, tokenize='{}')",
                FTS_TABLE, TOKENIZER
            ),
            [],
        )?;
        info!("Created FTS5 table: {}", FTS_TABLE);
    }

    if !table_exists || !triggers_exist {
        rebuild(conn)?;
    }

    create_triggers(conn)
}

fn create_triggers(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TRIGGER IF NOT EXISTS {t}_ai AFTER INSERT ON catalog_entries BEGIN
             INSERT INTO {t} (rowid, name, path) VALUES (NEW.id, NEW.name, COALESCE(NEW.path, ''));
         END;
         CREATE TRIGGER IF NOT EXISTS {t}_au AFTER UPDATE OF name, path ON catalog_entries BEGIN
             DELETE FROM {t} WHERE rowid = OLD.id;
             INSERT INTO {t} (rowid, name, path) VALUES (NEW.id, NEW.name, COALESCE(NEW.path, ''));
         END;
         CREATE TRIGGER IF NOT EXISTS {t}_ad AFTER DELETE ON catalog_entries BEGIN
             DELETE FROM {t} WHERE rowid = OLD.id;
         END;",
        t = FTS_TABLE
    ))?;
    Ok(())
}

/// Repopulate the FTS table from `catalog_entries`.
pub(crate) fn rebuild(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "DELETE FROM {t};
         INSERT INTO {t} (rowid, name, path)
             SELECT id, name, COALESCE(path, '') FROM catalog_entries;",
        t = FTS_TABLE
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_entries() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE catalog_entries (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, path TEXT);
             INSERT INTO catalog_entries (name, path) VALUES ('quarterly report', '/hub/q.pdf');",
        )
        .unwrap();
        conn
    }

    fn matches(conn: &Connection, query: &str) -> i64 {
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {} MATCH ?1", FTS_TABLE, FTS_TABLE),
            [query],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_setup_populates_existing_rows() {
        let conn = conn_with_entries();
        ensure_setup(&conn).unwrap();
        assert_eq!(matches(&conn, "quarter*"), 1);
        ensure_setup(&conn).unwrap();
        assert_eq!(matches(&conn, "quarter*"), 1);
    }

    #[test]
    fn test_triggers_follow_writes() {
        let conn = conn_with_entries();
        ensure_setup(&conn).unwrap();

        conn.execute("UPDATE catalog_entries SET name = 'annual summary'", [])
            .unwrap();
        assert_eq!(matches(&conn, "quarter*"), 0);
        assert_eq!(matches(&conn, "annual*"), 1);

        conn.execute("DELETE FROM catalog_entries", []).unwrap();
        assert_eq!(matches(&conn, "annual*"), 0);
    }
}
