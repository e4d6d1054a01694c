//! Connection setup for the SQLite lead store.
//!
//! File-backed stores run in WAL mode with a 5 second busy timeout, so a
//! `leadsync list` issued during a long `leadsync sync` reads the last
//! committed state instead of failing on the lock. In-memory stores skip
//! both and go straight to the migrations.

pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

/// How long a connection waits on a locked store before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open `.leadsync/leadsync.db` (or any path), creating missing parent
/// directories, and bring its schema up to date.
///
/// # Errors
///
/// Fails when the directory cannot be created or SQLite cannot open,
/// configure or migrate the file.
pub fn open_store_db(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create store directory {}", dir.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("open store database {}", path.display()))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
        .context("set store busy timeout")?;
    let mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .context("switch store to WAL")?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "store opened");

    prepare(conn)
}

/// Migrated scratch store that disappears with the connection.
///
/// # Errors
///
/// Fails when SQLite cannot open or migrate the database.
pub fn open_in_memory() -> Result<Connection> {
    prepare(Connection::open_in_memory().context("open in-memory store")?)
}

fn prepare(mut conn: Connection) -> Result<Connection> {
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("enable foreign keys")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("set synchronous mode")?;
    let version = migrations::migrate(&mut conn).context("apply store migrations")?;
    tracing::debug!(schema_version = version, "store schema ready");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pragma_i64(conn: &Connection, name: &str) -> i64 {
        conn.pragma_query_value(None, name, |row| row.get(0)).unwrap()
    }

    #[test]
    fn file_store_uses_wal_and_waits_on_locks() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_store_db(&dir.path().join("leadsync.db")).unwrap();

        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert!(mode.eq_ignore_ascii_case("wal"));
        assert_eq!(
            u128::try_from(pragma_i64(&conn, "busy_timeout")).unwrap(),
            DEFAULT_BUSY_TIMEOUT.as_millis()
        );
        assert_eq!(pragma_i64(&conn, "foreign_keys"), 1);
    }

    #[test]
    fn missing_project_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".leadsync").join("leadsync.db");
        open_store_db(&path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn reopening_keeps_rows_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leadsync.db");
        {
            let conn = open_store_db(&path).unwrap();
            conn.execute(
                "INSERT INTO appointments (appointment_id, kind, client_name, client_phone) \
                 VALUES ('a1', 'consult', 'Ana', '11999998888')",
                [],
            )
            .unwrap();
        }

        let conn = open_store_db(&path).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM appointments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(
            migrations::current_schema_version(&conn).unwrap(),
            migrations::LATEST_SCHEMA_VERSION
        );
    }

    #[test]
    fn in_memory_store_has_every_table() {
        let conn = open_in_memory().unwrap();
        for table in ["appointments", "leads", "store_meta"] {
            let found: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(found, 1, "{table} missing");
        }
    }
}
