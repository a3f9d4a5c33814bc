//! Monotonic, integer-indexed schema migrations (spec §4.7).
//!
//! Each migration runs inside its own transaction and, on success, records
//! the resulting version in `schema_version`. If a migration fails the
//! caller backs up the file with a `.pre-migration.<timestamp>` suffix and
//! continues on the prior schema (see `Store::open`).

use rusqlite::{Connection, Transaction};

type Migration = fn(&Transaction) -> rusqlite::Result<()>;

const MIGRATIONS: &[Migration] = &[migration_1_initial_schema];

/// Read the current schema version, 0 if the table does not exist yet.
pub fn current_version(conn: &Connection) -> rusqlite::Result<i64> {
    let exists: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |_| Ok(true),
        )
        .unwrap_or(false);
    if !exists {
        return Ok(0);
    }
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .map(|v| v.unwrap_or(0))
}

/// Apply every migration newer than the current version, each in its own
/// transaction, recording the new version as it goes.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<()> {
    let mut version = current_version(conn)?;
    while (version as usize) < MIGRATIONS.len() {
        let next = MIGRATIONS[version as usize];
        let tx = conn.transaction()?;
        next(&tx)?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version + 1],
        )?;
        tx.commit()?;
        version += 1;
        tracing::info!(version, "applied durable-store migration");
    }
    Ok(())
}

fn migration_1_initial_schema(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            channel        TEXT PRIMARY KEY,
            project        TEXT NOT NULL,
            workspace_path TEXT NOT NULL,
            base_branch    TEXT NOT NULL,
            agent_branch   TEXT NOT NULL,
            status         TEXT NOT NULL,
            paused         INTEGER NOT NULL,
            model          TEXT NOT NULL,
            last_activity  TEXT NOT NULL,
            created_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS grants (
            channel    TEXT NOT NULL,
            path       TEXT NOT NULL,
            mode       TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            PRIMARY KEY (channel, path)
        );

        CREATE TABLE IF NOT EXISTS task_history (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            channel      TEXT NOT NULL,
            prompt       TEXT NOT NULL,
            status       TEXT NOT NULL,
            started_at   TEXT NOT NULL,
            completed_at TEXT,
            timeout_ms   INTEGER,
            submitter    TEXT,
            FOREIGN KEY (channel) REFERENCES sessions(channel) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_task_history_channel ON task_history(channel);
        CREATE INDEX IF NOT EXISTS idx_task_history_started_at ON task_history(started_at);

        CREATE TABLE IF NOT EXISTS responders (
            channel TEXT NOT NULL,
            user    TEXT NOT NULL,
            PRIMARY KEY (channel, user)
        );

        CREATE TABLE IF NOT EXISTS repo_overrides (
            channel    TEXT PRIMARY KEY,
            remote_url TEXT NOT NULL,
            local_path TEXT NOT NULL,
            project    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS branch_overrides (
            channel     TEXT PRIMARY KEY,
            base_branch TEXT NOT NULL
        );
        ",
    )
}
