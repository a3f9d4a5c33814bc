//! Durable Store (spec §4.7): a schema-versioned relational store backing
//! session records, grants, task history, responders, and per-channel repo
//! and branch overrides.
//!
//! Corruption is handled by moving the offending file aside and reopening a
//! fresh database. A failed migration is handled differently: the file is
//! copied aside with a `.pre-migration` suffix for forensics, but the live
//! file is left in place and reopened without re-running the migration, so
//! the store keeps serving the prior schema's data instead of losing it.

mod migrations;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use sg_domain::error::{Error, Result};
use sg_domain::model::{
    BranchOverride, GrantMode, GrantRecord, RepoOverride, Responder, SessionRecord,
    SessionStatus, TaskHistoryRow, TaskStatus,
};

fn sqlite_err(context: &str, e: rusqlite::Error) -> Error {
    Error::InternalInvariantBroken(format!("{context}: {e}"))
}

/// Distinguishes a connection/open-time failure (the file itself is
/// unreadable) from a migration failure (the connection opened fine, the
/// schema upgrade did not) — `Store::open` recovers from each differently.
enum OpenFailure {
    Corrupt(rusqlite::Error),
    Migration(rusqlite::Error),
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the durable store at `path`. On corruption
    /// the file is backed up and a fresh store is opened in its place; on
    /// migration failure the file is backed up and the connection proceeds
    /// against the database left at its prior schema version.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = match Self::open_and_migrate(path) {
            Ok(conn) => conn,
            Err(OpenFailure::Corrupt(e)) => {
                tracing::warn!(error = %e, path = %path.display(), "durable store unusable, recovering");
                Self::quarantine(path, "corrupt")?;
                Self::open_and_migrate(path).map_err(|e| match e {
                    OpenFailure::Corrupt(e) | OpenFailure::Migration(e) => {
                        sqlite_err("durable store unrecoverable after quarantine", e)
                    }
                })?
            }
            Err(OpenFailure::Migration(e)) => {
                tracing::error!(error = %e, path = %path.display(), "migration failed, backing up and continuing on prior schema");
                Self::quarantine(path, "pre-migration")?;
                Self::open_plain(path).map_err(|e| sqlite_err("durable store unreachable at prior schema", e))?
            }
        };
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().map_err(|e| sqlite_err("open", e))?;
        migrations::migrate(&mut conn).map_err(|e| sqlite_err("migrate", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_and_migrate(path: &Path) -> std::result::Result<Connection, OpenFailure> {
        let mut conn = Self::open_plain(path).map_err(OpenFailure::Corrupt)?;
        migrations::migrate(&mut conn).map_err(OpenFailure::Migration)?;
        Ok(conn)
    }

    fn open_plain(path: &Path) -> rusqlite::Result<Connection> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }

    /// Copy (not move) the store aside as `<path>.<reason>.<timestamp>` for
    /// forensics, leaving the live file at `path` untouched — a failed
    /// migration runs in a transaction and rolls back cleanly, so the live
    /// file still holds the prior schema's data and can keep serving it.
    /// Corruption quarantine additionally removes the live file (and its
    /// WAL/SHM siblings) so the next open starts a fresh database.
    fn quarantine(path: &Path, reason: &str) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let quarantined = path.with_extension(format!("{reason}.{stamp}"));
        if reason == "pre-migration" {
            std::fs::copy(path, &quarantined).map_err(Error::Io)?;
        } else {
            std::fs::rename(path, &quarantined).map_err(Error::Io)?;
            for ext in ["-wal", "-shm"] {
                let sibling = PathBuf::from(format!("{}{ext}", path.display()));
                let _ = std::fs::remove_file(sibling);
            }
        }
        tracing::warn!(from = %path.display(), to = %quarantined.display(), "quarantined durable store");
        Ok(())
    }

    // ──────────────────────────────────────────────────────────────
    // Sessions
    // ──────────────────────────────────────────────────────────────

    pub fn upsert_session(&self, s: &SessionRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO sessions (channel, project, workspace_path, base_branch, agent_branch,
                status, paused, model, last_activity, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(channel) DO UPDATE SET
                project = excluded.project,
                workspace_path = excluded.workspace_path,
                base_branch = excluded.base_branch,
                agent_branch = excluded.agent_branch,
                status = excluded.status,
                paused = excluded.paused,
                model = excluded.model,
                last_activity = excluded.last_activity",
        )
        .and_then(|mut stmt| {
            stmt.execute(params![
                s.channel,
                s.project,
                s.workspace_path.to_string_lossy(),
                s.base_branch,
                s.agent_branch,
                status_str(s.status),
                s.paused,
                s.model,
                s.last_activity.to_rfc3339(),
                s.created_at.to_rfc3339(),
            ])
        })
        .map_err(|e| sqlite_err("upsert_session", e))?;
        Ok(())
    }

    pub fn get_session(&self, channel: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT channel, project, workspace_path, base_branch, agent_branch, status, paused,
                    model, last_activity, created_at
             FROM sessions WHERE channel = ?1",
            [channel],
            row_to_session,
        )
        .optional()
        .map_err(|e| sqlite_err("get_session", e))
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT channel, project, workspace_path, base_branch, agent_branch, status,
                        paused, model, last_activity, created_at FROM sessions",
            )
            .map_err(|e| sqlite_err("list_sessions", e))?;
        let rows = stmt
            .query_map([], row_to_session)
            .map_err(|e| sqlite_err("list_sessions", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| sqlite_err("list_sessions", e))
    }

    pub fn delete_session(&self, channel: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE channel = ?1", [channel])
            .map_err(|e| sqlite_err("delete_session", e))?;
        Ok(())
    }

    // ──────────────────────────────────────────────────────────────
    // Grants
    // ──────────────────────────────────────────────────────────────

    pub fn upsert_grant(&self, g: &GrantRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO grants (channel, path, mode, expires_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(channel, path) DO UPDATE SET mode = excluded.mode, expires_at = excluded.expires_at",
            params![
                g.channel,
                g.path.to_string_lossy(),
                grant_mode_str(g.mode),
                g.expires_at.to_rfc3339(),
            ],
        )
        .map_err(|e| sqlite_err("upsert_grant", e))?;
        Ok(())
    }

    pub fn list_grants(&self, channel: &str) -> Result<Vec<GrantRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT channel, path, mode, expires_at FROM grants WHERE channel = ?1")
            .map_err(|e| sqlite_err("list_grants", e))?;
        let rows = stmt
            .query_map([channel], row_to_grant)
            .map_err(|e| sqlite_err("list_grants", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| sqlite_err("list_grants", e))
    }

    pub fn delete_expired_grants(&self, now: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "DELETE FROM grants WHERE expires_at <= ?1",
                [now.to_rfc3339()],
            )
            .map_err(|e| sqlite_err("delete_expired_grants", e))?;
        Ok(n as u64)
    }

    pub fn revoke_grant(&self, channel: &str, path: &Path) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM grants WHERE channel = ?1 AND path = ?2",
            params![channel, path.to_string_lossy()],
        )
        .map_err(|e| sqlite_err("revoke_grant", e))?;
        Ok(())
    }

    // ──────────────────────────────────────────────────────────────
    // Task history
    // ──────────────────────────────────────────────────────────────

    pub fn insert_task(&self, row: &TaskHistoryRow) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO task_history (channel, prompt, status, started_at, completed_at,
                timeout_ms, submitter) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.channel,
                row.prompt,
                task_status_str(row.status),
                row.started_at.to_rfc3339(),
                row.completed_at.map(|t| t.to_rfc3339()),
                row.timeout_ms.map(|v| v as i64),
                row.submitter,
            ],
        )
        .map_err(|e| sqlite_err("insert_task", e))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn complete_task(&self, id: i64, status: TaskStatus, completed_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE task_history SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![task_status_str(status), completed_at.to_rfc3339(), id],
        )
        .map_err(|e| sqlite_err("complete_task", e))?;
        Ok(())
    }

    /// Task-history rows still `running` (used at boot for crash recovery).
    pub fn running_tasks(&self) -> Result<Vec<TaskHistoryRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, channel, prompt, status, started_at, completed_at, timeout_ms, submitter
                 FROM task_history WHERE status = 'running'",
            )
            .map_err(|e| sqlite_err("running_tasks", e))?;
        let rows = stmt
            .query_map([], row_to_task)
            .map_err(|e| sqlite_err("running_tasks", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| sqlite_err("running_tasks", e))
    }

    pub fn recent_tasks(&self, channel: &str, limit: u32) -> Result<Vec<TaskHistoryRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, channel, prompt, status, started_at, completed_at, timeout_ms, submitter
                 FROM task_history WHERE channel = ?1 ORDER BY started_at DESC LIMIT ?2",
            )
            .map_err(|e| sqlite_err("recent_tasks", e))?;
        let rows = stmt
            .query_map(params![channel, limit], row_to_task)
            .map_err(|e| sqlite_err("recent_tasks", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| sqlite_err("recent_tasks", e))
    }

    /// Delete completed task-history rows older than `max_age_days`.
    pub fn prune_task_history(&self, now: DateTime<Utc>, max_age_days: i64) -> Result<u64> {
        let cutoff = now - chrono::Duration::days(max_age_days);
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "DELETE FROM task_history WHERE status != 'running' AND started_at <= ?1",
                [cutoff.to_rfc3339()],
            )
            .map_err(|e| sqlite_err("prune_task_history", e))?;
        Ok(n as u64)
    }

    // ──────────────────────────────────────────────────────────────
    // Responders
    // ──────────────────────────────────────────────────────────────

    pub fn add_responder(&self, r: &Responder) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO responders (channel, user) VALUES (?1, ?2)",
            params![r.channel, r.user],
        )
        .map_err(|e| sqlite_err("add_responder", e))?;
        Ok(())
    }

    pub fn list_responders(&self, channel: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT user FROM responders WHERE channel = ?1")
            .map_err(|e| sqlite_err("list_responders", e))?;
        let rows = stmt
            .query_map([channel], |row| row.get::<_, String>(0))
            .map_err(|e| sqlite_err("list_responders", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| sqlite_err("list_responders", e))
    }

    // ──────────────────────────────────────────────────────────────
    // Overrides
    // ──────────────────────────────────────────────────────────────

    pub fn set_repo_override(&self, o: &RepoOverride) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO repo_overrides (channel, remote_url, local_path, project)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(channel) DO UPDATE SET remote_url = excluded.remote_url,
                local_path = excluded.local_path, project = excluded.project",
            params![o.channel, o.remote_url, o.local_path.to_string_lossy(), o.project],
        )
        .map_err(|e| sqlite_err("set_repo_override", e))?;
        Ok(())
    }

    pub fn get_repo_override(&self, channel: &str) -> Result<Option<RepoOverride>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT channel, remote_url, local_path, project FROM repo_overrides WHERE channel = ?1",
            [channel],
            |row| {
                Ok(RepoOverride {
                    channel: row.get(0)?,
                    remote_url: row.get(1)?,
                    local_path: PathBuf::from(row.get::<_, String>(2)?),
                    project: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| sqlite_err("get_repo_override", e))
    }

    pub fn set_branch_override(&self, o: &BranchOverride) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO branch_overrides (channel, base_branch) VALUES (?1, ?2)
             ON CONFLICT(channel) DO UPDATE SET base_branch = excluded.base_branch",
            params![o.channel, o.base_branch],
        )
        .map_err(|e| sqlite_err("set_branch_override", e))?;
        Ok(())
    }

    pub fn get_branch_override(&self, channel: &str) -> Result<Option<BranchOverride>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT channel, base_branch FROM branch_overrides WHERE channel = ?1",
            [channel],
            |row| {
                Ok(BranchOverride {
                    channel: row.get(0)?,
                    base_branch: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| sqlite_err("get_branch_override", e))
    }

    /// A branch override is invalidated whenever its channel's repo
    /// override changes (spec §3 `BranchOverride`).
    pub fn delete_branch_override(&self, channel: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM branch_overrides WHERE channel = ?1", [channel])
            .map_err(|e| sqlite_err("delete_branch_override", e))?;
        Ok(())
    }
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        channel: row.get(0)?,
        project: row.get(1)?,
        workspace_path: PathBuf::from(row.get::<_, String>(2)?),
        base_branch: row.get(3)?,
        agent_branch: row.get(4)?,
        status: parse_status(&row.get::<_, String>(5)?),
        paused: row.get(6)?,
        model: row.get(7)?,
        last_activity: parse_dt(&row.get::<_, String>(8)?),
        created_at: parse_dt(&row.get::<_, String>(9)?),
    })
}

fn row_to_grant(row: &rusqlite::Row) -> rusqlite::Result<GrantRecord> {
    Ok(GrantRecord {
        channel: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        mode: parse_grant_mode(&row.get::<_, String>(2)?),
        expires_at: parse_dt(&row.get::<_, String>(3)?),
    })
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<TaskHistoryRow> {
    Ok(TaskHistoryRow {
        id: row.get(0)?,
        channel: row.get(1)?,
        prompt: row.get(2)?,
        status: parse_task_status(&row.get::<_, String>(3)?),
        started_at: parse_dt(&row.get::<_, String>(4)?),
        completed_at: row.get::<_, Option<String>>(5)?.map(|s| parse_dt(&s)),
        timeout_ms: row.get::<_, Option<i64>>(6)?.map(|v| v as u64),
        submitter: row.get(7)?,
    })
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn status_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Idle => "idle",
        SessionStatus::Working => "working",
    }
}

fn parse_status(s: &str) -> SessionStatus {
    match s {
        "working" => SessionStatus::Working,
        _ => SessionStatus::Idle,
    }
}

fn grant_mode_str(m: GrantMode) -> &'static str {
    match m {
        GrantMode::Ro => "ro",
        GrantMode::Rw => "rw",
    }
}

fn parse_grant_mode(s: &str) -> GrantMode {
    match s {
        "rw" => GrantMode::Rw,
        _ => GrantMode::Ro,
    }
}

fn task_status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Aborted => "aborted",
    }
}

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "aborted" => TaskStatus::Aborted,
        _ => TaskStatus::Running,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_session(channel: &str) -> SessionRecord {
        SessionRecord {
            channel: channel.into(),
            project: "widgets".into(),
            workspace_path: PathBuf::from("/tmp/widgets"),
            base_branch: "main".into(),
            agent_branch: "agent/widgets".into(),
            status: SessionStatus::Idle,
            paused: false,
            model: "default".into(),
            last_activity: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn roundtrips_a_session() {
        let store = Store::open_in_memory().unwrap();
        let s = sample_session("chan-1");
        store.upsert_session(&s).unwrap();
        let loaded = store.get_session("chan-1").unwrap().unwrap();
        assert_eq!(loaded.project, "widgets");
        assert_eq!(loaded.status, SessionStatus::Idle);
    }

    #[test]
    fn upsert_overwrites_existing_session() {
        let store = Store::open_in_memory().unwrap();
        let mut s = sample_session("chan-1");
        store.upsert_session(&s).unwrap();
        s.status = SessionStatus::Working;
        s.paused = true;
        store.upsert_session(&s).unwrap();
        let loaded = store.get_session("chan-1").unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Working);
        assert!(loaded.paused);
        assert_eq!(store.list_sessions().unwrap().len(), 1);
    }

    #[test]
    fn expired_grants_are_swept() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .upsert_grant(&GrantRecord {
                channel: "chan-1".into(),
                path: PathBuf::from("/tmp/widgets/src"),
                mode: GrantMode::Rw,
                expires_at: now - Duration::minutes(1),
            })
            .unwrap();
        store
            .upsert_grant(&GrantRecord {
                channel: "chan-1".into(),
                path: PathBuf::from("/tmp/widgets/docs"),
                mode: GrantMode::Ro,
                expires_at: now + Duration::minutes(30),
            })
            .unwrap();
        let removed = store.delete_expired_grants(now).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.list_grants("chan-1").unwrap().len(), 1);
    }

    #[test]
    fn task_history_tracks_completion() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_session(&sample_session("chan-1")).unwrap();
        let id = store
            .insert_task(&TaskHistoryRow {
                id: 0,
                channel: "chan-1".into(),
                prompt: "add a test".into(),
                status: TaskStatus::Running,
                started_at: Utc::now(),
                completed_at: None,
                timeout_ms: Some(600_000),
                submitter: Some("user-1".into()),
            })
            .unwrap();
        store.complete_task(id, TaskStatus::Completed, Utc::now()).unwrap();
        let rows = store.recent_tasks("chan-1", 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TaskStatus::Completed);
    }

    #[test]
    fn repo_and_branch_overrides_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        store
            .set_repo_override(&RepoOverride {
                channel: "chan-1".into(),
                remote_url: "git@example.com:org/widgets.git".into(),
                local_path: PathBuf::from("/tmp/widgets"),
                project: "widgets".into(),
            })
            .unwrap();
        store
            .set_branch_override(&BranchOverride {
                channel: "chan-1".into(),
                base_branch: "develop".into(),
            })
            .unwrap();
        assert_eq!(
            store.get_repo_override("chan-1").unwrap().unwrap().project,
            "widgets"
        );
        assert_eq!(
            store.get_branch_override("chan-1").unwrap().unwrap().base_branch,
            "develop"
        );
        assert!(store.get_repo_override("chan-2").unwrap().is_none());

        store.delete_branch_override("chan-1").unwrap();
        assert!(store.get_branch_override("chan-1").unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_quarantined_and_a_fresh_store_is_opened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");
        std::fs::write(&path, b"not a sqlite database").unwrap();

        let store = Store::open(&path).unwrap();
        store.upsert_session(&sample_session("chan-1")).unwrap();
        assert!(store.get_session("chan-1").unwrap().is_some());

        let quarantined: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt."))
            .collect();
        assert_eq!(quarantined.len(), 1);
        // The original bad bytes moved into the quarantine file; a brand
        // new database now lives at `path`.
        assert_eq!(std::fs::read(quarantined[0].path()).unwrap(), b"not a sqlite database");
    }

    #[test]
    fn failed_migration_backs_up_and_keeps_serving_the_live_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");

        // Pre-create a `schema_version` table with an extra NOT NULL column
        // so migration_1's `INSERT INTO schema_version (version) ...`
        // fails partway through its transaction, leaving the live file
        // untouched at schema version 0.
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE schema_version (version INTEGER NOT NULL, required_other TEXT NOT NULL);",
            )
            .unwrap();
        }

        let result = Store::open(&path);
        assert!(result.is_ok(), "store should still open after a failed migration");

        assert!(path.exists(), "the live file must not be moved away on a migration failure");
        let quarantined: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".pre-migration."))
            .collect();
        assert_eq!(quarantined.len(), 1, "expected one pre-migration backup copy");
    }

    #[test]
    fn migrations_are_idempotent_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");
        {
            let store = Store::open(&path).unwrap();
            store.upsert_session(&sample_session("chan-1")).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert!(store.get_session("chan-1").unwrap().is_some());
    }
}
