//! Pause-grace sweep and crash recovery (spec §4.5 "Pause-grace sweep" /
//! "Crash recovery", §8 scenario 6). Grounded on the teacher's
//! `sessions/src/lifecycle.rs::should_reset`/`crossed_daily_boundary`
//! shape: a pure function that decides an action from timestamps, with no
//! side effects of its own, so the decision logic is unit-testable without
//! a running session.

use chrono::{DateTime, Utc};

use sg_domain::error::Result;
use sg_domain::model::{SessionStatus, TaskStatus};
use sg_store::Store;

/// How often the pause-grace sweep runs.
pub const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(12 * 3600);
/// A session idle at least this long is eligible for the sweep's action.
pub const IDLE_THRESHOLD: chrono::Duration = chrono::Duration::hours(24);
/// Grace window between the first warning and destruction of a still-paused
/// session with pending tasks.
pub const PAUSE_GRACE: chrono::Duration = chrono::Duration::hours(24);
/// Task-history rows older than this are eligible for the idle sweep.
pub const TASK_HISTORY_MAX_AGE_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// Not idle long enough yet, or nothing to do.
    None,
    /// Idle long enough with an empty queue: destroy now.
    DestroyNow,
    /// Idle long enough, paused, with pending tasks, and not yet warned:
    /// post the one-time warning and start the grace timer.
    Warn,
    /// The warning was posted and the grace window has elapsed while still
    /// paused: destroy with a notice.
    DestroyAfterGrace,
}

/// Decide the pause-grace sweep's action for one session. Pure function —
/// the caller is responsible for actually destroying sessions or recording
/// the warning timestamp.
pub fn evaluate_pause_grace(
    last_activity: DateTime<Utc>,
    now: DateTime<Utc>,
    paused: bool,
    queue_empty: bool,
    warned_at: Option<DateTime<Utc>>,
) -> SweepAction {
    let idle_for = now.signed_duration_since(last_activity);
    if idle_for < IDLE_THRESHOLD {
        return SweepAction::None;
    }
    if queue_empty {
        return SweepAction::DestroyNow;
    }
    if !paused {
        return SweepAction::None;
    }
    match warned_at {
        None => SweepAction::Warn,
        Some(warned_at) => {
            if now.signed_duration_since(warned_at) >= PAUSE_GRACE {
                SweepAction::DestroyAfterGrace
            } else {
                SweepAction::None
            }
        }
    }
}

/// One channel whose crash-recovery state needs a user-facing follow-up.
#[derive(Debug, Clone)]
pub struct CrashRecovery {
    pub channel: String,
    pub prompt: String,
    pub submitter: Option<String>,
}

/// Boot-time crash recovery (spec §4.5 / §8 scenario 6): any task-history
/// row left `running` is terminalized to `aborted`, and any session row
/// left `working` is reset to `idle`. Returns the channels needing a retry
/// prompt (or, if auto-retry is enabled, an automatic re-enqueue) — the
/// caller must act on these within 30 seconds of boot.
pub fn recover_from_crash(store: &Store, now: DateTime<Utc>) -> Result<Vec<CrashRecovery>> {
    let mut recovered = Vec::new();
    for row in store.running_tasks()? {
        store.complete_task(row.id, TaskStatus::Aborted, now)?;
        recovered.push(CrashRecovery {
            channel: row.channel.clone(),
            prompt: row.prompt.clone(),
            submitter: row.submitter.clone(),
        });
    }

    for mut session in store.list_sessions()? {
        if session.status == SessionStatus::Working {
            session.status = SessionStatus::Idle;
            store.upsert_session(&session)?;
        }
    }

    Ok(recovered)
}

/// Idle sweep: delete task-history rows older than
/// [`TASK_HISTORY_MAX_AGE_DAYS`].
pub fn prune_task_history(store: &Store, now: DateTime<Utc>) -> Result<u64> {
    store.prune_task_history(now, TASK_HISTORY_MAX_AGE_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_domain::model::{SessionRecord, TaskHistoryRow};
    use std::path::PathBuf;

    fn hours_ago(h: i64) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::hours(h)
    }

    #[test]
    fn not_idle_long_enough_does_nothing() {
        let action = evaluate_pause_grace(hours_ago(1), Utc::now(), true, false, None);
        assert_eq!(action, SweepAction::None);
    }

    #[test]
    fn idle_with_empty_queue_is_destroyed_immediately() {
        let action = evaluate_pause_grace(hours_ago(25), Utc::now(), false, true, None);
        assert_eq!(action, SweepAction::DestroyNow);
    }

    #[test]
    fn idle_not_paused_with_pending_tasks_does_nothing() {
        let action = evaluate_pause_grace(hours_ago(25), Utc::now(), false, false, None);
        assert_eq!(action, SweepAction::None);
    }

    #[test]
    fn idle_paused_with_pending_tasks_warns_once() {
        let action = evaluate_pause_grace(hours_ago(25), Utc::now(), true, false, None);
        assert_eq!(action, SweepAction::Warn);
    }

    #[test]
    fn warned_within_grace_window_does_nothing() {
        let now = Utc::now();
        let action = evaluate_pause_grace(now - chrono::Duration::hours(25), now, true, false, Some(now - chrono::Duration::hours(1)));
        assert_eq!(action, SweepAction::None);
    }

    #[test]
    fn warned_past_grace_window_is_destroyed() {
        let now = Utc::now();
        let action = evaluate_pause_grace(now - chrono::Duration::hours(25), now, true, false, Some(now - chrono::Duration::hours(25)));
        assert_eq!(action, SweepAction::DestroyAfterGrace);
    }

    fn session_record(channel: &str, status: SessionStatus) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            channel: channel.into(),
            project: "acme__widgets".into(),
            workspace_path: PathBuf::from("/tmp/ws"),
            base_branch: "main".into(),
            agent_branch: "agent/x-1".into(),
            status,
            paused: false,
            model: "default".into(),
            last_activity: now,
            created_at: now,
        }
    }

    #[test]
    fn crash_recovery_terminalizes_running_tasks_and_resets_working_sessions() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_session(&session_record("chan-1", SessionStatus::Working)).unwrap();
        let id = store
            .insert_task(&TaskHistoryRow {
                id: 0,
                channel: "chan-1".into(),
                prompt: "refactor cache".into(),
                status: TaskStatus::Running,
                started_at: Utc::now(),
                completed_at: None,
                timeout_ms: Some(60_000),
                submitter: Some("alice".into()),
            })
            .unwrap();

        let recovered = recover_from_crash(&store, Utc::now()).unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].channel, "chan-1");
        assert_eq!(recovered[0].prompt, "refactor cache");

        let task = store.recent_tasks("chan-1", 1).unwrap();
        assert_eq!(task[0].id, id);
        assert_eq!(task[0].status, TaskStatus::Aborted);

        let session = store.get_session("chan-1").unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Idle);
    }

    #[test]
    fn crash_recovery_leaves_idle_sessions_untouched() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_session(&session_record("chan-1", SessionStatus::Idle)).unwrap();
        recover_from_crash(&store, Utc::now()).unwrap();
        let session = store.get_session("chan-1").unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Idle);
    }
}
