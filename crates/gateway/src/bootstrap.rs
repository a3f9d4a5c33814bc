//! Startup config validation, crash recovery, and background-sweep spawning.
//!
//! Mirrors the teacher's `build_app_state`/`spawn_background_tasks` split:
//! one function validates config and bails on hard errors, a second recovers
//! durable state left behind by an unclean shutdown, a third spawns the
//! periodic sweeps that keep grants, idle sessions, and task history in
//! check.

use std::sync::Arc;

use sg_domain::config::{Config, ConfigSeverity};
use sg_sessions::{AgentSessionFactory, ChatPlatform};
use sg_store::Store;
use sg_workspace::WorkspaceManager;

use crate::state::Core;

/// Log every config issue, then bail if any is `Error` severity. Modeled on
/// the teacher's `build_app_state` config-validation block.
pub fn validate_or_bail(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }
    Ok(())
}

/// Terminalize task rows and idle sessions left `running`/`working` by an
/// unclean shutdown (spec §5 "Crash recovery"), then reconcile the workspace
/// tree against the durable store.
pub async fn recover_and_reconcile(store: &Store, workspace: &WorkspaceManager) -> anyhow::Result<()> {
    let recovered = sg_sessions::recover_from_crash(store, chrono::Utc::now())?;
    for r in &recovered {
        tracing::warn!(channel = %r.channel, "recovered session from unclean shutdown");
    }
    workspace.reconcile().await?;
    tracing::info!(recovered = recovered.len(), "crash recovery + workspace reconciliation complete");
    Ok(())
}

/// Spawn the three periodic sweeps: grant-expiry purge, pause-grace/idle
/// sweep, and task-history pruning. Grounded on the teacher's
/// `spawn_background_tasks` `tokio::time::interval` loop-per-concern shape.
pub fn spawn_sweeps<F, C>(core: Arc<Core<F, C>>)
where
    F: AgentSessionFactory + 'static,
    C: ChatPlatform + 'static,
{
    // ── Grant-expiry purge ───────────────────────────────────────────
    {
        let grants = core.grants.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                match grants.purge_expired() {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(purged = n, "expired grants purged"),
                    Err(e) => tracing::warn!(error = %e, "grant purge failed"),
                }
            }
        });
    }

    // ── Pause-grace / idle sweep ─────────────────────────────────────
    {
        let sessions = core.sessions.clone();
        let interval_ms = core.config.sessions.sweep_interval_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                for (channel, action) in sessions.sweep_idle_and_paused().await {
                    match action {
                        sg_sessions::SweepAction::None => {}
                        sg_sessions::SweepAction::Warn => {
                            tracing::info!(channel, "pause-grace warning issued");
                        }
                        sg_sessions::SweepAction::DestroyNow => {
                            tracing::info!(channel, "idle session destroyed");
                        }
                        sg_sessions::SweepAction::DestroyAfterGrace => {
                            tracing::info!(channel, "paused session destroyed after grace period");
                        }
                    }
                }
            }
        });
    }

    // ── Task-history pruning ─────────────────────────────────────────
    {
        let store = core.store.clone();
        let interval_ms = core.config.sessions.sweep_interval_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                match sg_sessions::prune_task_history(&store, chrono::Utc::now()) {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(pruned = n, "old task history rows pruned"),
                    Err(e) => tracing::warn!(error = %e, "task history pruning failed"),
                }
            }
        });
    }

    tracing::info!("background sweeps spawned");
}
