//! Command Layer (spec §6 admin command table): one free function per admin
//! verb over a [`Core`], plus [`gate_tool_use`], the composition-root
//! boundary standing in for a concrete agent SDK's `onPreToolUse` hook.
//! Grounded on the teacher's `runtime/approval.rs`/`api/admin` handlers,
//! which are likewise thin wrappers dispatching into the session machine
//! and durable store rather than owning any state themselves.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use sg_domain::error::{Error, Result};
use sg_domain::model::{BranchOverride, GrantMode, OutputTarget, RepoOverride};
use sg_domain::tool::ToolInvocation;
use sg_sessions::{AgentSessionFactory, ChatPlatform, PushApprovalCollector};

use crate::state::Core;

/// Outcome of [`gate_tool_use`]: either the tool proceeds, or it's denied
/// with a reason to surface back to the agent as additional context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny { additional_context: String },
}

/// `grant(path, mode, ttl) -> add grant; reply with expiry` (spec §6).
pub async fn grant<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(
    core: &Core<F, C>,
    channel: &str,
    path: &std::path::Path,
    mode: GrantMode,
    ttl_minutes: Option<i64>,
) -> Result<DateTime<Utc>> {
    let ttl_minutes = ttl_minutes.unwrap_or(core.config.policy.default_grant_ttl_minutes as i64);
    core.grants.add(channel, path, mode, ttl_minutes)?;
    Ok(Utc::now() + chrono::Duration::minutes(ttl_minutes))
}

/// `revoke(path) -> remove grant` (spec §6).
pub fn revoke<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(
    core: &Core<F, C>,
    channel: &str,
    path: &std::path::Path,
) -> Result<()> {
    core.grants.revoke(channel, path)
}

/// `reset() -> destroy session and workspace` (spec §6). Grants, overrides,
/// and responders are owned by the channel, not the session, and outlive
/// this (spec.md §3 Ownership) — same as `set_repo`/`set_branch`, which
/// reset the session without touching them.
pub async fn reset<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(core: &Core<F, C>, channel: &str) -> Result<()> {
    core.sessions.reset(channel).await
}

/// `stop(clear_queue?) -> abort running task; optionally clear queue` (spec §6).
pub async fn stop<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(
    core: &Core<F, C>,
    channel: &str,
    clear_queue: bool,
) -> Result<()> {
    core.sessions.abort(channel, clear_queue).await
}

/// `pause() -> set paused flag` (spec §6).
pub async fn pause<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(core: &Core<F, C>, channel: &str) -> Result<()> {
    core.sessions.pause(channel).await
}

/// `resume() -> clear paused flag; kick queue` (spec §6).
pub async fn resume<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(core: &Core<F, C>, channel: &str) -> Result<()> {
    core.sessions.resume(channel).await
}

/// `set-repo(owner/repo or URL) -> override repo; clone if needed; reset
/// session; clear branch override` (spec §6).
pub async fn set_repo<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(
    core: &Core<F, C>,
    channel: &str,
    repo_input: &str,
    credential_env: &[(String, String)],
) -> Result<PathBuf> {
    let parsed = sg_workspace::parse_repo_input(repo_input)?;
    let repo_dir = core.workspace.ensure_repo(&parsed, credential_env).await?;

    // Best-effort: the channel may have no live session yet.
    let _ = core.sessions.reset(channel).await;

    core.store.set_repo_override(&RepoOverride {
        channel: channel.to_string(),
        remote_url: parsed.remote_url,
        local_path: repo_dir.clone(),
        project: parsed.project,
    })?;
    core.store.delete_branch_override(channel)?;
    Ok(repo_dir)
}

/// Resolve the repo directory a channel currently points at: the
/// most-recently-set repo override if one exists, else the project recorded
/// on its durable session row. Errors if the channel has no repo context at
/// all yet.
async fn resolve_repo_dir<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(
    core: &Core<F, C>,
    channel: &str,
) -> Result<(String, PathBuf)> {
    if let Some(o) = core.store.get_repo_override(channel)? {
        return Ok((o.project, o.local_path));
    }
    if let Some(session) = core.store.get_session(channel)? {
        let repo_dir = core.config.workspace.repo_path(&session.project);
        return Ok((session.project, repo_dir));
    }
    Err(Error::InputRejected(format!(
        "channel {channel} has no repo configured yet; run set-repo first"
    )))
}

/// `set-branch(name) -> validate against remote; override base branch;
/// reset session` (spec §6).
pub async fn set_branch<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(
    core: &Core<F, C>,
    channel: &str,
    branch: &str,
) -> Result<()> {
    let (_project, repo_dir) = resolve_repo_dir(core, channel).await?;
    if !core.workspace.scm().remote_branch_exists(&repo_dir, branch).await {
        return Err(Error::InputRejected(format!(
            "branch {branch} does not exist on the remote"
        )));
    }
    core.store.set_branch_override(&BranchOverride {
        channel: channel.to_string(),
        base_branch: branch.to_string(),
    })?;
    let _ = core.sessions.reset(channel).await;
    Ok(())
}

/// `set-model(id) -> hot-swap session model` (spec §6).
pub async fn set_model<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(
    core: &Core<F, C>,
    channel: &str,
    model: String,
) -> Result<()> {
    core.sessions.set_model(channel, model).await
}

/// `config() -> emit current configuration` (spec §6).
pub fn config_show<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(core: &Core<F, C>) -> Result<String> {
    toml::to_string_pretty(&*core.config).map_err(|e| Error::Other(e.to_string()))
}

/// Policy gate for a classified tool invocation (spec §6 agent-SDK
/// `onPreToolUse` hook): allow outright, deny outright, or — for a push
/// denial specifically — escalate to the Push-Approval Collector before
/// deciding.
pub async fn gate_tool_use<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(
    core: &Core<F, C>,
    channel: &str,
    workspace_root: &std::path::Path,
    tool_name: &str,
    args: &serde_json::Value,
    admin_users: &[String],
) -> PermissionDecision {
    let invocation = ToolInvocation::classify(tool_name, args);
    let decision = sg_policy::evaluate(&invocation, channel, workspace_root, &core.grants, &core.config.policy);

    match decision {
        sg_policy::Decision::Allow => PermissionDecision::Allow,
        sg_policy::Decision::Deny { reason, gate: sg_domain::error::PolicyGate::Push } => {
            gate_push(core, channel, workspace_root, admin_users, reason).await
        }
        sg_policy::Decision::Deny { reason, .. } => PermissionDecision::Deny { additional_context: reason },
    }
}

async fn gate_push<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static>(
    core: &Core<F, C>,
    channel: &str,
    workspace_root: &std::path::Path,
    admin_users: &[String],
    reason: String,
) -> PermissionDecision {
    let base_branch = core
        .store
        .get_session(channel)
        .ok()
        .flatten()
        .map(|s| s.base_branch)
        .unwrap_or_else(|| "main".to_string());

    let commit_log = core
        .workspace
        .scm()
        .commit_log(workspace_root, &base_branch)
        .await
        .unwrap_or_default();
    let diff_summary = core
        .workspace
        .scm()
        .diff_stat(workspace_root, &base_branch)
        .await
        .unwrap_or_default();

    let collector = PushApprovalCollector::new(core.platform.clone());
    let approved = collector
        .request(
            &OutputTarget::MainChannel(channel.to_string()),
            &commit_log,
            &diff_summary,
            admin_users,
            core.config.sessions.auto_approve_push,
            core.sessions.approval_cancel_handle(channel),
        )
        .await;

    if approved {
        PermissionDecision::Allow
    } else {
        PermissionDecision::Deny { additional_context: reason }
    }
}
