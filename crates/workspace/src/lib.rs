//! Workspace Manager (spec §4.6): clone/worktree/branch lifecycle over a
//! source-control subprocess helper. Clone deduplication and boot-time
//! reconciliation follow the teacher's "track per-entity first-run state
//! under a root directory" shape (`gateway/src/workspace/bootstrap.rs`),
//! generalized from bootstrap markers to repo/worktree lifecycle.

pub mod scm;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::Notify;

use sg_domain::config::WorkspaceConfig;
use sg_domain::error::{Error, Result};
use sg_store::Store;

pub use scm::Scm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRepo {
    pub project: String,
    pub remote_url: String,
}

static OWNER_REPO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)$").unwrap());

/// Accept `owner/repo` or a full hosting URL (`https://...` / `git@...:...`);
/// reject anything else.
pub fn parse_repo_input(input: &str) -> Result<ParsedRepo> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::InputRejected("repo input must not be empty".into()));
    }

    if let Some(caps) = OWNER_REPO_RE.captures(input) {
        let owner = &caps[1];
        let repo = &caps[2];
        return Ok(ParsedRepo {
            project: format!("{owner}__{repo}"),
            remote_url: format!("https://github.com/{owner}/{repo}.git"),
        });
    }

    if input.starts_with("https://") || input.starts_with("http://") || input.starts_with("git@") {
        let trimmed = input.trim_end_matches('/');
        let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
        let project = last.strip_suffix(".git").unwrap_or(last).to_string();
        if project.is_empty() {
            return Err(Error::InputRejected(format!("can't derive a project name from {input}")));
        }
        return Ok(ParsedRepo {
            project,
            remote_url: input.to_string(),
        });
    }

    Err(Error::InputRejected(format!("unrecognized repo input: {input}")))
}

fn agent_branch_name(channel: &str, timestamp_secs: u64) -> String {
    let last8: String = {
        let chars: Vec<char> = channel.chars().collect();
        let start = chars.len().saturating_sub(8);
        chars[start..].iter().collect()
    };
    format!("agent/{last8}-{}", to_base36(timestamp_secs))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

/// Owns repo clones and per-channel worktrees under `WorkspaceConfig`'s
/// `repos/` and `workspaces/` roots.
pub struct WorkspaceManager {
    scm: Scm,
    config: WorkspaceConfig,
    store: Arc<Store>,
    pending_clones: Mutex<HashMap<String, Arc<Notify>>>,
    /// Monotonic counter used in place of a wall-clock read so two worktrees
    /// created in the same second still get distinct branch names.
    branch_seq: AtomicU64,
}

impl WorkspaceManager {
    pub fn new(scm_bin: impl Into<String>, config: WorkspaceConfig, store: Arc<Store>) -> Self {
        Self {
            scm: Scm::new(scm_bin),
            config,
            store,
            pending_clones: Mutex::new(HashMap::new()),
            branch_seq: AtomicU64::new(0),
        }
    }

    pub fn scm(&self) -> &Scm {
        &self.scm
    }

    /// Clone `parsed` into `repos/<project>` unless it's already there,
    /// deduplicating concurrent clones of the same project via a
    /// pending-clones table (spec §4.6 / §5.3). Credentials are injected
    /// via source-control config environment variables, never by rewriting
    /// the URL.
    pub async fn ensure_repo(&self, parsed: &ParsedRepo, credential_env: &[(String, String)]) -> Result<PathBuf> {
        let repo_dir = self.config.repo_path(&parsed.project);

        if repo_dir.exists() && !repo_dir.join(".git").exists() {
            std::fs::remove_dir_all(&repo_dir).map_err(Error::Io)?;
        }
        if repo_dir.join(".git").exists() {
            return Ok(repo_dir);
        }

        let waiter = {
            let mut pending = self.pending_clones.lock();
            if let Some(existing) = pending.get(&parsed.project) {
                Some(existing.clone())
            } else {
                pending.insert(parsed.project.clone(), Arc::new(Notify::new()));
                None
            }
        };

        if let Some(notify) = waiter {
            notify.notified().await;
            return if repo_dir.join(".git").exists() {
                Ok(repo_dir)
            } else {
                Err(Error::ExternalTransient(format!(
                    "clone of {} did not complete",
                    parsed.project
                )))
            };
        }

        if let Some(parent) = repo_dir.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let result = self.scm.clone_repo(&parsed.remote_url, &repo_dir, credential_env).await;
        if let Some(notify) = self.pending_clones.lock().remove(&parsed.project) {
            notify.notify_waiters();
        }
        result.map(|_| repo_dir)
    }

    /// Resolve the base ref in precedence order: per-channel branch
    /// override (if fetchable), global default branch, repository HEAD.
    async fn resolve_base_ref(&self, repo_dir: &Path, branch_override: Option<&str>, global_default: &str) -> Result<String> {
        if let Some(b) = branch_override {
            if self.scm.remote_branch_exists(repo_dir, b).await {
                return Ok(format!("origin/{b}"));
            }
            tracing::warn!(branch = b, "branch override not fetchable, falling back to default");
        }
        if self.scm.remote_branch_exists(repo_dir, global_default).await {
            return Ok(format!("origin/{global_default}"));
        }
        self.scm.rev_parse(repo_dir, "HEAD").await
    }

    /// Create a channel-private worktree on a freshly named agent branch.
    /// On corruption (the initial `worktree add` fails), remove whatever's
    /// there and retry once.
    pub async fn create_worktree(
        &self,
        channel: &str,
        project: &str,
        repo_dir: &Path,
        branch_override: Option<&str>,
        global_default_branch: &str,
    ) -> Result<(PathBuf, String, String)> {
        let _ = self.scm.fetch(repo_dir).await;
        let base_ref = self.resolve_base_ref(repo_dir, branch_override, global_default_branch).await?;
        let worktree_path = self.config.channel_workspace(project, channel);
        if let Some(parent) = worktree_path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let seq = self.branch_seq.fetch_add(1, Ordering::SeqCst);
        let agent_branch = agent_branch_name(channel, chrono::Utc::now().timestamp() as u64 + seq);

        if self.scm.worktree_add(repo_dir, &worktree_path, &agent_branch, &base_ref).await.is_err() {
            tracing::warn!(channel, "worktree add failed, recreating");
            let _ = self.scm.worktree_remove(repo_dir, &worktree_path).await;
            self.scm
                .worktree_add(repo_dir, &worktree_path, &agent_branch, &base_ref)
                .await?;
        }

        Ok((worktree_path, base_ref, agent_branch))
    }

    /// Best-effort worktree removal plus a source-control prune.
    pub async fn remove_worktree(&self, repo_dir: &Path, worktree_path: &Path) -> Result<()> {
        self.scm.worktree_remove(repo_dir, worktree_path).await
    }

    /// Walk the workspaces root; any channel directory not referenced by a
    /// durable session row is removed. Any durable row whose workspace path
    /// no longer exists is deleted. Prune every known repo.
    pub async fn reconcile(&self) -> Result<()> {
        let sessions = self.store.list_sessions()?;
        let known_paths: std::collections::HashSet<PathBuf> =
            sessions.iter().map(|s| s.workspace_path.clone()).collect();

        let workspaces_root = self.config.workspaces_root();
        if workspaces_root.exists() {
            for project_entry in std::fs::read_dir(&workspaces_root).map_err(Error::Io)?.flatten() {
                let project_dir = project_entry.path();
                if !project_dir.is_dir() {
                    continue;
                }
                for channel_entry in std::fs::read_dir(&project_dir).map_err(Error::Io)?.flatten() {
                    let channel_dir = channel_entry.path();
                    if channel_dir.is_dir() && !known_paths.contains(&channel_dir) {
                        tracing::info!(path = %channel_dir.display(), "removing orphaned workspace directory");
                        let _ = std::fs::remove_dir_all(&channel_dir);
                    }
                }
            }
        }

        for session in &sessions {
            if !session.workspace_path.exists() {
                tracing::info!(channel = %session.channel, "durable session row points at a missing workspace, deleting");
                self.store.delete_session(&session.channel)?;
            }
        }

        let repos_root = self.config.repos_root();
        if repos_root.exists() {
            for entry in std::fs::read_dir(&repos_root).map_err(Error::Io)?.flatten() {
                let repo_dir = entry.path();
                if repo_dir.join(".git").exists() {
                    let _ = self.scm.worktree_prune(&repo_dir).await;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_owner_repo_shorthand() {
        let parsed = parse_repo_input("acme/widgets").unwrap();
        assert_eq!(parsed.project, "acme__widgets");
        assert_eq!(parsed.remote_url, "https://github.com/acme/widgets.git");
    }

    #[test]
    fn parses_full_https_url() {
        let parsed = parse_repo_input("https://gitlab.example.com/team/sub/widgets.git").unwrap();
        assert_eq!(parsed.project, "widgets");
        assert_eq!(parsed.remote_url, "https://gitlab.example.com/team/sub/widgets.git");
    }

    #[test]
    fn parses_ssh_url() {
        let parsed = parse_repo_input("git@github.com:acme/widgets.git").unwrap();
        assert_eq!(parsed.project, "widgets");
    }

    #[test]
    fn rejects_garbage_input() {
        assert!(parse_repo_input("not a repo at all!!").is_err());
        assert!(parse_repo_input("").is_err());
    }

    #[test]
    fn branch_name_uses_last_8_of_channel_and_base36_timestamp() {
        let name = agent_branch_name("channel-0000001234567890", 70);
        assert_eq!(name, "agent/34567890-1y");
    }

    #[test]
    fn branch_name_handles_short_channel_ids() {
        let name = agent_branch_name("c1", 0);
        assert_eq!(name, "agent/c1-0");
    }

    #[tokio::test]
    async fn reconcile_deletes_session_rows_pointing_at_missing_workspaces() {
        use sg_domain::model::{SessionRecord, SessionStatus};
        let tmp = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig {
            base_root: tmp.path().to_path_buf(),
        };
        let store = Arc::new(Store::open_in_memory().unwrap());
        store
            .upsert_session(&SessionRecord {
                channel: "chan-1".into(),
                project: "acme__widgets".into(),
                workspace_path: config.channel_workspace("acme__widgets", "chan-1"),
                base_branch: "main".into(),
                agent_branch: "agent/chan-1-0".into(),
                status: SessionStatus::Idle,
                paused: false,
                model: "default".into(),
                last_activity: chrono::Utc::now(),
                created_at: chrono::Utc::now(),
            })
            .unwrap();

        let manager = WorkspaceManager::new("git", config, store.clone());
        manager.reconcile().await.unwrap();

        assert!(store.get_session("chan-1").unwrap().is_none());
    }
}
