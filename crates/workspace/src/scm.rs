//! Thin subprocess wrapper around a source-control binary (spec §6
//! "Source control (collaborator)"). Grounded on the teacher's
//! `tools/src/exec.rs` spawn-with-timeout pattern, simplified to a
//! synchronous request/response shape since workspace operations don't
//! need the streaming/background session machinery exec.rs provides.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use sg_domain::error::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Invokes a source-control binary (`git` by default) as a subprocess.
#[derive(Debug, Clone)]
pub struct Scm {
    bin: String,
}

impl Scm {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run(&self, args: &[&str], cwd: Option<&Path>, extra_env: &[(String, String)]) -> Result<String> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in extra_env {
            cmd.env(k, v);
        }

        let child = cmd
            .spawn()
            .map_err(|e| Error::ExternalTransient(format!("failed to spawn {}: {e}", self.bin)))?;

        let output = match tokio::time::timeout(DEFAULT_TIMEOUT, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| Error::ExternalTransient(format!("{}: {e}", self.bin)))?,
            Err(_) => {
                return Err(Error::ExternalTransient(format!(
                    "{} {:?} timed out after {:?}",
                    self.bin, args, DEFAULT_TIMEOUT
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalTransient(format!(
                "{} {:?} failed: {}",
                self.bin,
                args,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn clone_repo(&self, url: &str, dest: &Path, extra_env: &[(String, String)]) -> Result<()> {
        self.run(
            &["clone", url, dest.to_string_lossy().as_ref()],
            None,
            extra_env,
        )
        .await?;
        Ok(())
    }

    pub async fn fetch(&self, repo_dir: &Path) -> Result<()> {
        self.run(&["fetch", "--all", "--prune"], Some(repo_dir), &[]).await?;
        Ok(())
    }

    /// Resolve `rev` to a commit hash, or `Err` if it doesn't exist.
    pub async fn rev_parse(&self, repo_dir: &Path, rev: &str) -> Result<String> {
        self.run(&["rev-parse", "--verify", rev], Some(repo_dir), &[]).await
    }

    pub async fn remote_branch_exists(&self, repo_dir: &Path, branch: &str) -> bool {
        self.rev_parse(repo_dir, &format!("refs/remotes/origin/{branch}"))
            .await
            .is_ok()
    }

    pub async fn worktree_add(
        &self,
        repo_dir: &Path,
        worktree_path: &Path,
        new_branch: &str,
        base_ref: &str,
    ) -> Result<()> {
        self.run(
            &[
                "worktree",
                "add",
                "-b",
                new_branch,
                worktree_path.to_string_lossy().as_ref(),
                base_ref,
            ],
            Some(repo_dir),
            &[],
        )
        .await?;
        Ok(())
    }

    pub async fn worktree_remove(&self, repo_dir: &Path, worktree_path: &Path) -> Result<()> {
        let _ = self
            .run(
                &["worktree", "remove", "--force", worktree_path.to_string_lossy().as_ref()],
                Some(repo_dir),
                &[],
            )
            .await;
        if worktree_path.exists() {
            let _ = std::fs::remove_dir_all(worktree_path);
        }
        self.worktree_prune(repo_dir).await
    }

    pub async fn worktree_prune(&self, repo_dir: &Path) -> Result<()> {
        self.run(&["worktree", "prune"], Some(repo_dir), &[]).await?;
        Ok(())
    }

    /// Cheap integrity check for an existing worktree: does `git status`
    /// run cleanly inside it?
    pub async fn worktree_healthy(&self, worktree_path: &Path) -> bool {
        self.run(&["status", "--porcelain"], Some(worktree_path), &[])
            .await
            .is_ok()
    }

    /// One-line-per-commit log of everything on the worktree's branch since
    /// it diverged from `base_ref`, for the Push-Approval Collector's
    /// summary (spec §4.4, §6 "log").
    pub async fn commit_log(&self, worktree_path: &Path, base_ref: &str) -> Result<String> {
        self.run(&["log", "--oneline", &format!("{base_ref}..HEAD")], Some(worktree_path), &[])
            .await
    }

    /// Diffstat of the same range, for the Push-Approval Collector's diff
    /// summary (spec §4.4, §6 "diff (stat / cached / plain)").
    pub async fn diff_stat(&self, worktree_path: &Path, base_ref: &str) -> Result<String> {
        self.run(&["diff", "--stat", &format!("{base_ref}...HEAD")], Some(worktree_path), &[])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn git(repo: &Path, args: &[&str]) {
        let status = StdCommand::new("git").args(args).current_dir(repo).status().unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "-q", "-b", "main"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "user.name", "test"]);
        std::fs::write(dir.join("README.md"), "hello").unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", "init"]);
    }

    #[tokio::test]
    async fn commit_log_and_diff_stat_report_the_branch_delta() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path();
        init_repo(repo);
        git(repo, &["checkout", "-q", "-b", "agent/test"]);
        std::fs::write(repo.join("feature.txt"), "new feature").unwrap();
        git(repo, &["add", "."]);
        git(repo, &["commit", "-q", "-m", "add feature"]);

        let scm = Scm::new("git");
        let log = scm.commit_log(repo, "main").await.unwrap();
        assert!(log.contains("add feature"));

        let stat = scm.diff_stat(repo, "main").await.unwrap();
        assert!(stat.contains("feature.txt"));
    }
}
