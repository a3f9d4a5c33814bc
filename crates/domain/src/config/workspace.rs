use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persisted state layout (spec §6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Root directory layout: `workspaces/<project>/<channel>`,
/// `repos/<project>`, and a single relational-store file, all rooted at
/// `base_root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "d_base_root")]
    pub base_root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_root: d_base_root(),
        }
    }
}

impl WorkspaceConfig {
    pub fn workspaces_root(&self) -> PathBuf {
        self.base_root.join("workspaces")
    }

    pub fn repos_root(&self) -> PathBuf {
        self.base_root.join("repos")
    }

    pub fn store_path(&self) -> PathBuf {
        self.base_root.join("gateway.sqlite3")
    }

    pub fn channel_workspace(&self, project: &str, channel: &str) -> PathBuf {
        self.workspaces_root().join(project).join(channel)
    }

    pub fn repo_path(&self, project: &str) -> PathBuf {
        self.repos_root().join(project)
    }
}

fn d_base_root() -> PathBuf {
    PathBuf::from("./data")
}
