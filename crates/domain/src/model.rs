//! Core data-model types shared by the store, grants, sessions, and
//! workspace crates (spec §3).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Working,
}

/// Durable projection of a channel session. The live queue, output sink,
/// and abort flag are runtime-only and owned by `sg-sessions`; this is the
/// subset that survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub channel: String,
    pub project: String,
    pub workspace_path: PathBuf,
    pub base_branch: String,
    pub agent_branch: String,
    pub status: SessionStatus,
    pub paused: bool,
    pub model: String,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Grant
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantMode {
    Ro,
    Rw,
}

impl GrantMode {
    /// `self` is at least as strong as `required` (rw satisfies ro).
    pub fn satisfies(self, required: GrantMode) -> bool {
        match required {
            GrantMode::Ro => true,
            GrantMode::Rw => self == GrantMode::Rw,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRecord {
    pub channel: String,
    pub path: PathBuf,
    pub mode: GrantMode,
    pub expires_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHistoryRow {
    pub id: i64,
    pub channel: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_ms: Option<u64>,
    pub submitter: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Overrides & responders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoOverride {
    pub channel: String,
    pub remote_url: String,
    pub local_path: PathBuf,
    pub project: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchOverride {
    pub channel: String,
    pub base_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Responder {
    pub channel: String,
    pub user: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Queued task (runtime-only — not persisted)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A handle identifying where a task's output should be delivered — the
/// session's main channel, or a thread distinct from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputTarget {
    MainChannel(String),
    Thread(String),
}
