//! Runtime session state: the `creating -> (idle | working)` machine with
//! an independent `paused` flag (spec §4.5). `absent` has no representation
//! here — it's simply the lack of an entry in the manager's session map.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use sg_output::OutputSink;

use crate::agent::AgentSession;
use crate::chat::{ChannelHandleAdapter, ChatPlatform};
use crate::queue::TaskQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Idle,
    Working,
}

/// A live, in-memory session: queue, agent handle, output sink, and the
/// flags the Session Machine checks before promoting another task.
pub struct Session<C: ChatPlatform> {
    pub channel: String,
    pub project: String,
    pub repo_dir: PathBuf,
    pub workspace_path: PathBuf,
    pub base_branch: String,
    pub agent_branch: String,
    pub model: String,
    pub status: RuntimeStatus,
    pub paused: bool,
    /// Increments on every `working` entry; stale async callbacks from a
    /// prior generation are discarded by comparing against this.
    pub generation: u64,
    /// Set by an explicit user abort; distinguishes "abort" from "timeout"
    /// or "failure" once `send_and_wait` returns, then reset on the next
    /// `working` entry.
    pub current_aborted: bool,
    pub queue: TaskQueue,
    /// `Arc`, not `Box`: [`crate::machine::SessionManager::run_task`] clones
    /// this and releases the session lock before awaiting `send_and_wait`,
    /// so an abort or pause issued mid-task doesn't have to wait for it.
    pub agent: Arc<dyn AgentSession>,
    pub output: Arc<OutputSink<ChannelHandleAdapter<C>>>,
    /// Set while the agent SDK's user-input hook is waiting on a reply;
    /// callers must not re-enqueue an incoming message as a new task while
    /// this is set.
    pub awaiting_question: bool,
    /// Set while a model hot-swap is in flight; blocks `processQueue`.
    pub changing_model: bool,
    pub last_activity: DateTime<Utc>,
    /// Timestamp of the pause-grace sweep's warning message, if any has
    /// been sent since the session last went idle with pending tasks.
    pub idle_warned_at: Option<DateTime<Utc>>,
}

impl<C: ChatPlatform> Session<C> {
    pub fn is_busy(&self) -> bool {
        self.status == RuntimeStatus::Working
    }
}
