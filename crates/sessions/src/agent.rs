//! Coding-agent session trait seam (spec §6 "Coding agent (collaborator)").
//!
//! Design Notes §9 flags the original's callback soup around the agent
//! session; `AgentEvent`/`GenEvent` replace the ad-hoc `_taskGen` comparison
//! with a typed event tagged by the generation that produced it, so a
//! caller can discard anything that doesn't match the session's current
//! generation instead of comparing counters by hand at every callback site.
//! No concrete coding-agent subprocess is implemented here — out of scope
//! per spec §1 — only the contract the Session Machine drives.

use std::path::Path;
use std::time::Duration;

use sg_domain::error::Result;

/// One streaming update from a running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    Delta(String),
    ToolStart { name: String },
    ToolComplete { name: String },
    Idle,
}

/// An [`AgentEvent`] tagged with the generation of the task that produced
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenEvent {
    pub generation: u64,
    pub event: AgentEvent,
}

/// A live coding-agent subprocess session bound to one workspace.
#[async_trait::async_trait]
pub trait AgentSession: Send + Sync {
    /// Send a prompt and wait for the agent to finish, or time out.
    /// `Err(Error::AgentTimeout(_))` distinguishes a timeout from any other
    /// failure, per spec §6's `sendAndWait` contract.
    async fn send_and_wait(&self, prompt: &str, timeout: Duration) -> Result<String>;
    /// Cancel an in-flight `send_and_wait`.
    async fn abort(&self);
    /// Release the session (subprocess teardown).
    async fn destroy(&self);
}

/// Creates [`AgentSession`]s bound to a working directory and model
/// (spec §6's `createSession`).
#[async_trait::async_trait]
pub trait AgentSessionFactory: Send + Sync {
    async fn create_session(&self, working_directory: &Path, model: &str) -> Result<Box<dyn AgentSession>>;
}
