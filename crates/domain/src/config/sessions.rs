use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Queue & session-machine timeouts (spec §4.5, §5)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Hard cap on a channel's pending-task queue (spec §3 `QueuedTask`).
    #[serde(default = "d_max_queue_size")]
    pub max_queue_size: usize,

    /// Default per-task timeout passed to the agent SDK's `sendAndWait`.
    #[serde(default = "d_task_timeout_ms")]
    pub default_task_timeout_ms: u64,

    /// Ceiling on the agent SDK's `createSession` call.
    #[serde(default = "d_session_create_timeout_ms")]
    pub session_create_timeout_ms: u64,

    /// How long a paused session with a pending queue survives after its
    /// warning before being destroyed.
    #[serde(default = "d_pause_grace_ms")]
    pub pause_grace_ms: u64,

    /// How often the pause-grace / idle sweep runs.
    #[serde(default = "d_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// A session idle for at least this long is eligible for the sweep.
    #[serde(default = "d_idle_threshold_ms")]
    pub idle_threshold_ms: u64,

    /// Deadline for the question-answer collector.
    #[serde(default = "d_question_timeout_ms")]
    pub question_timeout_ms: u64,

    /// Deadline for the push-approval collector.
    #[serde(default = "d_approval_timeout_ms")]
    pub approval_timeout_ms: u64,

    /// Deadline for the crash-recovery retry-button prompt.
    #[serde(default = "d_retry_prompt_timeout_ms")]
    pub retry_prompt_timeout_ms: u64,

    /// Hard deadline for graceful shutdown before a force-exit.
    #[serde(default = "d_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Re-enqueue a channel's last prompt automatically on crash recovery
    /// instead of posting a retry button.
    #[serde(default)]
    pub auto_retry_on_crash: bool,

    /// Bypass the push-approval collector entirely.
    #[serde(default)]
    pub auto_approve_push: bool,

    /// Default model id for newly created sessions.
    #[serde(default = "d_default_model")]
    pub default_model: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_queue_size: d_max_queue_size(),
            default_task_timeout_ms: d_task_timeout_ms(),
            session_create_timeout_ms: d_session_create_timeout_ms(),
            pause_grace_ms: d_pause_grace_ms(),
            sweep_interval_ms: d_sweep_interval_ms(),
            idle_threshold_ms: d_idle_threshold_ms(),
            question_timeout_ms: d_question_timeout_ms(),
            approval_timeout_ms: d_approval_timeout_ms(),
            retry_prompt_timeout_ms: d_retry_prompt_timeout_ms(),
            shutdown_timeout_ms: d_shutdown_timeout_ms(),
            auto_retry_on_crash: false,
            auto_approve_push: false,
            default_model: d_default_model(),
        }
    }
}

fn d_max_queue_size() -> usize {
    50
}
fn d_task_timeout_ms() -> u64 {
    30 * 60 * 1000
}
fn d_session_create_timeout_ms() -> u64 {
    60_000
}
fn d_pause_grace_ms() -> u64 {
    24 * 60 * 60 * 1000
}
fn d_sweep_interval_ms() -> u64 {
    12 * 60 * 60 * 1000
}
fn d_idle_threshold_ms() -> u64 {
    24 * 60 * 60 * 1000
}
fn d_question_timeout_ms() -> u64 {
    5 * 60 * 1000
}
fn d_approval_timeout_ms() -> u64 {
    10 * 60 * 1000
}
fn d_retry_prompt_timeout_ms() -> u64 {
    10 * 60 * 1000
}
fn d_shutdown_timeout_ms() -> u64 {
    15_000
}
fn d_default_model() -> String {
    "default".into()
}
