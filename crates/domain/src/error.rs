/// Shared error type used across all gateway crates.
///
/// Variants map onto the error taxonomy from the spec: user-facing
/// rejections that must not mutate state, policy denials, transient vs.
/// fatal external failures, invariant breaks that are auto-healed, and the
/// distinguished agent timeout.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    /// Bad user input: malformed path, oversized prompt, full queue, etc.
    /// Surfaced to the user; must not mutate session state.
    #[error("rejected: {0}")]
    InputRejected(String),

    /// The policy engine denied a tool invocation.
    #[error("policy denied ({gate}): {reason}")]
    PolicyDenied { gate: PolicyGate, reason: String },

    /// A recoverable failure in an external collaborator (chat-platform
    /// rate limit, source-control transient error, network timeout).
    #[error("transient: {0}")]
    ExternalTransient(String),

    /// An unrecoverable failure in an external collaborator (auth failure).
    #[error("fatal: {0}")]
    ExternalFatal(String),

    /// A corrupted workspace or durable store. Callers attempt the
    /// documented auto-heal (recreate worktree, rebuild store) and continue.
    #[error("invariant broken: {0}")]
    InternalInvariantBroken(String),

    /// The agent SDK's `sendAndWait` exceeded its deadline.
    #[error("agent timed out after {0}ms")]
    AgentTimeout(u64),

    #[error("{0}")]
    Other(String),
}

/// The category of a Policy Engine denial (spec §4.1 / §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyGate {
    Push,
    Outside,
    Other,
}

impl std::fmt::Display for PolicyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Outside => write!(f, "outside"),
            Self::Other => write!(f, "other"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
