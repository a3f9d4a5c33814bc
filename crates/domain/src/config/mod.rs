mod env;
mod policy;
mod sessions;
mod workspace;

pub use env::*;
pub use policy::*;
pub use sessions::*;
pub use workspace::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub env: EnvConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. An empty
    /// vec means everything looks good; any `Error`-severity issue should
    /// block startup (spec §6 Environment — allowlists validate before
    /// use).
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.sessions.max_queue_size == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.max_queue_size".into(),
                message: "max_queue_size must be greater than 0".into(),
            });
        }

        if self.policy.scm_bin.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "policy.scm_bin".into(),
                message: "scm_bin must not be empty".into(),
            });
        }

        for issue in self.env.validate() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "env".into(),
                message: issue,
            });
        }

        if self.env.admin_user_id.is_none() && self.env.admin_role_ids.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "env.admin_user_id".into(),
                message: "no admin user or role configured — push approvals and retry prompts \
                          will have no eligible clicker"
                    .into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_only_warnings() {
        let cfg = Config::default();
        let errors = cfg.validate();
        assert!(errors.iter().all(|e| e.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn zero_queue_size_is_an_error() {
        let mut cfg = Config::default();
        cfg.sessions.max_queue_size = 0;
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.severity == ConfigSeverity::Error && e.field == "sessions.max_queue_size"));
    }
}
