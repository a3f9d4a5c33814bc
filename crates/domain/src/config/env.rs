use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment & allowlists (spec §6 Environment)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identifiers from the chat platform (channel, user, role, guild ids) are
/// always 17–20 digit snowflakes. Every allowlist is validated against this
/// shape before use so a malformed config value fails fast at startup
/// rather than silently never matching.
pub fn is_valid_snowflake(id: &str) -> bool {
    let len = id.len();
    (17..=20).contains(&len) && id.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvConfig {
    /// Channel id admin notifications (crash recovery, pause-grace warnings)
    /// are posted to when no more specific channel applies.
    #[serde(default)]
    pub admin_channel_id: Option<String>,

    /// User id treated as a global admin regardless of per-guild roles.
    #[serde(default)]
    pub admin_user_id: Option<String>,

    /// Guild ids the gateway is willing to operate in. Empty = no
    /// restriction.
    #[serde(default)]
    pub guild_allowlist: Vec<String>,

    /// Channel ids the gateway is willing to operate in. Empty = no
    /// restriction.
    #[serde(default)]
    pub channel_allowlist: Vec<String>,

    /// Role ids whose members may act as admins (approve pushes, click
    /// retry buttons on others' behalf).
    #[serde(default)]
    pub admin_role_ids: Vec<String>,

    /// User ids allowed to interact with the gateway over direct message.
    #[serde(default)]
    pub dm_user_allowlist: Vec<String>,
}

impl EnvConfig {
    /// Validate every configured identifier is a well-formed snowflake.
    /// Called at startup; a malformed allowlist entry is a config error.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut check = |label: &str, id: &str| {
            if !is_valid_snowflake(id) {
                issues.push(format!("{label} '{id}' is not a valid 17-20 digit identifier"));
            }
        };
        if let Some(id) = &self.admin_channel_id {
            check("admin_channel_id", id);
        }
        if let Some(id) = &self.admin_user_id {
            check("admin_user_id", id);
        }
        for id in &self.guild_allowlist {
            check("guild_allowlist", id);
        }
        for id in &self.channel_allowlist {
            check("channel_allowlist", id);
        }
        for id in &self.admin_role_ids {
            check("admin_role_ids", id);
        }
        for id in &self.dm_user_allowlist {
            check("dm_user_allowlist", id);
        }
        issues
    }

    pub fn is_admin_user(&self, user_id: &str) -> bool {
        self.admin_user_id.as_deref() == Some(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflake_length_bounds() {
        assert!(is_valid_snowflake("12345678901234567")); // 17
        assert!(is_valid_snowflake("12345678901234567890")); // 20
        assert!(!is_valid_snowflake("1234567890123456")); // 16 — too short
        assert!(!is_valid_snowflake("123456789012345678901")); // 21 — too long
        assert!(!is_valid_snowflake("1234567890abcdefg")); // non-digit
    }

    #[test]
    fn validate_flags_bad_admin_channel() {
        let cfg = EnvConfig {
            admin_channel_id: Some("not-a-snowflake".into()),
            ..Default::default()
        };
        let issues = cfg.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("admin_channel_id"));
    }

    #[test]
    fn validate_passes_with_good_ids() {
        let cfg = EnvConfig {
            admin_channel_id: Some("123456789012345678".into()),
            guild_allowlist: vec!["987654321098765432".into()],
            ..Default::default()
        };
        assert!(cfg.validate().is_empty());
    }
}
