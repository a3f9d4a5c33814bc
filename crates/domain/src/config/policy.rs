use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy Engine configuration (spec §4.1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Name of the source-control binary (`git`, by convention).
    #[serde(default = "d_scm_bin")]
    pub scm_bin: String,

    /// Hosting-service CLI used for pull-request publishing verbs (`gh`).
    #[serde(default = "d_hosting_cli")]
    pub hosting_cli: String,

    /// Shell-reading verbs gated by the file-operation gate (cat, head, ...).
    #[serde(default = "d_file_read_verbs")]
    pub file_read_verbs: Vec<String>,

    /// Default grant TTL (minutes) when a `grant` command omits one.
    #[serde(default = "d_default_grant_ttl_minutes")]
    pub default_grant_ttl_minutes: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            scm_bin: d_scm_bin(),
            hosting_cli: d_hosting_cli(),
            file_read_verbs: d_file_read_verbs(),
            default_grant_ttl_minutes: d_default_grant_ttl_minutes(),
        }
    }
}

fn d_scm_bin() -> String {
    "git".into()
}
fn d_hosting_cli() -> String {
    "gh".into()
}
fn d_file_read_verbs() -> Vec<String> {
    [
        "cat", "head", "tail", "less", "more", "sort", "uniq", "wc", "file", "stat", "od", "xxd",
        "strings", "base64", "type", "nl", "tac",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn d_default_grant_ttl_minutes() -> u32 {
    60
}
