//! Tool-invocation representation used by the Policy Engine.
//!
//! Design Notes §9 calls out the original's heterogeneous attribute lookup
//! on tool arguments as a dynamic-dispatch smell; this represents a tool
//! invocation as a small tagged enum instead, extracted once from the raw
//! `(name, json arguments)` pair the agent SDK hands us.

use serde_json::Value;

/// A tool invocation, classified into the families the Policy Engine gates
/// differently (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    Shell { command: String, cwd: Option<String> },
    Read { path: Option<String> },
    Write { path: Option<String> },
    Other { name: String },
}

/// Attribute names the extractor checks, in order, for a command string.
const COMMAND_KEYS: &[&str] = &["command", "cmd", "script"];
/// Attribute names checked for a path argument.
const PATH_KEYS: &[&str] = &["path", "file_path", "filepath", "target"];
/// Attribute names checked for an explicit working directory.
const CWD_KEYS: &[&str] = &["cwd", "working_directory", "workdir"];

/// Tool names treated as the shell family (run an arbitrary command line).
const SHELL_TOOLS: &[&str] = &["shell", "exec", "bash", "run_command"];
/// Tool names treated as the read family.
const READ_TOOLS: &[&str] = &["read_file", "read", "cat", "list_directory", "glob", "grep"];
/// Tool names treated as the write family.
const WRITE_TOOLS: &[&str] = &["write_file", "write", "edit_file", "edit", "delete_file", "move_file"];

fn extract_str(args: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| args.get(k))
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

impl ToolInvocation {
    /// Classify a raw `(tool_name, arguments)` pair from the agent SDK's
    /// `onPreToolUse` hook.
    pub fn classify(tool_name: &str, args: &Value) -> Self {
        if SHELL_TOOLS.contains(&tool_name) {
            let command = extract_str(args, COMMAND_KEYS).unwrap_or_default();
            let cwd = extract_str(args, CWD_KEYS);
            return Self::Shell { command, cwd };
        }
        if READ_TOOLS.contains(&tool_name) {
            return Self::Read {
                path: extract_str(args, PATH_KEYS),
            };
        }
        if WRITE_TOOLS.contains(&tool_name) {
            return Self::Write {
                path: extract_str(args, PATH_KEYS),
            };
        }
        Self::Other {
            name: tool_name.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_shell_with_cwd() {
        let args = serde_json::json!({ "command": "ls -la", "cwd": "/tmp" });
        let inv = ToolInvocation::classify("shell", &args);
        assert_eq!(
            inv,
            ToolInvocation::Shell {
                command: "ls -la".into(),
                cwd: Some("/tmp".into()),
            }
        );
    }

    #[test]
    fn classifies_read_without_path() {
        let args = serde_json::json!({ "query": "TODO" });
        let inv = ToolInvocation::classify("grep", &args);
        assert_eq!(inv, ToolInvocation::Read { path: None });
    }

    #[test]
    fn classifies_write_with_path() {
        let args = serde_json::json!({ "path": "src/main.rs", "content": "x" });
        let inv = ToolInvocation::classify("write_file", &args);
        assert_eq!(
            inv,
            ToolInvocation::Write {
                path: Some("src/main.rs".into())
            }
        );
    }

    #[test]
    fn unknown_tool_is_other() {
        let inv = ToolInvocation::classify("memory.search", &serde_json::json!({}));
        assert_eq!(
            inv,
            ToolInvocation::Other {
                name: "memory.search".into()
            }
        );
    }
}
