//! Quote-aware shell command splitting and substitution extraction (spec
//! §4.1 "Shell family"). Grounded on the teacher's `tools/src/exec.rs`
//! `sh -c` dispatch convention — the policy engine has to understand the
//! same command lines that crate hands to a real shell.

/// Split `input` into sub-commands on `&&`, `||`, `;`, `|`, and newline,
/// respecting single- and double-quoted runs (separators inside quotes are
/// not split points).
pub fn split_subcommands(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '&' if chars.peek() == Some(&'&') => {
                    chars.next();
                    parts.push(std::mem::take(&mut current));
                }
                '|' if chars.peek() == Some(&'|') => {
                    chars.next();
                    parts.push(std::mem::take(&mut current));
                }
                '|' => parts.push(std::mem::take(&mut current)),
                ';' | '\n' => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// If `command` is a shell invocation of the form `<shell> -c '<inner>'` (or
/// with double quotes, or `-c` as a separate arg followed by a quoted
/// string), return the inner command.
pub fn unwrap_shell_dash_c(command: &str) -> Option<String> {
    const SHELLS: &[&str] = &["sh", "bash", "zsh", "dash", "ksh"];
    let trimmed = command.trim();
    for shell in SHELLS {
        let prefix = format!("{shell} -c ");
        if let Some(rest) = trimmed.strip_prefix(&prefix) {
            return strip_matching_quotes(rest.trim());
        }
        // Allow a path-qualified shell, e.g. /bin/bash -c '...'
        if let Some(idx) = trimmed.find(&format!("/{shell} -c ")) {
            let rest = &trimmed[idx + shell.len() + 4..];
            return strip_matching_quotes(rest.trim());
        }
    }
    None
}

fn strip_matching_quotes(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let first = bytes[0] as char;
    if first != '\'' && first != '"' {
        return None;
    }
    let last_matching = s.rfind(first)?;
    if last_matching == 0 {
        return None;
    }
    Some(s[1..last_matching].to_string())
}

/// Recursively extract the contents of every `$(...)` (arbitrarily nested)
/// and backtick command substitution in `input`.
pub fn command_substitutions(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'(') {
            if let Some((inner, next)) = extract_balanced(&chars, i + 2) {
                out.push(inner.clone());
                out.extend(command_substitutions(&inner));
                i = next;
                continue;
            }
        }
        if chars[i] == '`' {
            if let Some(end) = chars[i + 1..].iter().position(|&c| c == '`') {
                let inner: String = chars[i + 1..i + 1 + end].iter().collect();
                out.push(inner.clone());
                out.extend(command_substitutions(&inner));
                i = i + 1 + end + 1;
                continue;
            }
        }
        i += 1;
    }
    out
}

/// Given `chars[start..]` beginning just after an opening `(`, find the
/// matching close paren (tracking nesting) and return the inner text plus
/// the index just past the close paren.
fn extract_balanced(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut depth = 1;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((chars[start..i].iter().collect(), i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_all_separators() {
        let parts = split_subcommands("echo a && echo b || echo c; echo d | echo e\necho f");
        assert_eq!(parts, vec!["echo a", "echo b", "echo c", "echo d", "echo e", "echo f"]);
    }

    #[test]
    fn keeps_separators_inside_quotes_intact() {
        let parts = split_subcommands("echo 'a && b' && echo c");
        assert_eq!(parts, vec!["echo 'a && b'", "echo c"]);
    }

    #[test]
    fn unwraps_sh_dash_c() {
        let inner = unwrap_shell_dash_c("sh -c 'git push origin main'").unwrap();
        assert_eq!(inner, "git push origin main");
    }

    #[test]
    fn unwraps_path_qualified_shell() {
        let inner = unwrap_shell_dash_c("/bin/bash -c \"git push\"").unwrap();
        assert_eq!(inner, "git push");
    }

    #[test]
    fn non_shell_dash_c_returns_none() {
        assert!(unwrap_shell_dash_c("echo hi").is_none());
    }

    #[test]
    fn extracts_nested_command_substitutions() {
        let subs = command_substitutions("echo $(git log $(git rev-parse HEAD))");
        assert!(subs.contains(&"git log $(git rev-parse HEAD)".to_string()));
        assert!(subs.contains(&"git rev-parse HEAD".to_string()));
    }

    #[test]
    fn extracts_backtick_substitution() {
        let subs = command_substitutions("echo `git branch --show-current`");
        assert_eq!(subs, vec!["git branch --show-current".to_string()]);
    }
}
