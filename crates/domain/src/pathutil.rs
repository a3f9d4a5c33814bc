//! Path canonicalization and containment shared by the grant store and the
//! policy engine (spec §4.1 "Path containment", §4.2 grant path recording).

use std::path::{Path, PathBuf};

/// Canonicalize `path`. If it (or a suffix of it) does not exist yet,
/// canonicalize the nearest existing ancestor and re-join the missing tail,
/// so a not-yet-created path can't be used to dodge symlink resolution.
pub fn canonicalize_best_effort(path: &Path) -> PathBuf {
    if let Ok(canon) = path.canonicalize() {
        return canon;
    }
    let mut missing = Vec::new();
    let mut cursor = path.to_path_buf();
    loop {
        match cursor.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                missing.push(
                    cursor
                        .file_name()
                        .map(|n| n.to_os_string())
                        .unwrap_or_default(),
                );
                if let Ok(canon) = parent.canonicalize() {
                    missing.reverse();
                    let mut result = canon;
                    for part in missing {
                        result.push(part);
                    }
                    return result;
                }
                cursor = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// `target` is inside `root` iff the canonicalized target equals the
/// canonicalized root or begins with root + path separator.
pub fn is_inside(root: &Path, target: &Path) -> bool {
    let root = canonicalize_best_effort(root);
    let target = canonicalize_best_effort(target);
    target == root || target.starts_with(&root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_path_resolves_against_existing_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let canon_root = dir.path().canonicalize().unwrap();
        let target = canon_root.join("not-yet-created").join("file.txt");
        let resolved = canonicalize_best_effort(&target);
        assert_eq!(resolved, canon_root.join("not-yet-created").join("file.txt"));
    }

    #[test]
    fn detects_containment() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let inside = root.join("src").join("main.rs");
        assert!(is_inside(root, &inside));
        assert!(!is_inside(root, Path::new("/etc/passwd")));
    }

    #[test]
    fn equal_paths_are_inside() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_inside(dir.path(), dir.path()));
    }
}
