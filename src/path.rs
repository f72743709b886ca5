//! Logical path spelling.
//!
//! Every component addresses content by a *logical* path: forward slashes,
//! no leading slash, no empty or `.` segments.  `"\\textures\\.\\a.png"`,
//! `"/textures//a.png"` and `"textures/a.png"` all name the same entry.

/// Canonical form of `path`.  Purely syntactic: `..` segments are kept as-is.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for segment in path.split(['/', '\\']) {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

/// Canonical form of `path` with `..` folded lexically.
///
/// Returns `None` when the path climbs above its root or carries a drive
/// prefix (`C:`), i.e. whenever joining it onto a root directory could land
/// outside that directory.
pub fn resolve_relative(path: &str) -> Option<String> {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop()?;
            }
            s if s.contains(':') => return None,
            s => stack.push(s),
        }
    }
    Some(stack.join("/"))
}

/// True for anything that names a location independently of a root:
/// a leading separator (including UNC `\\server\share`), or a path the
/// host considers rooted.
pub fn is_rooted(path: &str) -> bool {
    path.starts_with(['/', '\\']) || std::path::Path::new(path).has_root()
}

/// Final component of a logical path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalizes_separators_and_dots() {
        assert_eq!(normalize_path("\\textures\\.\\a.png"), "textures/a.png");
        assert_eq!(normalize_path("//textures//a.png/"), "textures/a.png");
        assert_eq!(normalize_path("mod.json"), "mod.json");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("a/../b"), "a/../b");
    }

    #[test]
    fn resolve_folds_parent_segments() {
        assert_eq!(resolve_relative("a/../b/c").as_deref(), Some("b/c"));
        assert_eq!(resolve_relative("/a/b").as_deref(), Some("a/b"));
        assert_eq!(resolve_relative("../../etc/passwd"), None);
        assert_eq!(resolve_relative("a/../../x"), None);
        assert_eq!(resolve_relative("C:/Windows"), None);
    }

    #[test]
    fn rooted_paths_are_detected() {
        assert!(is_rooted("/etc/passwd"));
        assert!(is_rooted("\\etc\\passwd"));
        assert!(is_rooted("\\\\server\\share\\a.txt"));
        assert!(!is_rooted("data/a.json"));
        assert!(!is_rooted("../a.json"));
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(file_name("data/maps/a.json"), "a.json");
        assert_eq!(file_name("mod.json"), "mod.json");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[a-z./\\\\]{0,24}") {
            let once = normalize_path(&s);
            prop_assert_eq!(normalize_path(&once), once.clone());
            prop_assert!(!once.starts_with('/'));
            prop_assert!(!once.contains('\\'));
        }
    }
}
