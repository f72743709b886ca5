//! Search-pattern matching for `enumerate_files`.
//!
//! | token | matches                              |
//! |-------|--------------------------------------|
//! | `*`   | any run of characters except `/`     |
//! | `**`  | any run of characters, `/` included  |
//! | `?`   | exactly one character other than `/` |
//!
//! Everything else is literal and case-sensitive.  A pattern without a `/`
//! is tested against the file-name component only; a pattern with one is
//! tested against the whole logical path.
//!
//! Compiled patterns are memoized process-wide.  Patterns are immutable
//! strings, so entries are never invalidated.

use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::error::{ContentError, Result};
use crate::path::file_name;

static PATTERN_CACHE: OnceLock<RwLock<HashMap<String, Arc<Regex>>>> = OnceLock::new();

fn cache() -> &'static RwLock<HashMap<String, Arc<Regex>>> {
    PATTERN_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out.push('$');
    out
}

/// A compiled search pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex:     Arc<Regex>,
    full_path: bool,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = if pattern.is_empty() { "*" } else { pattern };
        let full_path = pattern.contains('/');

        if let Some(regex) = cache().read().get(pattern) {
            return Ok(Self { regex: Arc::clone(regex), full_path });
        }

        let regex = Regex::new(&glob_to_regex(pattern)).map_err(|e| {
            ContentError::InvalidPattern { pattern: pattern.to_owned(), reason: e.to_string() }
        })?;
        let regex = Arc::clone(
            cache()
                .write()
                .entry(pattern.to_owned())
                .or_insert_with(|| Arc::new(regex)),
        );
        Ok(Self { regex, full_path })
    }

    /// Test a normalized logical path.
    pub fn matches(&self, path: &str) -> bool {
        if self.full_path {
            self.regex.is_match(path)
        } else {
            self.regex.is_match(file_name(path))
        }
    }
}

/// The `recursive` filter shared by every content source: non-recursive
/// enumeration keeps only top-level entries.
pub fn within_depth(path: &str, recursive: bool) -> bool {
    recursive || !path.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_file_name_only() {
        let p = Pattern::new("*.json").unwrap();
        assert!(p.matches("mod.json"));
        assert!(p.matches("data/maps/route1.json"));
        assert!(!p.matches("data/maps/route1.json.bak"));
        assert!(!p.matches("textures/a.png"));
    }

    #[test]
    fn question_mark_is_single_char() {
        let p = Pattern::new("tile?.png").unwrap();
        assert!(p.matches("gfx/tile1.png"));
        assert!(!p.matches("gfx/tile10.png"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let p = Pattern::new("a+b(1).txt").unwrap();
        assert!(p.matches("a+b(1).txt"));
        assert!(!p.matches("aab1.txt"));
    }

    #[test]
    fn separator_patterns_match_whole_path() {
        let single = Pattern::new("data/*.json").unwrap();
        assert!(single.matches("data/a.json"));
        assert!(!single.matches("data/maps/a.json"));
        assert!(!single.matches("a.json"));

        let deep = Pattern::new("data/**.json").unwrap();
        assert!(deep.matches("data/maps/a.json"));
    }

    #[test]
    fn empty_pattern_matches_everything() {
        assert!(Pattern::new("").unwrap().matches("any/thing.bin"));
    }

    #[test]
    fn compiled_patterns_are_shared() {
        let a = Pattern::new("*.cached").unwrap();
        let b = Pattern::new("*.cached").unwrap();
        assert!(Arc::ptr_eq(&a.regex, &b.regex));
    }

    #[test]
    fn depth_filter() {
        assert!(within_depth("mod.json", false));
        assert!(!within_depth("data/a.bin", false));
        assert!(within_depth("data/a.bin", true));
    }
}
