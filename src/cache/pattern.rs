//! Key pattern matching for `scan`.
//!
//! Supports `*` (any run of characters) and `?` (exactly one character);
//! everything else matches literally.

use regex::Regex;

use crate::error::{CacheError, Result};

/// Compiles a glob pattern into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');

    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '*' | '?' => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str(if ch == '*' { ".*" } else { "." });
            }
            _ => literal.push(ch),
        }
    }
    source.push_str(&regex::escape(&literal));
    source.push('$');

    Regex::new(&source)
        .map_err(|e| CacheError::InvalidRequest(format!("Invalid scan pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_any_run() {
        let re = glob_to_regex("court:*").unwrap();
        assert!(re.is_match("court:"));
        assert!(re.is_match("court:case:42"));
        assert!(!re.is_match("payments:court:1"));
    }

    #[test]
    fn test_question_matches_single_char() {
        let re = glob_to_regex("user-?").unwrap();
        assert!(re.is_match("user-1"));
        assert!(!re.is_match("user-12"));
        assert!(!re.is_match("user-"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let re = glob_to_regex("a.b+(c)*").unwrap();
        assert!(re.is_match("a.b+(c)xyz"));
        assert!(!re.is_match("axb+(c)"));
    }

    #[test]
    fn test_empty_pattern_matches_only_empty() {
        let re = glob_to_regex("").unwrap();
        assert!(re.is_match(""));
        assert!(!re.is_match("a"));
    }
}
