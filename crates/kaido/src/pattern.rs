//! Glob-style name patterns.
//!
//! Syntax is globset's: `*`, `?`, `[abc]`, `[a-z]`, `[!x]` / `[^x]`,
//! `{a,b}` alternation and `\` to escape the next character. Patterns match
//! whole names, never paths, so `*` does not cross a `/`.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::{FsError, FsResult};

fn compile(pattern: &str) -> FsResult<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| FsError::invalid_pattern(format!("{pattern}: {e}")))
}

/// Check every pattern for syntax errors without matching anything.
pub fn validate_patterns(patterns: &[&str]) -> FsResult<()> {
    patterns.iter().try_for_each(|pattern| validate_pattern(pattern))
}

/// Check a pattern for syntax errors without matching anything.
pub fn validate_pattern(pattern: &str) -> FsResult<()> {
    compile(pattern).map(drop)
}

/// Match a single name against a single pattern.
pub fn match_pattern(pattern: &str, name: &str) -> FsResult<bool> {
    Ok(compile(pattern)?.is_match(name))
}

/// True if `name` matches any of `patterns`; an empty set matches everything.
pub fn match_any_pattern(name: &str, patterns: &[&str]) -> FsResult<bool> {
    if patterns.is_empty() {
        return Ok(true);
    }
    for pattern in patterns {
        if match_pattern(pattern, name)? {
            return Ok(true);
        }
    }
    Ok(false)
}
