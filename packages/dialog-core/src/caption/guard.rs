//! Allow/block-list matching for caption text (C11).

use regex::Regex;

/// Compiles a caption's allow/block regex lists and decides whether a given
/// caption is accepted. An allow match always wins over a block match.
pub struct CaptionGuard {
    allow: Vec<Regex>,
    block: Vec<Regex>,
}

impl CaptionGuard {
    /// Compiles the given pattern lists. Callers should validate patterns
    /// ahead of time via [`crate::config::CaptionConfig::validate`]; an
    /// invalid pattern here is simply skipped rather than panicking.
    pub fn new(allow_patterns: &[String], block_patterns: &[String]) -> Self {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect()
        };
        Self {
            allow: compile(allow_patterns),
            block: compile(block_patterns),
        }
    }

    /// Returns `true` if `text` should be accepted: trimmed empty text and
    /// the bare `?`/`？` placeholder some upstreams emit for an unresolved
    /// transcript are always rejected first; otherwise an allow match always
    /// wins, and failing that it's rejected only if a block pattern matches.
    pub fn accepts(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "?" || trimmed == "？" {
            return false;
        }
        if self.allow.iter().any(|r| r.is_match(trimmed)) {
            return true;
        }
        !self.block.iter().any(|r| r.is_match(trimmed))
    }
}

impl Default for CaptionGuard {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patterns_accept_everything() {
        let guard = CaptionGuard::default();
        assert!(guard.accepts("anything at all"));
    }

    #[test]
    fn block_pattern_rejects_match() {
        let guard = CaptionGuard::new(&[], &[r"(?i)profanity".to_string()]);
        assert!(!guard.accepts("some profanity here"));
        assert!(guard.accepts("clean text"));
    }

    #[test]
    fn allow_pattern_overrides_block_match() {
        let guard = CaptionGuard::new(
            &[r"^allowed:".to_string()],
            &[r".*".to_string()],
        );
        assert!(guard.accepts("allowed: this passes"));
        assert!(!guard.accepts("anything else"));
    }

    #[test]
    fn empty_or_placeholder_text_is_always_rejected() {
        let guard = CaptionGuard::default();
        assert!(!guard.accepts(""));
        assert!(!guard.accepts("   "));
        assert!(!guard.accepts("?"));
        assert!(!guard.accepts("？"));
    }

    #[test]
    fn placeholder_rejection_is_not_overridden_by_an_allow_match() {
        let guard = CaptionGuard::new(&[r"^\?$".to_string()], &[]);
        assert!(!guard.accepts("?"), "the placeholder check runs before allow-list matching");
    }
}
