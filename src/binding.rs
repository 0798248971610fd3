//! Binding-name inference
//!
//! Given the text that follows a reference to the target class, guess the name
//! of the variable it is bound to:
//!
//! ```text
//! final Command<void, String> fetchCommand;
//!              ^^^^^^^^^^^^^^^^^^^^^^^^^^^^ window
//! ```
//!
//! The default strategy is a chain of regexes with a documented fallback
//! order. Anything smarter (a real parser) can implement [`BindingInference`].

use crate::Result;
use regex::Regex;

/// "text between `> ` and `;`"
pub const SEMICOLON_PATTERN: &str = r">\s(.*?);";

/// "text between `> ` and ` =`"
pub const ASSIGNMENT_PATTERN: &str = r">\s(.*?)\s=";

/// Strategy that infers a bound variable name from a text window.
pub trait BindingInference: Send + Sync {
    /// Returns `None` when nothing could be extracted
    fn infer(&self, window: &str) -> Option<String>;
}

/// Ordered regex fallback chain.
///
/// Each pattern must have one capture group. The first pattern with any match
/// wins and, within it, the last match is taken.
#[derive(Debug, Clone)]
pub struct RegexChain {
    patterns: Vec<Regex>,
}

impl Default for RegexChain {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexChain {
    /// The semicolon pattern, then the assignment pattern
    pub fn new() -> Self {
        Self {
            patterns: vec![
                Regex::new(SEMICOLON_PATTERN).expect("static binding pattern"),
                Regex::new(ASSIGNMENT_PATTERN).expect("static binding pattern"),
            ],
        }
    }

    /// Build a chain from user-supplied patterns, tried in order
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn last_match(pattern: &Regex, window: &str) -> Option<String> {
        pattern
            .captures_iter(window)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| m.as_str().trim().to_string())
            .last()
            .filter(|name| !name.is_empty())
    }
}

impl BindingInference for RegexChain {
    fn infer(&self, window: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|pattern| Self::last_match(pattern, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semicolon_pattern() {
        let chain = RegexChain::new();
        assert_eq!(chain.infer("> x;").as_deref(), Some("x"));
        assert_eq!(
            chain.infer("<void, String> fetchCommand;").as_deref(),
            Some("fetchCommand")
        );
    }

    #[test]
    fn test_assignment_fallback() {
        let chain = RegexChain::new();
        // No semicolon inside the window
        assert_eq!(chain.infer("> y = Command()").as_deref(), Some("y"));
    }

    #[test]
    fn test_semicolon_pattern_wins_when_reachable() {
        let chain = RegexChain::new();
        assert_eq!(chain.infer("> y = f();").as_deref(), Some("y = f()"));
    }

    #[test]
    fn test_last_match_wins() {
        let chain = RegexChain::new();
        let window = "<Map<String, int>> a; List<int> b;";
        assert_eq!(chain.infer(window).as_deref(), Some("b"));
    }

    #[test]
    fn test_no_match() {
        let chain = RegexChain::new();
        assert_eq!(chain.infer(".execute();"), None);
        assert_eq!(chain.infer(""), None);
        assert_eq!(chain.infer(">  ;"), None);
    }

    #[test]
    fn test_custom_chain() {
        let chain = RegexChain::from_patterns(&[r"\bvar\s+(\w+)"]).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.infer("var loginCommand = x").as_deref(), Some("loginCommand"));
        assert!(RegexChain::from_patterns(&["("]).is_err());
    }
}
