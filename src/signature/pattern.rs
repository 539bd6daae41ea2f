//! Single-pattern byte matcher.
//!
//! Patterns are matched with a streaming, single-restart-point scan rather
//! than a general backtracking search. Existing signature databases are
//! tuned against exactly this behavior, including its quirks:
//!
//! - a wildcard in the first position of a (sub-)pattern never matches;
//! - after a mismatch the scan resumes one byte past the start of the
//!   current partial match, not at every intermediate position;
//! - `and` rescans forward for the next literal only, so a wildcard right
//!   after `and` can never be satisfied.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One element of a signature pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Matcher {
    /// Literal byte
    Byte(u8),
    /// Matches any byte
    Any,
    /// Starts a fresh sub-search at the next element
    And,
    /// Terminates the pattern
    End,
}

impl Matcher {
    fn is_literal(self, byte: u8) -> bool {
        self == Matcher::Byte(byte)
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Byte(b) => write!(f, "{b:02X}"),
            Matcher::Any => f.write_str("??"),
            Matcher::And => f.write_str("AND"),
            Matcher::End => f.write_str("END"),
        }
    }
}

/// An ordered list of matchers, terminated by [`Matcher::End`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignaturePattern {
    matchers: Vec<Matcher>,
}

impl SignaturePattern {
    /// Build a pattern, appending the terminating `End` if it is missing.
    pub fn new(mut matchers: Vec<Matcher>) -> Self {
        if matchers.last() != Some(&Matcher::End) {
            matchers.push(Matcher::End);
        }
        Self { matchers }
    }

    /// Pattern elements including the trailing `End`.
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Whether the pattern occurs in `buffer`.
    pub fn matches(&self, buffer: &[u8]) -> bool {
        let pattern = &self.matchers;
        let at = |d: usize| pattern.get(d).copied().unwrap_or(Matcher::End);

        let mut c = 0usize;
        let mut d = 0usize;
        let mut rc = 0usize;
        let mut rd = 0usize;

        while c < buffer.len() {
            if d == rd {
                if at(d).is_literal(buffer[c]) {
                    rc = c + 1;
                    d += 1;
                }
                c += 1;
                continue;
            }

            match at(d) {
                Matcher::End => return true,
                Matcher::And => {
                    d += 1;
                    while c < buffer.len() && !at(d).is_literal(buffer[c]) {
                        c += 1;
                    }
                    if c >= buffer.len() {
                        return false;
                    }
                    rc = c + 1;
                    rd = d;
                    c += 1;
                    d += 1;
                }
                Matcher::Any => {
                    c += 1;
                    d += 1;
                }
                Matcher::Byte(b) if b == buffer[c] => {
                    c += 1;
                    d += 1;
                }
                Matcher::Byte(_) => {
                    c = rc;
                    d = rd;
                }
            }
        }

        at(d) == Matcher::End
    }
}

impl fmt::Display for SignaturePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.matchers.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Matcher::{And, Any, Byte, End};

    fn pattern(m: &[Matcher]) -> SignaturePattern {
        SignaturePattern::new(m.to_vec())
    }

    #[test]
    fn test_exact_match() {
        let p = pattern(&[Byte(0x78), Byte(0xA9), Byte(0x00), End]);
        assert!(p.matches(&[0x01, 0x78, 0xA9, 0x00, 0x02]));
        assert!(!p.matches(&[0x78, 0xA9, 0x01]));
    }

    #[test]
    fn test_match_at_buffer_end() {
        let p = pattern(&[Byte(0x78), Byte(0xA9), Byte(0x00), End]);
        assert!(p.matches(&[0x01, 0x78, 0xA9, 0x00]));
    }

    #[test]
    fn test_wildcard_mid_pattern() {
        let p = pattern(&[Byte(0xA9), Any, Byte(0x8D), End]);
        assert!(p.matches(&[0xA9, 0x42, 0x8D]));
        assert!(p.matches(&[0xA9, 0x8D, 0x8D]));
        assert!(!p.matches(&[0xA9, 0x42, 0x8E]));
    }

    #[test]
    fn test_leading_wildcard_never_matches() {
        let p = pattern(&[Any, Byte(0x8D), End]);
        assert!(!p.matches(&[0x01, 0x8D, 0x02, 0x8D]));
    }

    #[test]
    fn test_restart_after_partial_match() {
        let p = pattern(&[Byte(0x01), Byte(0x02), Byte(0x03), End]);
        assert!(p.matches(&[0x01, 0x02, 0x01, 0x02, 0x03]));
        assert!(p.matches(&[0x01, 0x01, 0x02, 0x03]));
    }

    #[test]
    fn test_and_requires_order() {
        let p = pattern(&[Byte(0xAA), Byte(0xBB), And, Byte(0xCC), Byte(0xDD), End]);
        assert!(p.matches(&[0xAA, 0xBB, 0x00, 0x00, 0xCC, 0xDD]));
        assert!(p.matches(&[0xAA, 0xBB, 0xCC, 0xDD]));
        assert!(!p.matches(&[0xCC, 0xDD, 0x00, 0xAA, 0xBB]));
        assert!(!p.matches(&[0xAA, 0xBB, 0x00]));
    }

    #[test]
    fn test_and_second_half_restarts_locally() {
        let p = pattern(&[Byte(0xAA), And, Byte(0xCC), Byte(0xDD), End]);
        assert!(p.matches(&[0xAA, 0xCC, 0x00, 0xCC, 0xDD]));
        assert!(!p.matches(&[0xAA, 0xCC, 0x00, 0xDD]));
    }

    #[test]
    fn test_wildcard_after_and_cannot_match() {
        let p = pattern(&[Byte(0xAA), And, Any, Byte(0xDD), End]);
        assert!(!p.matches(&[0xAA, 0x00, 0xDD]));
    }

    #[test]
    fn test_missing_end_is_appended() {
        let p = pattern(&[Byte(0x10)]);
        assert_eq!(p.matchers().last(), Some(&End));
        assert!(p.matches(&[0x10]));
    }

    #[test]
    fn test_matcher_is_pure() {
        let p = pattern(&[Byte(0x20), Any, Byte(0x10), End]);
        let buffer = [0x20, 0x00, 0x10, 0x20, 0x00];
        let first = p.matches(&buffer);
        for _ in 0..10 {
            assert_eq!(p.matches(&buffer), first);
        }
    }

    #[test]
    fn test_display() {
        let p = pattern(&[Byte(0x78), Any, And, Byte(0x0F), End]);
        assert_eq!(p.to_string(), "78 ?? AND 0F END");
    }
}
