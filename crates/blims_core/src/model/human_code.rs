//! Sequential human-readable sample codes (`s1`, `s2`, ...).
//!
//! # Responsibility
//! - Hand out short display codes distinct from the stable `SampleId`.
//! - Parse codes back into prefix + sequence number.
//!
//! # Invariants
//! - The counter is owned by one store instance; there is no process-wide
//!   shared state.
//! - `next_code()` never yields the same number twice unless `reset` is
//!   called explicitly.
//! - Numbering never wraps: once the counter reaches `u64::MAX` it is
//!   exhausted and `next_code()` returns `None`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Default prefix used for generated codes.
pub const DEFAULT_HUMAN_CODE_PREFIX: &str = "s";

static HUMAN_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+)(\d+)$").expect("valid human code regex"));

/// Monotonic generator for human-readable sample codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanCodeCounter {
    prefix: String,
    next: u64,
}

impl HumanCodeCounter {
    /// Creates a counter starting at `{prefix}1`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number the next generated code will carry.
    pub fn peek_number(&self) -> u64 {
        self.next
    }

    /// Returns the next code and advances the counter.
    ///
    /// Returns `None` when the counter is exhausted.
    pub fn next_code(&mut self) -> Option<String> {
        let number = self.next;
        self.next = number.checked_add(1)?;
        Some(format!("{}{}", self.prefix, number))
    }

    pub fn is_exhausted(&self) -> bool {
        self.next == u64::MAX
    }

    /// Restarts numbering right after `floor`.
    ///
    /// `reset(0)` makes the next code `{prefix}1`.
    pub fn reset(&mut self, floor: u64) {
        self.next = floor.saturating_add(1);
    }

    /// Moves the counter past `number` if it is not already beyond it.
    pub fn observe(&mut self, number: u64) {
        if number >= self.next {
            self.next = number.saturating_add(1);
        }
    }

    /// Returns the sequence number of `code` when it uses this counter's prefix.
    pub fn number_of(&self, code: &str) -> Option<u64> {
        parse_human_code(code)
            .filter(|(prefix, _)| *prefix == self.prefix)
            .map(|(_, number)| number)
    }
}

impl Default for HumanCodeCounter {
    fn default() -> Self {
        Self::new(DEFAULT_HUMAN_CODE_PREFIX)
    }
}

/// Splits a code such as `s42` into (`"s"`, `42`).
///
/// Returns `None` for anything that is not letters followed by digits.
pub fn parse_human_code(code: &str) -> Option<(&str, u64)> {
    let captures = HUMAN_CODE_RE.captures(code.trim())?;
    let prefix = captures.get(1)?.as_str();
    let number = captures.get(2)?.as_str().parse::<u64>().ok()?;
    Some((prefix, number))
}

#[cfg(test)]
mod tests {
    use super::{parse_human_code, HumanCodeCounter};

    #[test]
    fn counter_generates_sequential_codes() {
        let mut counter = HumanCodeCounter::default();
        assert_eq!(counter.next_code().as_deref(), Some("s1"));
        assert_eq!(counter.next_code().as_deref(), Some("s2"));
        assert_eq!(counter.peek_number(), 3);
    }

    #[test]
    fn reset_restarts_after_floor() {
        let mut counter = HumanCodeCounter::new("box");
        counter.reset(41);
        assert_eq!(counter.next_code().as_deref(), Some("box42"));
    }

    #[test]
    fn counter_at_top_of_range_is_exhausted_instead_of_wrapping() {
        let mut counter = HumanCodeCounter::default();
        counter.reset(u64::MAX - 2);
        assert_eq!(
            counter.next_code(),
            Some(format!("s{}", u64::MAX - 1))
        );
        assert!(counter.is_exhausted());
        assert_eq!(counter.next_code(), None);
        assert_eq!(counter.peek_number(), u64::MAX);

        let mut observed = HumanCodeCounter::default();
        observed.observe(u64::MAX);
        assert_eq!(observed.next_code(), None);
    }

    #[test]
    fn observe_only_moves_forward() {
        let mut counter = HumanCodeCounter::default();
        counter.observe(10);
        assert_eq!(counter.peek_number(), 11);
        counter.observe(3);
        assert_eq!(counter.peek_number(), 11);
    }

    #[test]
    fn parse_human_code_splits_prefix_and_number() {
        assert_eq!(parse_human_code("s12"), Some(("s", 12)));
        assert_eq!(parse_human_code(" rack7 "), Some(("rack", 7)));
        assert_eq!(parse_human_code("12"), None);
        assert_eq!(parse_human_code("s-1"), None);
        assert_eq!(parse_human_code(""), None);
    }

    #[test]
    fn number_of_ignores_foreign_prefix() {
        let counter = HumanCodeCounter::default();
        assert_eq!(counter.number_of("s5"), Some(5));
        assert_eq!(counter.number_of("box5"), None);
    }
}
