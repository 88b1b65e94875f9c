//! Sanitization rules
//!
//! Each rule pairs a finder (which byte ranges it applies to) with a
//! [`RuleAction`]. The sanitizer applies rules in descending priority;
//! rules of equal priority keep their registration order.

use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;
use shared_types_rs::ThreatLevel;

use crate::lexer::{mask_literals, tokenize, LiteralMode, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Delete the matched text
    Remove,
    /// Replace the matched text with a fixed string
    Replace(&'static str),
    /// Mark the whole query as not executable
    Block,
    /// Report without altering the query
    Warn(ThreatLevel),
}

/// Finds the ranges a rule applies to in the current text
pub type RuleFinder = fn(&str) -> Vec<Range<usize>>;

#[derive(Clone)]
pub struct SanitizationRule {
    pub name: &'static str,
    pub priority: u8,
    pub action: RuleAction,
    pub reason: &'static str,
    pub finder: RuleFinder,
}

impl SanitizationRule {
    pub fn find(&self, text: &str) -> Vec<Range<usize>> {
        (self.finder)(text)
    }

    /// Warning rules never edit text and are safe to run on templates.
    pub fn is_warning(&self) -> bool {
        matches!(self.action, RuleAction::Warn(_))
    }
}

impl std::fmt::Debug for SanitizationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SanitizationRule")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("action", &self.action)
            .finish()
    }
}

lazy_static! {
    static ref ESCAPE_PRIMITIVES: Regex = Regex::new(
        r"(?i)\b(?:xp_cmdshell|sp_executesql|sp_oacreate|load_file|into\s+(?:out|dump)file|apoc\.cypher\.run|apoc\.load)\b"
    )
    .unwrap();
    static ref DESTRUCTIVE_KEYWORDS: Regex =
        Regex::new(r"(?i)\b(?:drop|delete|truncate|alter|detach\s+delete)\b").unwrap();
    static ref UNION_SELECT: Regex = Regex::new(r"(?i)\bunion\b(?:\s+all)?\s+select\b").unwrap();
    static ref COMPARISON: Regex = Regex::new(r"(?i)\b(?:or|and)\s+(\S+?)\s*=\s*(\S+)").unwrap();
    static ref OR_TRUE: Regex = Regex::new(r"(?i)\bor\s+true\b").unwrap();
}

/// The built-in rule set, unsorted
pub fn default_rules() -> Vec<SanitizationRule> {
    vec![
        SanitizationRule {
            name: "strip_line_comments",
            priority: 100,
            action: RuleAction::Remove,
            reason: "Line comment can truncate the remainder of a query",
            finder: find_line_comments,
        },
        SanitizationRule {
            name: "strip_block_comments",
            priority: 95,
            action: RuleAction::Remove,
            reason: "Block comment can hide query fragments",
            finder: find_block_comments,
        },
        SanitizationRule {
            name: "escape_quotes",
            priority: 90,
            action: RuleAction::Replace("''"),
            reason: "Backslash-escaped quote normalized to a doubled quote",
            finder: find_backslash_quotes,
        },
        SanitizationRule {
            name: "remove_statement_separators",
            priority: 80,
            action: RuleAction::Remove,
            reason: "Statement separator allows stacked queries",
            finder: find_statement_separators,
        },
        SanitizationRule {
            name: "block_escape_primitives",
            priority: 70,
            action: RuleAction::Block,
            reason: "Query calls a primitive that escapes the query engine",
            finder: find_escape_primitives,
        },
        SanitizationRule {
            name: "destructive_keyword",
            priority: 50,
            action: RuleAction::Warn(ThreatLevel::Critical),
            reason: "Destructive keyword in query",
            finder: find_destructive_keywords,
        },
        SanitizationRule {
            name: "union_select",
            priority: 50,
            action: RuleAction::Warn(ThreatLevel::Critical),
            reason: "UNION SELECT can exfiltrate unrelated data",
            finder: find_union_select,
        },
        SanitizationRule {
            name: "always_true_predicate",
            priority: 50,
            action: RuleAction::Warn(ThreatLevel::Critical),
            reason: "Always-true predicate bypasses filtering",
            finder: find_always_true,
        },
    ]
}

fn token_ranges(text: &str, mode: LiteralMode, pred: impl Fn(TokenKind, &str) -> bool) -> Vec<Range<usize>> {
    tokenize(text, mode)
        .into_iter()
        .filter(|token| pred(token.kind, token.text(text)))
        .map(|token| token.range())
        .collect()
}

fn regex_ranges(re: &Regex, text: &str) -> Vec<Range<usize>> {
    re.find_iter(text).map(|m| m.range()).collect()
}

/// `--` to end of line outside closed literals. An unterminated quote does
/// not protect what follows it.
pub fn find_line_comments(text: &str) -> Vec<Range<usize>> {
    token_ranges(text, LiteralMode::ClosedOnly, |kind, _| kind == TokenKind::LineComment)
}

/// `/* ... */` outside closed literals; an unclosed comment runs to the end.
pub fn find_block_comments(text: &str) -> Vec<Range<usize>> {
    token_ranges(text, LiteralMode::ClosedOnly, |kind, _| {
        matches!(kind, TokenKind::BlockComment { .. })
    })
}

pub fn find_backslash_quotes(text: &str) -> Vec<Range<usize>> {
    text.match_indices("\\'")
        .map(|(start, matched)| start..start + matched.len())
        .collect()
}

/// `;` outside literals. An unterminated literal runs to the end of the
/// input, so separators after a stray quote are treated as literal text.
pub fn find_statement_separators(text: &str) -> Vec<Range<usize>> {
    token_ranges(text, LiteralMode::ToEndOfInput, |kind, token| {
        kind == TokenKind::Punct && token == ";"
    })
}

pub fn find_escape_primitives(text: &str) -> Vec<Range<usize>> {
    regex_ranges(&ESCAPE_PRIMITIVES, &mask_literals(text, LiteralMode::ClosedOnly))
}

pub fn find_destructive_keywords(text: &str) -> Vec<Range<usize>> {
    regex_ranges(&DESTRUCTIVE_KEYWORDS, &mask_literals(text, LiteralMode::ClosedOnly))
}

pub fn find_union_select(text: &str) -> Vec<Range<usize>> {
    regex_ranges(&UNION_SELECT, &mask_literals(text, LiteralMode::ClosedOnly))
}

fn strip_operand(operand: &str) -> &str {
    operand.trim_matches(|c| matches!(c, '\'' | '"' | '(' | ')' | ';' | ','))
}

/// `OR 1=1`, `' OR 'a'='a`, `AND x = x` and `OR TRUE`. Runs on the raw text
/// because the classic payload spreads its operands across quote boundaries.
pub fn find_always_true(text: &str) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = COMPARISON
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let left = strip_operand(caps.get(1)?.as_str());
            let right = strip_operand(caps.get(2)?.as_str());
            (!left.is_empty() && left.eq_ignore_ascii_case(right)).then(|| whole.range())
        })
        .collect();
    ranges.extend(regex_ranges(&OR_TRUE, text));
    ranges.sort_by_key(|range| range.start);
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn texts<'a>(text: &'a str, ranges: &[Range<usize>]) -> Vec<&'a str> {
        ranges.iter().map(|r| &text[r.clone()]).collect()
    }

    #[test]
    fn test_line_comments_respect_closed_literals() {
        let q = "SELECT '--not a comment' FROM t -- real";
        assert_eq!(texts(q, &find_line_comments(q)), vec!["-- real"]);

        let stray = "name = 'x' OR '' -- tail";
        assert_eq!(texts(stray, &find_line_comments(stray)), vec!["-- tail"]);
    }

    #[test]
    fn test_separators_inside_unterminated_literal_are_kept() {
        let q = "SELECT 1; SELECT 'a;b'";
        assert_eq!(find_statement_separators(q), vec![8..9]);
        assert!(find_statement_separators("'; DROP TABLE users; ").is_empty());
    }

    #[test_case("SELECT * FROM t WHERE a = 1 OR 1=1" ; "numeric")]
    #[test_case("WHERE user = 'admin' OR 'a'='a'" ; "quoted")]
    #[test_case("admin' OR '1'='1" ; "classic payload")]
    #[test_case("WHERE x = 1 AND id = id" ; "self comparison")]
    #[test_case("WHERE deleted = false OR TRUE" ; "or true")]
    fn test_always_true(q: &str) {
        assert!(!find_always_true(q).is_empty());
    }

    #[test_case("WHERE a = 1 AND b = 2" ; "distinct operands")]
    #[test_case("WHERE name = 'Oregon'" ; "or inside word")]
    fn test_not_always_true(q: &str) {
        assert!(find_always_true(q).is_empty());
    }

    #[test]
    fn test_keywords_inside_literals_are_ignored() {
        assert!(find_destructive_keywords("SELECT * FROM t WHERE note = 'drop by later'").is_empty());
        assert_eq!(find_destructive_keywords("DROP TABLE t").len(), 1);
        assert_eq!(find_union_select("1 UNION ALL SELECT 2").len(), 1);
        assert_eq!(find_escape_primitives("EXEC xp_cmdshell 'dir'").len(), 1);
    }
}
