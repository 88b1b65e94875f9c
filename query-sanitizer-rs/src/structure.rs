// query-sanitizer-rs/src/structure.rs
// Structural validation and complexity analysis

use serde::{Deserialize, Serialize};
use shared_types_rs::config::QuerySettings;

use crate::lexer::{tokenize, LiteralMode, Token, TokenKind};

/// Statement keywords accepted at the start of a query
pub const KNOWN_STATEMENTS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "MATCH", "OPTIONAL", "CREATE", "MERGE",
    "RETURN", "UNWIND", "CALL", "EXPLAIN", "PROFILE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityLimits {
    pub max_nesting_depth: usize,
    pub max_joins: usize,
    pub max_cost: u32,
}

impl Default for ComplexityLimits {
    fn default() -> Self {
        Self {
            max_nesting_depth: 5,
            max_joins: 5,
            max_cost: 100,
        }
    }
}

impl From<&QuerySettings> for ComplexityLimits {
    fn from(settings: &QuerySettings) -> Self {
        Self {
            max_nesting_depth: settings.max_nesting_depth,
            max_joins: settings.max_joins,
            max_cost: settings.max_cost,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryComplexity {
    pub nesting_depth: usize,
    pub join_count: usize,
    pub subquery_count: usize,
    pub estimated_cost: u32,
    pub exceeds_limits: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySyntaxError {
    pub message: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryValidationResult {
    pub is_valid: bool,
    pub errors: Vec<QuerySyntaxError>,
    pub complexity: QueryComplexity,
    /// Upper-cased leading keyword, when there is one
    pub statement: Option<String>,
}

// Clause weights for the cost estimate
const BASE_COST: u32 = 1;
const JOIN_COST: u32 = 10;
const SUBQUERY_COST: u32 = 15;
const UNION_COST: u32 = 10;
const GROUP_COST: u32 = 5;
const HAVING_COST: u32 = 5;
const ORDER_COST: u32 = 3;
const DISTINCT_COST: u32 = 3;
const LIKE_COST: u32 = 2;
const NESTING_COST: u32 = 5;

/// Tokenize `query`, report syntax errors and measure its complexity.
pub fn validate_structure(query: &str, limits: &ComplexityLimits) -> QueryValidationResult {
    let tokens: Vec<Token> = tokenize(query, LiteralMode::ToEndOfInput);
    let mut errors = Vec::new();

    let significant: Vec<&Token> = tokens.iter().filter(|token| !token.is_trivia()).collect();

    if significant.is_empty() {
        errors.push(QuerySyntaxError {
            message: "Query is empty".to_string(),
            position: 0,
        });
        return QueryValidationResult {
            is_valid: false,
            errors,
            complexity: QueryComplexity::default(),
            statement: None,
        };
    }

    for token in &tokens {
        match token.kind {
            TokenKind::StringLiteral { terminated: false } => errors.push(QuerySyntaxError {
                message: "Unterminated string literal".to_string(),
                position: token.start,
            }),
            TokenKind::QuotedIdentifier { terminated: false } => errors.push(QuerySyntaxError {
                message: "Unterminated quoted identifier".to_string(),
                position: token.start,
            }),
            TokenKind::BlockComment { terminated: false } => errors.push(QuerySyntaxError {
                message: "Unterminated block comment".to_string(),
                position: token.start,
            }),
            _ => {}
        }
    }

    let first = significant[0];
    let statement = if first.kind == TokenKind::Word {
        let keyword = first.text(query).to_ascii_uppercase();
        if !KNOWN_STATEMENTS.contains(&keyword.as_str()) {
            errors.push(QuerySyntaxError {
                message: format!("Unknown statement keyword '{}'", first.text(query)),
                position: first.start,
            });
        }
        Some(keyword)
    } else {
        errors.push(QuerySyntaxError {
            message: format!("Query must start with a statement keyword, found '{}'", first.text(query)),
            position: first.start,
        });
        None
    };

    let nesting_depth = check_balance(query, &significant, &mut errors);
    let complexity = measure(query, &significant, nesting_depth, limits);

    QueryValidationResult {
        is_valid: errors.is_empty(),
        errors,
        complexity,
        statement,
    }
}

/// Check `()` and `[]` pairing and return the maximum nesting depth.
fn check_balance(query: &str, tokens: &[&Token], errors: &mut Vec<QuerySyntaxError>) -> usize {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut max_depth = 0;

    for token in tokens.iter().filter(|t| t.kind == TokenKind::Punct) {
        match token.text(query) {
            "(" => stack.push(('(', token.start)),
            "[" => stack.push(('[', token.start)),
            close @ (")" | "]") => {
                let expected = if close == ")" { '(' } else { '[' };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, position)) => {
                        errors.push(QuerySyntaxError {
                            message: format!("'{}' closed by '{}'", open, close),
                            position,
                        });
                    }
                    None => errors.push(QuerySyntaxError {
                        message: format!("Unmatched '{}'", close),
                        position: token.start,
                    }),
                }
            }
            _ => {}
        }
        max_depth = max_depth.max(stack.len());
    }

    for (open, position) in stack {
        errors.push(QuerySyntaxError {
            message: format!("Unclosed '{}'", open),
            position,
        });
    }

    max_depth
}

fn measure(query: &str, tokens: &[&Token], nesting_depth: usize, limits: &ComplexityLimits) -> QueryComplexity {
    let mut join_count = 0;
    let mut subquery_count = 0;
    let mut cost = BASE_COST;

    for (index, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Word {
            continue;
        }
        let word = token.text(query).to_ascii_uppercase();
        let previous = index.checked_sub(1).map(|i| tokens[i].text(query));
        match word.as_str() {
            "JOIN" => {
                join_count += 1;
                cost += JOIN_COST;
            }
            "SELECT" | "MATCH" if previous == Some("(") => {
                subquery_count += 1;
                cost += SUBQUERY_COST;
            }
            "UNION" => cost += UNION_COST,
            "GROUP" => cost += GROUP_COST,
            "HAVING" => cost += HAVING_COST,
            "ORDER" => cost += ORDER_COST,
            "DISTINCT" => cost += DISTINCT_COST,
            "LIKE" => cost += LIKE_COST,
            _ => {}
        }
    }
    cost += NESTING_COST * nesting_depth.saturating_sub(1) as u32;

    QueryComplexity {
        nesting_depth,
        join_count,
        subquery_count,
        estimated_cost: cost,
        exceeds_limits: nesting_depth > limits.max_nesting_depth
            || join_count > limits.max_joins
            || cost > limits.max_cost,
    }
}
