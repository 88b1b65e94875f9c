//! # Query Sanitizer
//!
//! Three ways of handling query text on its way to the knowledge-graph
//! engine, in order of preference:
//!
//! 1. [`QuerySanitizer::create_parameterized`] binds typed values to the
//!    `@name` placeholders of a trusted template. Values and template stay
//!    separate all the way to the [`QueryExecutor`].
//! 2. [`QuerySanitizer::sanitize`] runs an ordered rule list over raw text,
//!    recording every edit and flagging dangerous constructs.
//! 3. [`validate_structure`] reports syntax errors and estimates complexity
//!    against configurable limits.

pub mod lexer;
pub mod parameterized;
pub mod rules;
pub mod sanitizer;
pub mod structure;
pub mod types;

pub use parameterized::{ParameterizedQuery, QueryExecutor};
pub use rules::{default_rules, RuleAction, SanitizationRule};
pub use sanitizer::QuerySanitizer;
pub use structure::{
    validate_structure, ComplexityLimits, QueryComplexity, QuerySyntaxError, QueryValidationResult,
};
pub use types::{
    QueryError, QueryResult, QueryValue, SanitizationAction, SanitizedQuery, SecurityWarning,
};
