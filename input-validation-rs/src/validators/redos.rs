//! ReDoS (Regular Expression Denial of Service) protection
//!
//! Every pattern used on untrusted input goes through a size-bounded compile,
//! and every matching loop checks a [`Deadline`] so a stage can never run
//! past its time budget.

use crate::errors::{InputError, InputResult};
use lazy_static::lazy_static;
use regex::{Match, Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Maximum time allowed for regex matching (milliseconds)
pub const DEFAULT_REGEX_TIMEOUT_MS: u64 = 100;

/// Compiled program size limit for untrusted patterns
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Lazy DFA cache budget for untrusted patterns
const DFA_SIZE_LIMIT: usize = 2 << 20;

/// How many matches to consume between deadline checks
const MATCH_CHECK_INTERVAL: usize = 16;

/// Upper bound on distinct cached patterns
const MAX_CACHED_PATTERNS: usize = 512;

lazy_static! {
    static ref PATTERN_CACHE: Mutex<HashMap<String, Regex>> = Mutex::new(HashMap::new());
}

/// A point in time after which a stage must give up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::after(Duration::from_millis(ms))
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.budget
    }

    /// Fails with [`InputError::Timeout`] naming `stage` once the budget is spent.
    pub fn check(&self, stage: &str) -> InputResult<()> {
        if self.is_expired() {
            log::warn!(
                "{} exceeded its time budget ({}ms elapsed)",
                stage,
                self.elapsed().as_millis()
            );
            Err(InputError::Timeout {
                stage: stage.to_string(),
                budget_ms: self.budget.as_millis() as u64,
            })
        } else {
            Ok(())
        }
    }
}

/// Compile a pattern with bounded program and DFA sizes
pub fn compile_bounded(pattern: &str) -> InputResult<Regex> {
    RegexBuilder::new(pattern)
        .size_limit(PATTERN_SIZE_LIMIT)
        .dfa_size_limit(DFA_SIZE_LIMIT)
        .build()
        .map_err(|e| InputError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Compile through a shared cache so schema patterns are built once.
pub fn cached_pattern(pattern: &str) -> InputResult<Regex> {
    if let Ok(cache) = PATTERN_CACHE.lock() {
        if let Some(re) = cache.get(pattern) {
            return Ok(re.clone());
        }
    }

    let re = compile_bounded(pattern)?;
    if let Ok(mut cache) = PATTERN_CACHE.lock() {
        if cache.len() >= MAX_CACHED_PATTERNS {
            cache.clear();
        }
        cache.insert(pattern.to_string(), re.clone());
    }
    Ok(re)
}

/// `is_match` that refuses to start once the deadline has passed
pub fn is_match_bounded(
    re: &Regex,
    haystack: &str,
    deadline: &Deadline,
    stage: &str,
) -> InputResult<bool> {
    deadline.check(stage)?;
    let matched = re.is_match(haystack);
    deadline.check(stage)?;
    Ok(matched)
}

/// Collect all matches, checking the deadline periodically while iterating
pub fn find_all_bounded<'h>(
    re: &Regex,
    haystack: &'h str,
    deadline: &Deadline,
    stage: &str,
) -> InputResult<Vec<Match<'h>>> {
    deadline.check(stage)?;
    let mut matches = Vec::new();
    for (idx, m) in re.find_iter(haystack).enumerate() {
        if idx % MATCH_CHECK_INTERVAL == 0 {
            deadline.check(stage)?;
        }
        matches.push(m);
    }
    deadline.check(stage)?;
    Ok(matches)
}

/// Safe pattern match against an untrusted pattern with the default timeout
pub fn safe_pattern_match(input: &str, pattern: &str) -> InputResult<bool> {
    safe_pattern_match_with_timeout(input, pattern, DEFAULT_REGEX_TIMEOUT_MS)
}

/// Safe pattern match with custom timeout
pub fn safe_pattern_match_with_timeout(
    input: &str,
    pattern: &str,
    timeout_ms: u64,
) -> InputResult<bool> {
    let deadline = Deadline::from_millis(timeout_ms);
    let re = cached_pattern(pattern)?;
    is_match_bounded(&re, input, &deadline, "pattern match")
}
