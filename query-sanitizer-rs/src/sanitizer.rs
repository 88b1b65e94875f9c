// query-sanitizer-rs/src/sanitizer.rs
// Ordered rule engine for defensive sanitization of raw query text

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use shared_types_rs::{AuditSink, NoopAuditSink, SecurityEvent, ThreatLevel};

use crate::parameterized::{bind_parameters, ParameterizedQuery};
use crate::rules::{default_rules, RuleAction, SanitizationRule};
use crate::types::{QueryError, QueryValue, SanitizationAction, SanitizedQuery, SecurityWarning};

pub struct QuerySanitizer {
    rules: Vec<SanitizationRule>,
    audit: Arc<dyn AuditSink>,
}

impl QuerySanitizer {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(mut rules: Vec<SanitizationRule>) -> Self {
        // stable: equal priorities keep registration order
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            rules,
            audit: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn add_rule(&mut self, rule: SanitizationRule) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn rules(&self) -> &[SanitizationRule] {
        &self.rules
    }

    /// Apply every rule in priority order to untrusted query text.
    ///
    /// Prefer [`QuerySanitizer::create_parameterized`]; this is the fallback
    /// for text that can only arrive as a whole query.
    pub fn sanitize(&self, raw: &str) -> SanitizedQuery {
        let mut query = raw.to_string();
        let mut offsets = OffsetMap::identity(raw.len());
        let mut actions = Vec::new();
        let mut warnings = Vec::new();
        let mut is_blocked = false;

        for rule in &self.rules {
            let ranges = rule.find(&query);
            if ranges.is_empty() {
                continue;
            }

            match rule.action {
                RuleAction::Remove => {
                    query = apply_edits(&query, &mut offsets, &ranges, "", rule, &mut actions);
                }
                RuleAction::Replace(replacement) => {
                    query =
                        apply_edits(&query, &mut offsets, &ranges, replacement, rule, &mut actions);
                }
                RuleAction::Block => {
                    is_blocked = true;
                    warnings.extend(warnings_for(
                        rule,
                        ThreatLevel::Critical,
                        &query,
                        &ranges,
                        &offsets,
                    ));
                }
                RuleAction::Warn(severity) => {
                    warnings.extend(warnings_for(rule, severity, &query, &ranges, &offsets));
                }
            }
        }

        let sanitized = SanitizedQuery {
            original: raw.to_string(),
            query,
            was_modified: !actions.is_empty(),
            actions,
            warnings,
            is_blocked,
        };

        if sanitized.was_modified || !sanitized.warnings.is_empty() {
            log::warn!(
                "Sanitized query: {} action(s), {} warning(s), blocked={}",
                sanitized.actions.len(),
                sanitized.warnings.len(),
                sanitized.is_blocked
            );
            self.emit(&sanitized);
        }

        sanitized
    }

    /// Warnings from the non-editing rules only
    pub fn warnings_for_template(&self, template: &str) -> Vec<SecurityWarning> {
        let offsets = OffsetMap::identity(template.len());
        self.rules
            .iter()
            .filter(|rule| rule.is_warning())
            .flat_map(|rule| match rule.action {
                RuleAction::Warn(severity) => {
                    warnings_for(rule, severity, template, &rule.find(template), &offsets)
                }
                _ => Vec::new(),
            })
            .collect()
    }

    /// Bind `parameters` to the `@name` placeholders of a trusted template.
    ///
    /// The template is never rewritten, and values never pass through the
    /// sanitization rules: they travel to the executor as a separate channel.
    /// Templates that call engine-escape primitives are refused.
    pub fn create_parameterized(
        &self,
        template: &str,
        parameters: HashMap<String, QueryValue>,
    ) -> Result<ParameterizedQuery, QueryError> {
        if let Some(rule) = self
            .rules
            .iter()
            .find(|rule| rule.action == RuleAction::Block && !rule.find(template).is_empty())
        {
            return Err(QueryError::ForbiddenConstruct(rule.name.to_string()));
        }

        let warnings = self.warnings_for_template(template);
        bind_parameters(template, parameters, warnings)
    }

    fn emit(&self, sanitized: &SanitizedQuery) {
        let rules: Vec<&str> = sanitized
            .actions
            .iter()
            .map(|action| action.rule.as_str())
            .chain(sanitized.warnings.iter().map(|warning| warning.rule.as_str()))
            .collect();
        self.audit.emit(
            SecurityEvent::new("query.sanitized")
                .with("rules", rules)
                .with("action_count", sanitized.actions.len())
                .with("warning_count", sanitized.warnings.len())
                .with("blocked", sanitized.is_blocked)
                .with("query_length", sanitized.original.len()),
        );
    }
}

impl Default for QuerySanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps each byte offset of the working text (plus one past the end) to
/// its offset in the raw input. Replacement bytes map to the start of the
/// text they replaced.
struct OffsetMap(Vec<usize>);

impl OffsetMap {
    fn identity(len: usize) -> Self {
        Self((0..=len).collect())
    }

    fn original(&self, position: usize) -> usize {
        self.0
            .get(position)
            .or_else(|| self.0.last())
            .copied()
            .unwrap_or(position)
    }
}

fn apply_edits(
    text: &str,
    offsets: &mut OffsetMap,
    ranges: &[Range<usize>],
    replacement: &str,
    rule: &SanitizationRule,
    actions: &mut Vec<SanitizationAction>,
) -> String {
    let mut output = String::with_capacity(text.len());
    let mut mapped = Vec::with_capacity(offsets.0.len());
    let mut cursor = 0;
    for range in ranges {
        if range.start < cursor {
            continue;
        }
        let origin = offsets.original(range.start);
        output.push_str(&text[cursor..range.start]);
        mapped.extend_from_slice(&offsets.0[cursor..range.start]);
        output.push_str(replacement);
        mapped.extend(std::iter::repeat(origin).take(replacement.len()));
        actions.push(SanitizationAction {
            rule: rule.name.to_string(),
            position: origin,
            original: text[range.clone()].to_string(),
            replacement: replacement.to_string(),
            reason: rule.reason.to_string(),
        });
        cursor = range.end;
    }
    output.push_str(&text[cursor..]);
    mapped.extend_from_slice(&offsets.0[cursor..]);
    offsets.0 = mapped;
    output
}

fn warnings_for(
    rule: &SanitizationRule,
    severity: ThreatLevel,
    text: &str,
    ranges: &[Range<usize>],
    offsets: &OffsetMap,
) -> Vec<SecurityWarning> {
    ranges
        .iter()
        .map(|range| SecurityWarning {
            rule: rule.name.to_string(),
            severity,
            message: format!("{}: '{}'", rule.reason, text[range.clone()].trim()),
            position: offsets.original(range.start),
        })
        .collect()
}
