// content-scanner-rs/src/engines/mod.rs
// Detection engines and the pattern-table machinery they share

mod injection;
mod malware;
mod phishing;
mod sensitive_data;

pub use injection::InjectionDetector;
pub use malware::MalwareDetector;
pub use phishing::PhishingDetector;
pub use sensitive_data::SensitiveDataDetector;

use input_validation_rs::validators::{find_all_bounded, Deadline};
use regex::Regex;
use shared_types_rs::ThreatLevel;

use crate::types::{DetectedThreat, EngineId, Location, ScanError, ThreatType};

/// A detection engine is a pure function of the content. Engines must check
/// the deadline between patterns and while iterating matches.
pub trait DetectionEngine: Send + Sync {
    fn id(&self) -> EngineId;

    /// Compile whatever the engine builds lazily. Called once when the
    /// engine joins a scanner, outside any scan deadline.
    fn prepare(&self) {}

    fn scan(&self, content: &str, deadline: &Deadline) -> Result<Vec<DetectedThreat>, ScanError>;
}

/// Build the engine for an id
pub fn engine_for(id: EngineId) -> Box<dyn DetectionEngine> {
    match id {
        EngineId::Injection => Box::new(InjectionDetector),
        EngineId::Malware => Box::new(MalwareDetector),
        EngineId::Phishing => Box::new(PhishingDetector),
        EngineId::SensitiveData => Box::new(SensitiveDataDetector),
    }
}

/// A named pattern with fixed severity and confidence.
pub(crate) struct DetectionPattern {
    pub name: &'static str,
    pub regex: Regex,
    pub threat_type: ThreatType,
    pub severity: ThreatLevel,
    pub confidence: f64,
}

type PatternDef = (&'static str, &'static str, ThreatType, ThreatLevel, f64);

/// Compile a static pattern table. Tables are fixed at build time, so a bad
/// entry is a programming error caught by the table tests.
pub(crate) fn compile_detection_patterns(defs: &[PatternDef]) -> Vec<DetectionPattern> {
    defs.iter()
        .map(|&(name, pattern, threat_type, severity, confidence)| DetectionPattern {
            name,
            regex: Regex::new(pattern)
                .unwrap_or_else(|e| panic!("invalid detection pattern '{}': {}", name, e)),
            threat_type,
            severity,
            confidence,
        })
        .collect()
}

pub(crate) fn checkpoint(deadline: &Deadline, engine: EngineId) -> Result<(), ScanError> {
    deadline.check(engine.as_str()).map_err(|_| timeout(deadline, engine))
}

fn timeout(deadline: &Deadline, engine: EngineId) -> ScanError {
    ScanError::Timeout {
        engine: engine.as_str().to_string(),
        budget_ms: deadline.budget().as_millis() as u64,
    }
}

/// Run every pattern of a table over the content.
pub(crate) fn scan_patterns(
    patterns: &[DetectionPattern],
    content: &str,
    deadline: &Deadline,
    engine: EngineId,
) -> Result<Vec<DetectedThreat>, ScanError> {
    let mut threats = Vec::new();
    for pattern in patterns {
        let matches = find_all_bounded(&pattern.regex, content, deadline, engine.as_str())
            .map_err(|_| timeout(deadline, engine))?;
        for m in matches {
            threats.push(threat(
                pattern.threat_type,
                m.start()..m.end(),
                pattern.name,
                pattern.confidence,
                pattern.severity,
                engine,
            ));
        }
    }
    Ok(threats)
}

pub(crate) fn threat(
    threat_type: ThreatType,
    range: std::ops::Range<usize>,
    matched_pattern: &str,
    confidence: f64,
    severity: ThreatLevel,
    engine: EngineId,
) -> DetectedThreat {
    DetectedThreat {
        threat_type,
        location: Location {
            start: range.start,
            end: range.end,
        },
        matched_pattern: matched_pattern.to_string(),
        confidence: confidence.clamp(0.0, 1.0),
        severity,
        recommendation: recommendation_for(threat_type).to_string(),
        engine,
    }
}

pub(crate) fn recommendation_for(threat_type: ThreatType) -> &'static str {
    match threat_type {
        ThreatType::SqlInjection => "Reject the input and bind values as query parameters",
        ThreatType::Xss => "Strip markup and script URIs before storing or rendering",
        ThreatType::LdapInjection => "Escape directory filter metacharacters",
        ThreatType::CommandInjection => "Reject the input; never pass it to a shell",
        ThreatType::CommentInjection => "Remove query comment markers",
        ThreatType::Malware => "Reject the content",
        ThreatType::Obfuscation => "Reject the content or review the decoded payload",
        ThreatType::Phishing => "Flag the content for review",
        ThreatType::SuspiciousLink => "Defang or remove the link",
        ThreatType::CreditCard => "Mask the card number",
        ThreatType::NationalId => "Mask the identifier",
        ThreatType::EmailAddress => "Mask the address if it is not required",
        ThreatType::Credential => "Remove the secret and rotate it",
        ThreatType::ConnectionString => "Remove the connection string and rotate its password",
    }
}
