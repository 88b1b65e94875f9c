// content-scanner-rs/src/types.rs
// Findings, scan options and the aggregated scan result

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types_rs::config::ScanSettings;
use shared_types_rs::ThreatLevel;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    SqlInjection,
    Xss,
    LdapInjection,
    CommandInjection,
    CommentInjection,
    Malware,
    Obfuscation,
    Phishing,
    SuspiciousLink,
    CreditCard,
    NationalId,
    EmailAddress,
    Credential,
    ConnectionString,
}

impl ThreatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::SqlInjection => "sql_injection",
            ThreatType::Xss => "xss",
            ThreatType::LdapInjection => "ldap_injection",
            ThreatType::CommandInjection => "command_injection",
            ThreatType::CommentInjection => "comment_injection",
            ThreatType::Malware => "malware",
            ThreatType::Obfuscation => "obfuscation",
            ThreatType::Phishing => "phishing",
            ThreatType::SuspiciousLink => "suspicious_link",
            ThreatType::CreditCard => "credit_card",
            ThreatType::NationalId => "national_id",
            ThreatType::EmailAddress => "email_address",
            ThreatType::Credential => "credential",
            ThreatType::ConnectionString => "connection_string",
        }
    }

    /// Findings that can be neutralized in place (markup stripped, comment
    /// markers removed, values masked, links defanged) rather than rejected.
    pub fn is_remediable(&self) -> bool {
        matches!(
            self,
            ThreatType::Xss
                | ThreatType::CommentInjection
                | ThreatType::SuspiciousLink
                | ThreatType::CreditCard
                | ThreatType::NationalId
                | ThreatType::EmailAddress
                | ThreatType::Credential
                | ThreatType::ConnectionString
        )
    }
}

impl fmt::Display for ThreatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineId {
    Injection,
    Malware,
    Phishing,
    SensitiveData,
}

impl EngineId {
    pub const ALL: [EngineId; 4] = [
        EngineId::Injection,
        EngineId::Malware,
        EngineId::Phishing,
        EngineId::SensitiveData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineId::Injection => "injection",
            EngineId::Malware => "malware",
            EngineId::Phishing => "phishing",
            EngineId::SensitiveData => "sensitive_data",
        }
    }

    /// Accepts the config spelling; unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "injection" => Some(EngineId::Injection),
            "malware" => Some(EngineId::Malware),
            "phishing" => Some(EngineId::Phishing),
            "sensitive_data" => Some(EngineId::SensitiveData),
            _ => None,
        }
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte range of a finding inside the scanned content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedThreat {
    pub threat_type: ThreatType,
    pub location: Location,
    /// Name of the pattern or heuristic that fired
    pub matched_pattern: String,
    pub confidence: f64,
    pub severity: ThreatLevel,
    pub recommendation: String,
    pub engine: EngineId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Allow,
    AllowWithWarning,
    RequireReview,
    Sanitize,
    Block,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Allow => "allow",
            RecommendedAction::AllowWithWarning => "allow_with_warning",
            RecommendedAction::RequireReview => "require_review",
            RecommendedAction::Sanitize => "sanitize",
            RecommendedAction::Block => "block",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    /// Findings below this severity are suppressed
    pub report_threshold: ThreatLevel,
    pub timeout: Duration,
    /// Maximum content size in bytes
    pub max_content_size: usize,
    pub enabled_engines: Vec<EngineId>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            report_threshold: ThreatLevel::Low,
            timeout: Duration::from_millis(100),
            max_content_size: 1024 * 1024,
            enabled_engines: EngineId::ALL.to_vec(),
        }
    }
}

impl From<&ScanSettings> for ScanOptions {
    fn from(settings: &ScanSettings) -> Self {
        let mut enabled_engines: Vec<EngineId> = settings
            .enabled_engines
            .iter()
            .filter_map(|name| {
                let id = EngineId::parse(name);
                if id.is_none() {
                    log::warn!("Ignoring unknown scan engine '{}'", name);
                }
                id
            })
            .collect();
        if settings.enabled_engines.is_empty() {
            enabled_engines = EngineId::ALL.to_vec();
        }

        let report_threshold = match ThreatLevel::from(settings.report_threshold.as_str()) {
            ThreatLevel::None => ThreatLevel::Low,
            level => level,
        };

        Self {
            report_threshold,
            timeout: Duration::from_millis(settings.timeout_ms),
            max_content_size: settings.max_content_size,
            enabled_engines,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Reported findings ordered by position
    pub threats: Vec<DetectedThreat>,
    pub threat_level: ThreatLevel,
    pub recommended_action: RecommendedAction,
    pub scanned_bytes: usize,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub engines_run: Vec<EngineId>,
}

impl ScanResult {
    pub fn is_clean(&self) -> bool {
        self.threats.is_empty()
    }

    pub fn threats_of(&self, threat_type: ThreatType) -> impl Iterator<Item = &DetectedThreat> {
        self.threats
            .iter()
            .filter(move |threat| threat.threat_type == threat_type)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("Content too large: {size} bytes (max: {max})")]
    ContentTooLarge { size: usize, max: usize },

    #[error("Scan exceeded its {budget_ms}ms budget in {engine}")]
    Timeout { engine: String, budget_ms: u64 },

    #[error("Invalid detection pattern: {0}")]
    InvalidPattern(String),
}

impl ScanError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScanError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_settings() {
        let settings = ScanSettings {
            report_threshold: "medium".to_string(),
            timeout_ms: 250,
            max_content_size: 64,
            enabled_engines: vec!["Injection".to_string(), "sensitive-data".to_string(), "bogus".to_string()],
        };
        let options = ScanOptions::from(&settings);
        assert_eq!(options.report_threshold, ThreatLevel::Medium);
        assert_eq!(options.timeout, Duration::from_millis(250));
        assert_eq!(
            options.enabled_engines,
            vec![EngineId::Injection, EngineId::SensitiveData]
        );

        let defaults = ScanOptions::from(&ScanSettings::default());
        assert_eq!(defaults.enabled_engines.len(), 4);
        assert_eq!(defaults.report_threshold, ThreatLevel::Low);
    }

    #[test]
    fn test_remediable_types() {
        assert!(ThreatType::Xss.is_remediable());
        assert!(ThreatType::CreditCard.is_remediable());
        assert!(!ThreatType::SqlInjection.is_remediable());
        assert!(!ThreatType::Malware.is_remediable());
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = ScanError::Timeout {
            engine: "phishing".to_string(),
            budget_ms: 100,
        };
        assert!(err.is_retryable());
        assert!(!ScanError::ContentTooLarge { size: 2, max: 1 }.is_retryable());
    }
}
