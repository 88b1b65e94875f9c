//! # Content Scanner
//!
//! Pattern-based threat detection for free-text content. Four independent
//! engines run over the same content under one shared deadline:
//!
//! - **Injection**: SQL, XSS, LDAP, shell and query comment markers
//! - **Malware**: dynamic-execution keywords and encoding heuristics
//! - **Phishing**: urgency lexicon and link heuristics
//! - **Sensitive data**: payment cards, national ids, emails, credentials,
//!   connection strings
//!
//! Findings are merged into a [`ScanResult`] whose threat level is the
//! highest reported severity and whose recommended action comes from a fixed
//! severity table.

pub mod engines;
pub mod scanner;
pub mod types;

pub use engines::DetectionEngine;
pub use scanner::{recommend_action, ContentScanner};
pub use types::{
    DetectedThreat, EngineId, Location, RecommendedAction, ScanError, ScanOptions, ScanResult,
    ThreatType,
};

/// Scan with default options
pub fn scan_content(content: &str) -> Result<ScanResult, ScanError> {
    ContentScanner::default().scan(content)
}
