// content-scanner-rs/src/engines/phishing.rs
// Urgency/verification lexicon and link heuristics

use input_validation_rs::validators::{find_all_bounded, is_internal_host, Deadline};
use lazy_static::lazy_static;
use regex::Regex;
use shared_types_rs::ThreatLevel;
use std::collections::BTreeSet;
use url::{Host, Url};

use super::{checkpoint, threat, DetectionEngine};
use crate::types::{DetectedThreat, EngineId, ScanError, ThreatType};

const URGENCY_PHRASES: &[&str] = &[
    "verify your account",
    "verify your identity",
    "confirm your password",
    "confirm your identity",
    "update your payment",
    "account suspended",
    "account has been suspended",
    "account will be closed",
    "urgent action required",
    "immediate action required",
    "click here immediately",
    "click the link below",
    "within 24 hours",
    "unusual activity",
    "unauthorized login",
    "security alert",
    "reset your password now",
];

const SUSPICIOUS_TLDS: &[&str] = &[
    "zip", "mov", "xyz", "top", "click", "link", "country", "gq", "tk", "ml", "cf", "work",
];

lazy_static! {
    static ref URGENCY_LEXICON: Regex = {
        let alternatives: Vec<String> = URGENCY_PHRASES
            .iter()
            .map(|phrase| regex::escape(phrase).replace(' ', r"\s+"))
            .collect();
        Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).unwrap()
    };
    static ref LINK: Regex = Regex::new(r#"(?i)\bhttps?://[^\s<>"'()]+"#).unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

pub struct PhishingDetector;

impl PhishingDetector {
    fn scan_lexicon(
        &self,
        content: &str,
        deadline: &Deadline,
    ) -> Result<Option<DetectedThreat>, ScanError> {
        let matches = find_all_bounded(&URGENCY_LEXICON, content, deadline, self.id().as_str())
            .map_err(|_| timeout(self.id(), deadline))?;

        let (first, last) = match (matches.first(), matches.last()) {
            (Some(first), Some(last)) => (first.start(), last.end()),
            _ => return Ok(None),
        };

        let distinct: BTreeSet<String> = matches
            .iter()
            .map(|m| WHITESPACE.replace_all(&m.as_str().to_lowercase(), " ").into_owned())
            .collect();
        let count = distinct.len();

        let severity = match count {
            1 => ThreatLevel::Low,
            2 | 3 => ThreatLevel::Medium,
            _ => ThreatLevel::High,
        };
        let confidence = (0.4 + 0.15 * (count as f64 - 1.0)).min(0.95);

        Ok(Some(threat(
            ThreatType::Phishing,
            first..last,
            &format!("urgency_lexicon ({} phrases)", count),
            confidence,
            severity,
            self.id(),
        )))
    }

    fn scan_links(&self, content: &str, deadline: &Deadline) -> Result<Vec<DetectedThreat>, ScanError> {
        let links = find_all_bounded(&LINK, content, deadline, self.id().as_str())
            .map_err(|_| timeout(self.id(), deadline))?;

        let mut threats = Vec::new();
        for link in links {
            checkpoint(deadline, self.id())?;
            let url = match Url::parse(link.as_str()) {
                Ok(url) => url,
                Err(_) => continue,
            };
            let range = link.start()..link.end();
            let mut flag = |name: &str, threat_type, severity, confidence| {
                threats.push(threat(threat_type, range.clone(), name, confidence, severity, self.id()));
            };

            if url.scheme() == "http" {
                flag("insecure_link", ThreatType::SuspiciousLink, ThreatLevel::Low, 0.5);
            }
            if !url.username().is_empty() || url.password().is_some() {
                // http://trusted.example@attacker.example/ hides the real host
                flag("credentials_in_authority", ThreatType::Phishing, ThreatLevel::High, 0.85);
            }

            match url.host() {
                Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {
                    flag("ip_literal_host", ThreatType::SuspiciousLink, ThreatLevel::Medium, 0.7);
                }
                Some(host) => {
                    if is_internal_host(&host) {
                        flag("internal_host", ThreatType::SuspiciousLink, ThreatLevel::Medium, 0.7);
                    }
                    let domain = match host {
                        Host::Domain(domain) => domain.trim_end_matches('.').to_ascii_lowercase(),
                        _ => continue,
                    };
                    if domain.split('.').any(|label| label.starts_with("xn--")) {
                        flag("punycode_host", ThreatType::SuspiciousLink, ThreatLevel::Medium, 0.7);
                    }
                    let tld = domain.rsplit('.').next().unwrap_or_default();
                    if SUSPICIOUS_TLDS.contains(&tld) {
                        flag("suspicious_tld", ThreatType::SuspiciousLink, ThreatLevel::Low, 0.5);
                    }
                }
                None => {}
            }
        }
        Ok(threats)
    }
}

fn timeout(engine: EngineId, deadline: &Deadline) -> ScanError {
    ScanError::Timeout {
        engine: engine.as_str().to_string(),
        budget_ms: deadline.budget().as_millis() as u64,
    }
}

impl DetectionEngine for PhishingDetector {
    fn id(&self) -> EngineId {
        EngineId::Phishing
    }

    fn prepare(&self) {
        lazy_static::initialize(&URGENCY_LEXICON);
        lazy_static::initialize(&LINK);
        lazy_static::initialize(&WHITESPACE);
    }

    fn scan(&self, content: &str, deadline: &Deadline) -> Result<Vec<DetectedThreat>, ScanError> {
        checkpoint(deadline, self.id())?;
        let mut threats: Vec<DetectedThreat> = self.scan_lexicon(content, deadline)?.into_iter().collect();
        threats.extend(self.scan_links(content, deadline)?);
        Ok(threats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(content: &str) -> Vec<DetectedThreat> {
        PhishingDetector
            .scan(content, &Deadline::from_millis(5_000))
            .unwrap()
    }

    fn names(content: &str) -> Vec<String> {
        scan(content).into_iter().map(|t| t.matched_pattern).collect()
    }

    #[test]
    fn test_lexicon_confidence_grows_with_phrases() {
        let one = scan("Please verify your account.");
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].severity, ThreatLevel::Low);

        let several = scan("URGENT ACTION REQUIRED: verify your   account within 24 hours");
        assert_eq!(several.len(), 1);
        assert_eq!(several[0].severity, ThreatLevel::Medium);
        assert!(several[0].confidence > one[0].confidence);
        assert_eq!(several[0].matched_pattern, "urgency_lexicon (3 phrases)");
    }

    #[test]
    fn test_repeated_phrase_counts_once() {
        let threats = scan("security alert! security alert!");
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].severity, ThreatLevel::Low);
    }

    #[test]
    fn test_link_heuristics() {
        assert_eq!(names("see http://example.com/page"), vec!["insecure_link"]);
        assert_eq!(names("see https://203.0.113.9/login"), vec!["ip_literal_host"]);
        assert_eq!(names("https://xn--bcher-kva.example/signin"), vec!["punycode_host"]);
        assert_eq!(names("https://prize.example.xyz/claim"), vec!["suspicious_tld"]);
        assert_eq!(names("https://localhost/admin"), vec!["internal_host"]);

        let deceptive = scan("https://bank.example.com@attacker.example/login");
        assert_eq!(deceptive.len(), 1);
        assert_eq!(deceptive[0].threat_type, ThreatType::Phishing);
        assert_eq!(deceptive[0].severity, ThreatLevel::High);
    }

    #[test]
    fn test_benign_text_is_clean() {
        assert!(scan("Docs live at https://docs.example.com/guide. Thanks for verifying.").is_empty());
    }
}
