// content-scanner-rs/src/engines/malware.rs
// Dynamic-execution keywords and encoding/obfuscation heuristics

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use input_validation_rs::validators::{find_all_bounded, Deadline};
use lazy_static::lazy_static;
use regex::Regex;
use shared_types_rs::ThreatLevel;

use super::{
    checkpoint, compile_detection_patterns, scan_patterns, threat, DetectionEngine,
    DetectionPattern,
};
use crate::types::{DetectedThreat, EngineId, ScanError, ThreatType};

/// Keywords that mark a decoded base64 payload as executable
const DECODED_EXEC_KEYWORDS: &[&str] = &[
    "eval(",
    "exec(",
    "system(",
    "<script",
    "powershell",
    "/bin/sh",
    "/bin/bash",
    "cmd.exe",
    "wget ",
    "curl ",
    "rm -rf",
    "fromcharcode",
];

lazy_static! {
    static ref MALWARE_PATTERNS: Vec<DetectionPattern> = compile_detection_patterns(&[
        (
            "dynamic_eval",
            r"(?i)\b(?:eval|exec|execScript|Function)\s*\(",
            ThreatType::Malware,
            ThreatLevel::High,
            0.8,
        ),
        (
            "document_write",
            r"(?i)\bdocument\.write(?:ln)?\s*\(",
            ThreatType::Malware,
            ThreatLevel::Medium,
            0.6,
        ),
        (
            "char_code_assembly",
            r"(?i)\bString\.fromCharCode\s*\(|\bfromCharCode\s*\(",
            ThreatType::Obfuscation,
            ThreatLevel::High,
            0.75,
        ),
        (
            "encoded_powershell",
            r"(?i)\bpowershell(?:\.exe)?\b[^\n]*\s-(?:e|enc|encodedcommand)\b",
            ThreatType::Malware,
            ThreatLevel::Critical,
            0.95,
        ),
        (
            "shell_interpreter",
            r"(?i)\bcmd\.exe\b|/bin/(?:ba)?sh\b|\bWScript\.Shell\b",
            ThreatType::Malware,
            ThreatLevel::High,
            0.85,
        ),
        (
            "base64_decode_call",
            r"(?i)\b(?:atob|base64_decode|b64decode)\s*\(",
            ThreatType::Obfuscation,
            ThreatLevel::Medium,
            0.65,
        ),
        (
            "hex_escape_run",
            r"(?:\\x[0-9a-fA-F]{2}){4,}",
            ThreatType::Obfuscation,
            ThreatLevel::Medium,
            0.7,
        ),
        (
            "unicode_escape_run",
            r"(?:\\u[0-9a-fA-F]{4}){3,}",
            ThreatType::Obfuscation,
            ThreatLevel::Medium,
            0.7,
        ),
    ]);

    static ref BASE64_RUN: Regex = Regex::new(r"[A-Za-z0-9+/]{40,}={0,2}").unwrap();
}

pub struct MalwareDetector;

impl MalwareDetector {
    /// Long base64 runs are low-grade obfuscation on their own; a run that
    /// decodes to something executable is escalated.
    fn scan_base64_runs(
        &self,
        content: &str,
        deadline: &Deadline,
    ) -> Result<Vec<DetectedThreat>, ScanError> {
        let runs = find_all_bounded(&BASE64_RUN, content, deadline, self.id().as_str())
            .map_err(|_| ScanError::Timeout {
                engine: self.id().as_str().to_string(),
                budget_ms: deadline.budget().as_millis() as u64,
            })?;

        let mut threats = Vec::new();
        for run in runs {
            checkpoint(deadline, self.id())?;
            let candidate = run.as_str();
            // Only whole quanta decode; long identifiers and hashes rarely are
            if candidate.len() % 4 != 0 {
                continue;
            }
            let decoded = match BASE64_STANDARD.decode(candidate) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).to_lowercase(),
                Err(_) => continue,
            };

            let (name, severity, confidence) = if decoded_is_executable(&decoded) {
                ("base64_executable_payload", ThreatLevel::High, 0.9)
            } else {
                ("base64_run", ThreatLevel::Low, 0.4)
            };
            threats.push(threat(
                ThreatType::Obfuscation,
                run.start()..run.end(),
                name,
                confidence,
                severity,
                self.id(),
            ));
        }
        Ok(threats)
    }
}

fn decoded_is_executable(decoded: &str) -> bool {
    DECODED_EXEC_KEYWORDS
        .iter()
        .any(|keyword| decoded.contains(keyword))
}

impl DetectionEngine for MalwareDetector {
    fn id(&self) -> EngineId {
        EngineId::Malware
    }

    fn prepare(&self) {
        lazy_static::initialize(&MALWARE_PATTERNS);
        lazy_static::initialize(&BASE64_RUN);
    }

    fn scan(&self, content: &str, deadline: &Deadline) -> Result<Vec<DetectedThreat>, ScanError> {
        let mut threats = scan_patterns(&MALWARE_PATTERNS, content, deadline, self.id())?;
        threats.extend(self.scan_base64_runs(content, deadline)?);
        Ok(threats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn scan(content: &str) -> Vec<DetectedThreat> {
        MalwareDetector
            .scan(content, &Deadline::from_millis(5_000))
            .unwrap()
    }

    fn find<'a>(threats: &'a [DetectedThreat], name: &str) -> Option<&'a DetectedThreat> {
        threats.iter().find(|t| t.matched_pattern == name)
    }

    #[test_case("eval(payload)", "dynamic_eval" ; "eval")]
    #[test_case("new Function ('return 1')", "dynamic_eval" ; "function constructor")]
    #[test_case("document.write('<b>')", "document_write" ; "document write")]
    #[test_case("String.fromCharCode(72, 105)", "char_code_assembly" ; "from char code")]
    #[test_case("powershell.exe -NoP -enc SQBFAFgA", "encoded_powershell" ; "encoded powershell")]
    #[test_case("new ActiveXObject('WScript.Shell')", "shell_interpreter" ; "wscript")]
    #[test_case("atob(data)", "base64_decode_call" ; "atob")]
    #[test_case(r"\x68\x65\x6c\x6c\x6f", "hex_escape_run" ; "hex escapes")]
    #[test_case(r"\u0061\u006c\u0065\u0072", "unicode_escape_run" ; "unicode escapes")]
    fn test_detects(content: &str, expected: &str) {
        let threats = scan(content);
        assert!(find(&threats, expected).is_some(), "{:?}", threats);
    }

    #[test]
    fn test_base64_payload_is_escalated() {
        let payload = BASE64_STANDARD.encode("var x = 1; eval(atob(document.cookie)); done");
        assert!(payload.len() >= 40);
        let threats = scan(&format!("data: {}", payload));
        let found = find(&threats, "base64_executable_payload").unwrap();
        assert_eq!(found.severity, ThreatLevel::High);
        assert_eq!(found.threat_type, ThreatType::Obfuscation);
    }

    #[test]
    fn test_plain_base64_is_low() {
        let payload = BASE64_STANDARD.encode("the quarterly report is attached below, thanks");
        let threats = scan(&payload);
        let found = find(&threats, "base64_run").unwrap();
        assert_eq!(found.severity, ThreatLevel::Low);
    }

    #[test]
    fn test_benign_text_is_clean() {
        assert!(scan("Evaluate the function of each team member").is_empty());
        assert!(scan("short base64 aGVsbG8=").is_empty());
    }
}
