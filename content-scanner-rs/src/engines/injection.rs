// content-scanner-rs/src/engines/injection.rs
// SQL, XSS, LDAP, shell and comment-marker injection patterns

use input_validation_rs::validators::Deadline;
use lazy_static::lazy_static;
use shared_types_rs::ThreatLevel;

use super::{compile_detection_patterns, scan_patterns, DetectionEngine, DetectionPattern};
use crate::types::{DetectedThreat, EngineId, ScanError, ThreatType};

lazy_static! {
    static ref INJECTION_PATTERNS: Vec<DetectionPattern> = compile_detection_patterns(&[
        // SQL
        (
            "union_select",
            r"(?i)\bunion\b(?:\s+all)?\s+select\b",
            ThreatType::SqlInjection,
            ThreatLevel::Critical,
            0.95,
        ),
        (
            "sql_tautology",
            r#"(?i)['"]\s*or\s*['"]?\d+['"]?\s*=\s*['"]?\d+"#,
            ThreatType::SqlInjection,
            ThreatLevel::High,
            0.85,
        ),
        (
            "stacked_query",
            r"(?i);\s*(?:drop|delete|insert|update|alter|truncate|exec)\b",
            ThreatType::SqlInjection,
            ThreatLevel::Critical,
            0.9,
        ),
        // XSS
        (
            "script_tag",
            r"(?i)<\s*/?\s*script\b",
            ThreatType::Xss,
            ThreatLevel::High,
            0.95,
        ),
        (
            "event_handler",
            r"(?i)<[^>]*\bon[a-z]+\s*=",
            ThreatType::Xss,
            ThreatLevel::High,
            0.8,
        ),
        (
            "javascript_uri",
            r"(?i)\bjavascript\s*:",
            ThreatType::Xss,
            ThreatLevel::High,
            0.9,
        ),
        // LDAP filter manipulation: `*)(uid=*` or `(|(`
        (
            "ldap_filter",
            r"\*\)\s*\(|\(\s*[|&!]\s*\(",
            ThreatType::LdapInjection,
            ThreatLevel::Medium,
            0.6,
        ),
        // Shell
        (
            "command_chain",
            r"(?i)(?:;|\|\||&&|\|)\s*(?:rm|cat|wget|curl|bash|sh|zsh|nc|ncat|powershell|chmod|python|perl|whoami|uname)\b",
            ThreatType::CommandInjection,
            ThreatLevel::High,
            0.8,
        ),
        (
            "command_substitution",
            r"(?i)\$\(\s*(?:rm|cat|wget|curl|bash|sh|nc|id|whoami|uname)\b|`\s*(?:rm|cat|wget|curl|bash|sh|nc|id|whoami|uname)\b[^`]*`",
            ThreatType::CommandInjection,
            ThreatLevel::High,
            0.8,
        ),
        // Query-language comment markers
        (
            "comment_marker",
            r"(?m)'\s*--|--\s*$|/\*|\*/",
            ThreatType::CommentInjection,
            ThreatLevel::Medium,
            0.6,
        ),
    ]);
}

pub struct InjectionDetector;

impl DetectionEngine for InjectionDetector {
    fn id(&self) -> EngineId {
        EngineId::Injection
    }

    fn prepare(&self) {
        lazy_static::initialize(&INJECTION_PATTERNS);
    }

    fn scan(&self, content: &str, deadline: &Deadline) -> Result<Vec<DetectedThreat>, ScanError> {
        scan_patterns(&INJECTION_PATTERNS, content, deadline, self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn scan(content: &str) -> Vec<DetectedThreat> {
        InjectionDetector
            .scan(content, &Deadline::from_millis(5_000))
            .unwrap()
    }

    fn names(content: &str) -> Vec<String> {
        scan(content).into_iter().map(|t| t.matched_pattern).collect()
    }

    #[test_case("1 UNION ALL SELECT password FROM users", "union_select" ; "union select")]
    #[test_case("admin' OR '1'='1", "sql_tautology" ; "quoted tautology")]
    #[test_case("x'; DROP TABLE users", "stacked_query" ; "stacked drop")]
    #[test_case("<script>alert(1)</script>", "script_tag" ; "script tag")]
    #[test_case("<img src=x onerror=alert(1)>", "event_handler" ; "event handler")]
    #[test_case("<a href=\"JavaScript:go()\">", "javascript_uri" ; "javascript uri")]
    #[test_case("*)(uid=*", "ldap_filter" ; "ldap wildcard")]
    #[test_case("(|(cn=admin)(cn=*))", "ldap_filter" ; "ldap or filter")]
    #[test_case("file.txt; rm -rf /", "command_chain" ; "semicolon rm")]
    #[test_case("a && curl http://evil", "command_chain" ; "and curl")]
    #[test_case("name=$(whoami)", "command_substitution" ; "dollar paren")]
    #[test_case("x=`cat /etc/passwd`", "command_substitution" ; "backticks")]
    #[test_case("admin'--", "comment_marker" ; "trailing comment")]
    #[test_case("1 /* hidden */ = 1", "comment_marker" ; "block comment")]
    fn test_detects(content: &str, expected: &str) {
        assert!(
            names(content).iter().any(|name| name == expected),
            "{:?} missing {}",
            names(content),
            expected
        );
    }

    #[test_case("Please select one option from the union of both lists" ; "sql words in prose")]
    #[test_case("The meeting is on Monday; bring the report" ; "semicolon prose")]
    #[test_case("Use `cargo build` to compile" ; "markdown code")]
    #[test_case("Function f(x) = (a)(b) is a product" ; "parentheses")]
    #[test_case("Onboarding = first week" ; "on word outside tag")]
    fn test_benign_text_is_clean(content: &str) {
        assert!(scan(content).is_empty(), "{:?}", names(content));
    }

    #[test]
    fn test_locations_point_at_match() {
        let content = "hello <script>";
        let threats = scan(content);
        let script = threats
            .iter()
            .find(|t| t.matched_pattern == "script_tag")
            .unwrap();
        assert_eq!(&content[script.location.start..script.location.end], "<script");
        assert_eq!(script.severity, ThreatLevel::High);
        assert_eq!(script.engine, EngineId::Injection);
    }
}
