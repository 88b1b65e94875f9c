//! In-place neutralization of findings the scanner marked remediable.

use content_scanner_rs::{ScanResult, ThreatType};
use input_validation_rs::{sanitize_html, HtmlSanitizeOptions, SanitizeResult};

const MASK: &str = "[REDACTED]";

// One contiguous region to rewrite
struct Edit {
    start: usize,
    end: usize,
    threat_type: ThreatType,
}

fn is_masked(threat_type: ThreatType) -> bool {
    matches!(
        threat_type,
        ThreatType::CreditCard
            | ThreatType::NationalId
            | ThreatType::EmailAddress
            | ThreatType::Credential
            | ThreatType::ConnectionString
    )
}

fn replacement_for(threat_type: ThreatType, original: &str) -> String {
    match threat_type {
        ThreatType::CommentInjection => String::new(),
        ThreatType::SuspiciousLink => original.replacen("://", "[:]//", 1).replace('.', "[.]"),
        _ => MASK.to_string(),
    }
}

/// Masks sensitive values, defangs links and strips comment sequences at
/// the scanner's reported byte ranges, then runs the HTML sanitizer over the
/// result whenever anything was edited or markup threats were found.
/// Removing a marker can join the pieces of a tag back together, so the
/// sanitizer always sees the edited text. Overlapping findings are merged,
/// preferring a mask.
pub fn remediate(content: &str, scan: &ScanResult, html: &HtmlSanitizeOptions) -> SanitizeResult<String> {
    let mut threats: Vec<_> = scan
        .threats
        .iter()
        .filter(|t| t.threat_type.is_remediable() && t.threat_type != ThreatType::Xss)
        .collect();
    threats.sort_by_key(|t| (t.location.start, t.location.end));

    let mut edits: Vec<Edit> = Vec::new();
    for threat in threats {
        let (start, end) = (threat.location.start, threat.location.end);
        if start >= end {
            continue;
        }
        match edits.last_mut() {
            Some(last) if start < last.end => {
                last.end = last.end.max(end);
                if is_masked(threat.threat_type) {
                    last.threat_type = threat.threat_type;
                }
            }
            _ => edits.push(Edit {
                start,
                end,
                threat_type: threat.threat_type,
            }),
        }
    }

    let mut text = content.to_string();
    let mut applied: Vec<&str> = Vec::new();
    // Back to front so earlier offsets stay valid
    for edit in edits.iter().rev() {
        let original = match content.get(edit.start..edit.end) {
            Some(original) => original,
            None => {
                tracing::warn!(
                    start = edit.start,
                    end = edit.end,
                    "Finding range is not on a character boundary; skipping"
                );
                continue;
            }
        };
        text.replace_range(edit.start..edit.end, &replacement_for(edit.threat_type, original));
        applied.push(edit.threat_type.as_str());
    }

    if !applied.is_empty() || scan.threats_of(ThreatType::Xss).next().is_some() {
        let markup = sanitize_html(&text, html);
        if markup.was_modified {
            text = markup.sanitized;
            applied.push(ThreatType::Xss.as_str());
        }
    }

    if applied.is_empty() {
        return SanitizeResult::unmodified(text);
    }
    applied.sort_unstable();
    applied.dedup();
    SanitizeResult::modified(text, Some(format!("Remediated {}", applied.join(", "))))
}
