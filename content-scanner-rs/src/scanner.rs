// content-scanner-rs/src/scanner.rs
// Runs the enabled engines over one piece of content and aggregates findings

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use input_validation_rs::validators::Deadline;
use shared_types_rs::config::ScanSettings;
use shared_types_rs::{AuditSink, NoopAuditSink, SecurityEvent, ThreatLevel};

use crate::engines::{engine_for, DetectionEngine};
use crate::types::{DetectedThreat, RecommendedAction, ScanError, ScanOptions, ScanResult};

pub struct ContentScanner {
    options: ScanOptions,
    engines: Vec<Box<dyn DetectionEngine>>,
    audit: Arc<dyn AuditSink>,
}

impl ContentScanner {
    pub fn new(options: ScanOptions) -> Self {
        let mut seen = HashSet::new();
        let engines: Vec<Box<dyn DetectionEngine>> = options
            .enabled_engines
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .map(engine_for)
            .collect();
        // Pattern tables compile here, not inside the first scan's deadline
        for engine in &engines {
            engine.prepare();
        }
        Self {
            options,
            engines,
            audit: Arc::new(NoopAuditSink),
        }
    }

    pub fn from_settings(settings: &ScanSettings) -> Self {
        Self::new(ScanOptions::from(settings))
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Add an engine beyond the built-in four
    pub fn with_engine(mut self, engine: Box<dyn DetectionEngine>) -> Self {
        engine.prepare();
        self.engines.push(engine);
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan content with every enabled engine.
    ///
    /// Content above `max_content_size` is rejected before any engine runs.
    /// All engines share one deadline; an expired deadline aborts the whole
    /// scan with a retryable [`ScanError::Timeout`] rather than returning a
    /// partial result.
    pub fn scan(&self, content: &str) -> Result<ScanResult, ScanError> {
        if content.len() > self.options.max_content_size {
            log::warn!(
                "Rejected content of {} bytes (max {})",
                content.len(),
                self.options.max_content_size
            );
            return Err(ScanError::ContentTooLarge {
                size: content.len(),
                max: self.options.max_content_size,
            });
        }

        let started = Instant::now();
        let deadline = Deadline::after(self.options.timeout);
        let mut threats: Vec<DetectedThreat> = Vec::new();
        let mut engines_run = Vec::with_capacity(self.engines.len());

        for engine in &self.engines {
            match engine.scan(content, &deadline) {
                Ok(found) => threats.extend(found),
                Err(e) => {
                    log::warn!("Content scan aborted in {} engine: {}", engine.id(), e);
                    if e.is_retryable() {
                        self.audit.emit(
                            SecurityEvent::new("content_scan.timeout")
                                .with("engine", engine.id())
                                .with("budget_ms", self.options.timeout.as_millis() as u64)
                                .with("content_length", content.len()),
                        );
                    }
                    return Err(e);
                }
            }
            engines_run.push(engine.id());
        }

        threats.retain(|threat| threat.severity >= self.options.report_threshold);
        threats.sort_by_key(|threat| {
            (
                threat.location.start,
                Reverse(threat.severity),
                threat.location.end,
            )
        });

        let threat_level = threats
            .iter()
            .map(|threat| threat.severity)
            .max()
            .unwrap_or(ThreatLevel::None);
        let recommended_action = recommend_action(&threats);

        let result = ScanResult {
            threats,
            threat_level,
            recommended_action,
            scanned_bytes: content.len(),
            duration: started.elapsed(),
            engines_run,
        };

        if !result.is_clean() {
            log::info!(
                "Content scan found {} threat(s), level {}, action {}",
                result.threats.len(),
                result.threat_level,
                result.recommended_action.as_str()
            );
            self.emit_findings(&result);
        }

        Ok(result)
    }

    fn emit_findings(&self, result: &ScanResult) {
        let mut types: Vec<&str> = result
            .threats
            .iter()
            .map(|threat| threat.threat_type.as_str())
            .collect();
        types.sort_unstable();
        types.dedup();

        self.audit.emit(
            SecurityEvent::new("content_scan.threats")
                .with("threat_level", result.threat_level)
                .with("recommended_action", result.recommended_action)
                .with("threat_count", result.threats.len())
                .with("threat_types", types)
                .with("scanned_bytes", result.scanned_bytes),
        );
    }
}

impl Default for ContentScanner {
    fn default() -> Self {
        Self::new(ScanOptions::default())
    }
}

/// Map the reported findings to an action.
///
/// High and critical findings are sanitized only when every finding at the
/// top severity can be remediated in place; otherwise the content is blocked.
pub fn recommend_action(threats: &[DetectedThreat]) -> RecommendedAction {
    let top = match threats.iter().map(|threat| threat.severity).max() {
        Some(level) => level,
        None => return RecommendedAction::Allow,
    };

    match top {
        ThreatLevel::None => RecommendedAction::Allow,
        ThreatLevel::Low => RecommendedAction::AllowWithWarning,
        ThreatLevel::Medium => RecommendedAction::RequireReview,
        ThreatLevel::High | ThreatLevel::Critical => {
            let remediable = threats
                .iter()
                .filter(|threat| threat.severity == top)
                .all(|threat| threat.threat_type.is_remediable());
            if remediable {
                RecommendedAction::Sanitize
            } else {
                RecommendedAction::Block
            }
        }
    }
}
