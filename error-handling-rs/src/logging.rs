//! # Structured Logging
//!
//! Subscriber installation and correlation-id generation.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use shared_types_rs::config::LoggingSettings;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::types::{Error, ErrorKind, Result, Severity};

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs the global `tracing` subscriber described by `settings`.
///
/// `RUST_LOG` overrides the configured level. Calling this twice is a no-op.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| {
            Error::new(
                ErrorKind::Configuration,
                format!("Invalid log level '{}': {}", settings.level, e),
            )
        })?;

    // JSON and text layers differ in type, so box them behind one
    let console = if settings.json_format {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_thread_ids(true).boxed()
    };

    let file = if settings.log_to_file {
        let appender = RollingFileAppender::new(
            Rotation::DAILY,
            &settings.log_directory,
            format!("{}.log", settings.file_prefix),
        );
        let (non_blocking, guard) = NonBlocking::new(appender);
        // The guard flushes on drop; it must live as long as the process
        Box::leak(Box::new(guard));
        Some(fmt::layer().with_writer(non_blocking).with_ansi(false).boxed())
    } else {
        None
    };

    let subscriber = Registry::default().with(filter).with(console).with(file);
    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        Error::new(
            ErrorKind::Configuration,
            format!("Failed to set global subscriber: {}", e),
        )
    })?;

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        level = %settings.level,
        json = settings.json_format,
        file = settings.log_to_file,
        "Structured logging initialized"
    );
    Ok(())
}

/// `YYYYMMDD-<16 hex digits>`: the date groups incidents, the random part
/// makes each one unique.
pub fn generate_correlation_id() -> String {
    format!("{}-{:016x}", Utc::now().format("%Y%m%d"), rand::random::<u64>())
}

/// Logs the full, unredacted failure at the mapped severity
pub fn log_structured_error(error: &Error, kind: ErrorKind, correlation_id: &str, severity: Severity) {
    use tracing::{error, info, warn};

    let causes = error.cause_messages();
    match severity {
        Severity::Critical => {
            error!(
                error_kind = %kind,
                correlation_id = %correlation_id,
                message = %error.message,
                severity = %severity,
                causes = ?causes,
                details = ?error.details,
                timestamp = %error.timestamp,
                "Critical error occurred"
            );
        }
        Severity::Major => {
            error!(
                error_kind = %kind,
                correlation_id = %correlation_id,
                message = %error.message,
                severity = %severity,
                causes = ?causes,
                "Error occurred"
            );
        }
        Severity::Minor => {
            warn!(
                error_kind = %kind,
                correlation_id = %correlation_id,
                message = %error.message,
                severity = %severity,
                "Request failed"
            );
        }
        Severity::Info => {
            info!(
                error_kind = %kind,
                correlation_id = %correlation_id,
                message = %error.message,
                "Request refused"
            );
        }
    }
}
