//! Structured error reporting.
//!
//! Public operations of the core never panic for expected failures. They
//! return an `Err` and hand an [`ErrorReport`] to the configured
//! [`ErrorSink`], naming the component, the operation and the values that
//! identify what was being operated on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One failed operation, as seen by the error sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Identity of the reporting component (e.g. `"local-source#1"`).
    pub component: String,
    /// Name of the public operation that failed (e.g. `"play"`).
    pub operation: String,
    /// Human readable reason, usually the error's `Display` output.
    pub reason: String,
    /// Values identifying the operands: locators, channel ids, states.
    pub context: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(
        component: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            reason: reason.into(),
            context: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, value: impl fmt::Display) -> Self {
        self.context.push(value.to_string());
        self
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} failed: {}", self.component, self.operation, self.reason)?;
        if !self.context.is_empty() {
            write!(f, " [{}]", self.context.join(", "))?;
        }
        Ok(())
    }
}

/// Receiver of structured error reports.
///
/// Reporting is synchronous and must not block; sinks that ship reports
/// elsewhere should buffer internally.
pub trait ErrorSink: Send + Sync {
    fn report(&self, report: &ErrorReport);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_values() {
        let report = ErrorReport::new("vlc-backend", "play", "channel not active")
            .with_context("channel=42")
            .with_context(7);

        assert_eq!(
            report.to_string(),
            "vlc-backend::play failed: channel not active [channel=42, 7]"
        );
    }

    #[test]
    fn report_serializes_to_json() {
        let report = ErrorReport::new("local-source", "cache", "source not found")
            .with_context("/music/a.flac");
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["operation"], "cache");
        assert_eq!(json["context"][0], "/music/a.flac");
    }
}
