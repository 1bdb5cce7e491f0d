//! Boundary error reporting.

use bridge_traits::report::{ErrorReport, ErrorSink};
use std::fmt;
use std::sync::Arc;

use crate::error::{PlaybackError, Result};

/// Sends a structured [`ErrorReport`] for every failed public operation of
/// one component.
#[derive(Clone)]
pub struct ErrorReporter {
    component: String,
    sink: Arc<dyn ErrorSink>,
}

impl ErrorReporter {
    pub fn new(component: impl Into<String>, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            component: component.into(),
            sink,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn report(&self, operation: &str, error: &PlaybackError, context: &[String]) {
        let report = context.iter().fold(
            ErrorReport::new(&self.component, operation, error.to_string()),
            |report, value| report.with_context(value),
        );
        self.sink.report(&report);
    }

    /// Reports `result` if it is an error, then hands it back unchanged.
    pub fn check<T>(&self, operation: &str, context: &[String], result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            tracing::debug!(
                component = %self.component,
                operation,
                error = %error,
                "Operation failed"
            );
            self.report(operation, error, context);
        }
        result
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}
