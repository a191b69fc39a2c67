//! Run-wide error collection.
//!
//! Every component records failures here instead of aborting sibling work.
//! The driver renders one report after all sources and destinations are done.

use std::error::Error;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub context: String,
    pub message: String,
    /// `source()` chain of the original error, outermost first.
    pub causes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ErrorReporter {
    entries: Mutex<Vec<ErrorEntry>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, context: impl Into<String>, error: &(dyn Error + 'static)) {
        let context = context.into();
        let message = error.to_string();

        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        tracing::error!(context = %context, "{}", message);

        self.lock().push(ErrorEntry {
            timestamp: Utc::now(),
            context,
            message,
            causes,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.lock().clone()
    }

    /// Plain-text report of every recorded error.
    pub fn render(&self) -> String {
        let entries = self.lock();
        let mut report = vec![
            "Calendar Sync Error Report".to_string(),
            "=".repeat(50),
            format!("Date: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
            format!("Total Errors: {}", entries.len()),
            String::new(),
            "Error Details:".to_string(),
            "-".repeat(50),
        ];

        for (index, entry) in entries.iter().enumerate() {
            report.push(format!("\nError {}:", index + 1));
            report.push(format!("Time: {}", entry.timestamp.to_rfc3339()));
            report.push(format!("Context: {}", entry.context));
            report.push(format!("Message: {}", entry.message));
            for cause in &entry.causes {
                report.push(format!("Caused by: {}", cause));
            }
            report.push("-".repeat(30));
        }

        report.join("\n")
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ErrorEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
