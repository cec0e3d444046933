//! Non-fatal findings collected while assembling a document.
//!
//! Warnings never halt a run. Sections aborted by a fatal error are reported here
//! with [`Severity::Error`] and skipped, so one bad section does not lose the rest.

use std::fmt;

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single finding, located by section number and field name where known.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub section: Option<String>,
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(f, "{}", level)?;
        if let Some(section) = &self.section {
            write!(f, " [section {}]", section)?;
        }
        if let Some(field) = &self.field {
            write!(f, " [field {}]", field)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Ordered sink of diagnostics. Every push is mirrored to `tracing`.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        let section = diagnostic.section.as_deref().unwrap_or("-");
        let field = diagnostic.field.as_deref().unwrap_or("-");
        match diagnostic.severity {
            Severity::Error => tracing::error!(section, field, "{}", diagnostic.message),
            Severity::Warning => tracing::warn!(section, field, "{}", diagnostic.message),
            Severity::Info => tracing::info!(section, field, "{}", diagnostic.message),
        }
        self.entries.push(diagnostic);
    }

    pub fn error(&mut self, section: Option<&str>, field: Option<&str>, message: impl Into<String>) {
        self.record(Severity::Error, section, field, message.into());
    }

    pub fn warning(&mut self, section: Option<&str>, field: Option<&str>, message: impl Into<String>) {
        self.record(Severity::Warning, section, field, message.into());
    }

    pub fn info(&mut self, section: Option<&str>, field: Option<&str>, message: impl Into<String>) {
        self.record(Severity::Info, section, field, message.into());
    }

    fn record(&mut self, severity: Severity, section: Option<&str>, field: Option<&str>, message: String) {
        self.push(Diagnostic {
            severity,
            section: section.map(str::to_string),
            field: field.map(str::to_string),
            message,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    /// Findings of the given severity, in the order they were recorded.
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.severity == severity)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
