//! Diagnostics for the shader IR toolchain
//!
//! Data-dependent failures (an invalid module, a workgroup query on a
//! function without a workgroup size, ...) are reported as a [`Failure`]
//! carrying one or more [`Diagnostic`]s. Their text is meant to be printed
//! directly to an end-user facing error stream.

use crate::source_loc::SourceSpan;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with an optional location and notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(span) = &self.span {
            write!(f, "{}: ", span)?;
        }
        write!(f, "{}: {}", self.severity, self.message)?;

        for note in &self.notes {
            write!(f, "\n  note: {}", note)?;
        }

        Ok(())
    }
}

/// An ordered collection of diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic, returning it so notes and spans can be attached
    pub fn add(&mut self, diagnostic: Diagnostic) -> &mut Diagnostic {
        match diagnostic.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Note => {}
        }
        self.diagnostics.push(diagnostic);
        let last = self.diagnostics.len() - 1;
        &mut self.diagnostics[last]
    }

    /// Report an error diagnostic
    pub fn error(&mut self, message: impl Into<String>) -> &mut Diagnostic {
        self.add(Diagnostic::error(message))
    }

    /// Check if any errors have been reported
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }

    /// Create a summary string
    pub fn summary(&self) -> String {
        match (self.error_count, self.warning_count) {
            (0, 0) => "No errors or warnings".to_string(),
            (0, w) => format!("{} warning{}", w, if w == 1 { "" } else { "s" }),
            (e, 0) => format!("{} error{}", e, if e == 1 { "" } else { "s" }),
            (e, w) => format!(
                "{} error{} and {} warning{}",
                e,
                if e == 1 { "" } else { "s" },
                w,
                if w == 1 { "" } else { "s" }
            ),
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.iter()
    }
}

/// The failure side of a fallible IR operation
///
/// `context` holds optional trailing text that helps reading the
/// diagnostics, such as the disassembly the spans point into.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", render_failure(.diagnostics, .context))]
pub struct Failure {
    pub diagnostics: Diagnostics,
    pub context: Option<String>,
}

impl Failure {
    /// Create a failure holding a single error
    pub fn new(message: impl Into<String>) -> Self {
        let mut diagnostics = Diagnostics::new();
        diagnostics.error(message);
        Self { diagnostics, context: None }
    }

    pub fn from_diagnostics(diagnostics: Diagnostics) -> Self {
        Self { diagnostics, context: None }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The message of the first error, if any
    pub fn first_message(&self) -> Option<&str> {
        self.diagnostics.iter().next().map(|d| d.message.as_str())
    }
}

fn render_failure(diagnostics: &Diagnostics, context: &Option<String>) -> String {
    match context {
        Some(context) => format!("{}\n\n{}", diagnostics, context),
        None => diagnostics.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_loc::SourceLocation;

    fn span() -> SourceSpan {
        SourceSpan::new(
            SourceLocation::new("<disassembly>", 3, 5),
            SourceLocation::new("<disassembly>", 3, 20),
        )
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::error("binary: operand types do not match").with_span(span());
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(
            diag.to_string(),
            "<disassembly>:3:5-20: error: binary: operand types do not match"
        );
    }

    #[test]
    fn test_diagnostic_with_notes() {
        let diag = Diagnostic::error("no matching call")
            .with_note("candidate 'abs(T) -> T'")
            .with_note("candidate 'abs(vecN<T>) -> vecN<T>'");

        assert_eq!(diag.notes.len(), 2);
        assert_eq!(
            diag.to_string(),
            "error: no matching call\n  note: candidate 'abs(T) -> T'\n  note: candidate 'abs(vecN<T>) -> vecN<T>'"
        );
    }

    #[test]
    fn test_summary() {
        let mut diagnostics = Diagnostics::new();
        assert_eq!(diagnostics.summary(), "No errors or warnings");

        diagnostics.error("Error 1");
        assert_eq!(diagnostics.summary(), "1 error");

        diagnostics.error("Error 2");
        assert_eq!(diagnostics.summary(), "2 errors");

        diagnostics.add(Diagnostic::warning("Warning 1"));
        assert_eq!(diagnostics.summary(), "2 errors and 1 warning");
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_failure_renders_context() {
        let failure = Failure::new("decode failed").with_context("# module text");
        assert_eq!(failure.first_message(), Some("decode failed"));
        assert_eq!(failure.to_string(), "error: decode failed\n\n# module text");
    }
}
