//! Source location tracking for diagnostics
//!
//! IR modules have no source text of their own, so locations point into
//! generated text such as a module disassembly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A location in a text (line and column are 1-based)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub filename: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(filename: &str, line: u32, column: u32) -> Self {
        Self {
            filename: filename.to_string(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

/// A span in a text (from start to end location)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn new(start: SourceLocation, end: SourceLocation) -> Self {
        Self { start, end }
    }
}

/// `file:line:col`, followed by `-col` or `-line:col` when the span is wider
/// than one point. Both ends are in the same file.
impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)?;
        if self.end.line != self.start.line {
            write!(f, "-{}:{}", self.end.line, self.end.column)
        } else if self.end.column != self.start.column {
            write!(f, "-{}", self.end.column)
        } else {
            Ok(())
        }
    }
}

/// Tracks the current location while text is being emitted
#[derive(Debug, Clone)]
pub struct SourceTracker {
    filename: String,
    line: u32,
    column: u32,
}

impl SourceTracker {
    pub fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            line: 1,
            column: 1,
        }
    }

    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(&self.filename, self.line, self.column)
    }

    /// Moves past `text`, which has just been written out
    pub fn advance_str(&mut self, text: &str) {
        match text.rfind('\n') {
            Some(last) => {
                self.line += text.matches('\n').count() as u32;
                self.column = 1 + text[last + 1..].chars().count() as u32;
            }
            None => self.column += text.chars().count() as u32,
        }
    }

    /// Span from `start` up to the current location
    pub fn span_from(&self, start: SourceLocation) -> SourceSpan {
        SourceSpan::new(start, self.location())
    }
}
