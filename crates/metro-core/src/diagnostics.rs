//! Structured diagnostics and the sink they're dispatched through.
//!
//! Every stage of the pipeline (lex, parse, Sema, evaluator) reports through
//! a [`DiagnosticSink`] rather than returning `Result` per-node, matching
//! spec.md 4.3.6 / 7: lex and parse errors halt the current file, semantic
//! errors may accumulate, and runtime errors terminate the process.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::source::SourceStore;
use crate::token::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// Tag identifying the kind of diagnostic, per spec.md 6.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    Undefined,
    TypeMismatch,
    MultipleDefined,
    EmptyEnum,
    EmptyStruct,
    EmptySwitch,
    InvalidSyntax,
    InvalidInitializer,
    RecursiveType,
    Runtime,
}

/// A single structured diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub span: Location,
    pub message: String,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, span: Location, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Error, kind, span, message: message.into(), notes: Vec::new() }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Renders this diagnostic as a header line, a `--> path:line` locator,
    /// the offending source line, and a `^`-marker aligned under the span.
    pub fn render(&self, store: &SourceStore) -> String {
        let file = store.get(self.span.file);
        let mut out = String::new();
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        out.push_str(&format!("{sev}: {}\n", self.message));
        out.push_str(&format!(
            "  --> {}:{}\n",
            file.path.display(),
            self.span.line
        ));
        let line_text = file.line_text(self.span.line);
        let col = file.column_at(self.span.offset);
        out.push_str(&format!("   | {line_text}\n"));
        let marker_len = self.span.length.max(1);
        out.push_str(&format!(
            "   | {}{}\n",
            " ".repeat(col.saturating_sub(1)),
            "^".repeat(marker_len)
        ));
        for note in &self.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Receives diagnostics and tracks whether any errors were emitted, gating
/// pipeline stages per spec.md 2 ("no errors emitted").
pub trait DiagnosticSink {
    fn emit(&mut self, diag: Diagnostic);
    fn error_count(&self) -> usize;
    fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// The default in-process sink: accumulates every diagnostic it receives.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub diagnostics: Vec<Diagnostic>,
    errors: usize,
}

impl CollectingSink {
    pub fn new() -> Self {
        CollectingSink::default()
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&mut self, diag: Diagnostic) {
        if diag.severity == Severity::Error {
            self.errors += 1;
        }
        self.diagnostics.push(diag);
    }

    fn error_count(&self) -> usize {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceStore;

    #[test]
    fn sink_counts_only_errors() {
        let mut sink = CollectingSink::new();
        let loc = Location { file: crate::source::SourceId(0), offset: 0, length: 1, line: 1 };
        sink.emit(Diagnostic { severity: Severity::Warning, kind: DiagnosticKind::Undefined, span: loc, message: "w".into(), notes: vec![] });
        assert!(!sink.has_errors());
        sink.emit(Diagnostic::error(DiagnosticKind::Undefined, loc, "e"));
        assert_eq!(sink.error_count(), 1);
        assert!(sink.has_errors());
    }

    #[test]
    fn render_includes_locator_and_marker() {
        let mut store = SourceStore::new();
        let id = store.add_file("a.metro", "let x = 1 / 0;\n".to_string());
        let loc = Location { file: id, offset: 10, length: 1, line: 1 };
        let diag = Diagnostic::error(DiagnosticKind::Runtime, loc, "division by zero");
        let rendered = diag.render(&store);
        assert!(rendered.contains("error: division by zero"));
        assert!(rendered.contains("a.metro:1"));
        assert!(rendered.contains('^'));
    }
}
