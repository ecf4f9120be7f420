//! Source-located diagnostics shared by `mlr-cst` and `mlr-eval`: parse and
//! semantic errors carry a byte span into the original program text so they
//! can be rendered with a caret pointing at the offending code, instead of
//! surfacing as a bare message.
//!
//! Spans are plain byte offsets rather than a token-tree range type, since
//! the programs here are small enough that re-slicing the source string by
//! byte range is all rendering needs.

use std::fmt;

/// A byte range into the original DSL program text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One diagnostic message tied to a span of the source program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            span,
            message: message.into(),
        }
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            span,
            message: message.into(),
        }
    }
}

/// An accumulated batch of diagnostics produced while building a CST.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    messages: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.messages.push(diag);
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Render with `annotate-snippets` against the given source text,
    /// pointing at each diagnostic's byte span.
    pub fn render(&self, source_name: &str, source: &str) -> String {
        use annotate_snippets::{AnnotationKind, Level, Renderer, Snippet};
        use std::fmt::Write as _;

        let renderer = Renderer::styled();
        let mut out = String::new();
        for (i, diag) in self.messages.iter().enumerate() {
            let start = (diag.span.start as usize).min(source.len());
            let end = (diag.span.end as usize)
                .max(start + 1)
                .min(source.len().max(start));
            let level = match diag.severity {
                Severity::Error => Level::ERROR,
                Severity::Warning => Level::WARNING,
            };
            let snippet = Snippet::source(source).line_start(1).path(source_name).annotation(
                AnnotationKind::Primary.span(start..end).label(&diag.message),
            );
            let report = vec![level.primary_title(&diag.message).element(snippet)];
            if i > 0 {
                out.push('\n');
            }
            let _ = write!(out, "{}", renderer.render(&report));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_errors_detects_error_severity() {
        let mut d = Diagnostics::new();
        assert!(!d.has_errors());
        d.push(Diagnostic::warning(Span::new(0, 1), "careful"));
        assert!(!d.has_errors());
        d.push(Diagnostic::error(Span::new(0, 1), "bad"));
        assert!(d.has_errors());
    }
}
