//! Non-fatal conditions collected while loading or running a sheet.

use std::fmt;
use std::ops::Range;

use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    OutOfOrderDeclaration,
    DuplicateKind,
    UnknownProperty,
    TypeMismatch,
    InvalidStatement,
    InvalidDeclaration,
    MissingKindContext,
    InvalidLiteral,
    InvalidOperation,
    DuplicateProperty,
    UnknownKind,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where in the sheet source a diagnostic points. `line` is 1-based, `span`
/// is a byte range into the whole source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn line(&self) -> Option<usize> {
        self.location.as_ref().map(|location| location.line)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "line {}: {}: {}", location.line, self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Renders located diagnostics as source-annotated reports. Diagnostics
/// without a location are rendered as a single plain line.
pub fn render_diagnostics(filename: &str, source_code: &str, diagnostics: &[Diagnostic]) -> String {
    let mut rendered = String::new();
    for diagnostic in diagnostics {
        let Some(location) = &diagnostic.location else {
            rendered.push_str(&format!("Warning: {diagnostic}\n"));
            continue;
        };
        let mut report_bytes = Vec::new();
        let written = Report::build(ReportKind::Warning, (filename, location.span.clone()))
            .with_config(
                Config::default()
                    .with_color(false)
                    .with_index_type(IndexType::Byte),
            )
            .with_code(diagnostic.kind)
            .with_message(&diagnostic.message)
            .with_label(
                Label::new((filename, location.span.clone())).with_message(diagnostic.kind),
            )
            .finish()
            .write((filename, Source::from(source_code)), &mut report_bytes);
        match written {
            Ok(()) => rendered.push_str(&String::from_utf8_lossy(&report_bytes)),
            Err(_) => rendered.push_str(&format!("Warning: {diagnostic}\n")),
        }
    }
    rendered
}
