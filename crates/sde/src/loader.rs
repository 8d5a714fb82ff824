//! Line-oriented sheet reader.
//!
//! Each trimmed, non-blank line is matched by prefix, in this order:
//!
//! | prefix          | effect                                         |
//! |-----------------|------------------------------------------------|
//! | `obj <Name>:`   | declare a kind and make it the current kind    |
//! | `props: {..}`   | replace the current kind's property values     |
//! | `func: {..}`    | attach operations to the current kind          |
//! | `Sheet <Name>:` | end the declarations, clear the current kind   |
//! | anything else   | statement, kept only if it parses              |
//!
//! Nothing here fails. Every problem becomes a [`Diagnostic`] and the reader
//! moves on to the next line.

use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;

use crate::diagnostics::{Diagnostic, DiagnosticKind, Location};
use crate::literal::{self, DeclarationContext};
use crate::parser::{self, Action, Spanned};
use crate::registry::{KindRef, ObjectKindRegistry};
use crate::value::Value;

/// A statement that passed syntax validation.
#[derive(Debug, Clone)]
pub struct Statement {
    /// Position in the executed sequence.
    pub index: usize,
    /// 1-based source line.
    pub line: usize,
    /// Byte offset of `text` within the sheet source.
    pub offset: usize,
    pub text: String,
    pub action: Spanned<Action>,
}

#[derive(Debug)]
pub struct ParsedSheet {
    pub name: Option<String>,
    pub registry: ObjectKindRegistry,
    pub statements: Vec<Statement>,
    pub diagnostics: Vec<Diagnostic>,
}

/// One trimmed source line.
struct Line<'code> {
    number: usize,
    offset: usize,
    text: &'code str,
}

impl Line<'_> {
    fn location(&self) -> Location {
        Location {
            line: self.number,
            span: self.offset..self.offset + self.text.len(),
        }
    }

    /// Location of `span` within the text that follows a prefix of
    /// `prefix_len` bytes.
    fn location_in(
        &self,
        prefix_len: usize,
        payload: &str,
        span: std::ops::Range<usize>,
    ) -> Location {
        let leading = self.text.len() - prefix_len - payload.len();
        let start = self.offset + prefix_len + leading;
        Location {
            line: self.number,
            span: start + span.start..start + span.end,
        }
    }
}

#[derive(Debug, Default)]
pub struct SheetParser {
    registry: ObjectKindRegistry,
    current: Option<KindRef>,
    name: Option<String>,
    statements: Vec<Statement>,
    diagnostics: Vec<Diagnostic>,
}

impl SheetParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a registry that may already hold property definitions.
    pub fn with_registry(registry: ObjectKindRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    pub fn parse(mut self, source: &str) -> ParsedSheet {
        let mut offset = 0;
        for (index, raw_line) in source.split_inclusive('\n').enumerate() {
            let line_start = offset;
            offset += raw_line.len();
            let untrimmed = raw_line.trim_end_matches(['\n', '\r']);
            let text = untrimmed.trim();
            if text.is_empty() {
                continue;
            }
            let line = Line {
                number: index + 1,
                offset: line_start + (untrimmed.len() - untrimmed.trim_start().len()),
                text,
            };
            self.parse_line(&line);
        }
        debug!(
            "Parsed {} kind(s), {} statement(s), {} diagnostic(s)",
            self.registry.len(),
            self.statements.len(),
            self.diagnostics.len()
        );
        ParsedSheet {
            name: self.name,
            registry: self.registry,
            statements: self.statements,
            diagnostics: self.diagnostics,
        }
    }

    fn parse_line(&mut self, line: &Line) {
        if let Some(rest) = line.text.strip_prefix("obj ") {
            self.declare_kind(line, rest);
        } else if let Some(payload) = line.text.strip_prefix("props:") {
            self.props(line, payload);
        } else if let Some(payload) = line.text.strip_prefix("func:") {
            self.func(line, payload);
        } else if let Some(rest) = line.text.strip_prefix("Sheet ") {
            let name = declared_name(rest);
            if !name.is_empty() {
                self.name = Some(name.to_owned());
            }
            self.current = None;
        } else {
            self.statement(line);
        }
    }

    fn report(&mut self, line: &Line, kind: DiagnosticKind, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::new(kind, message).at(line.location()));
    }

    fn declare_kind(&mut self, line: &Line, rest: &str) {
        let name = declared_name(rest);
        if !is_identifier(name) {
            self.report(
                line,
                DiagnosticKind::InvalidDeclaration,
                format!("Invalid kind name '{name}'"),
            );
            return;
        }
        let (kind, diagnostics) = self.registry.declare_kind(name);
        self.diagnostics.extend(
            diagnostics
                .into_iter()
                .map(|diagnostic| diagnostic.at(line.location())),
        );
        self.current = Some(kind);
    }

    /// Evaluates the payload of `props:`/`func:` into its entries.
    fn declaration_map(
        &mut self,
        line: &Line,
        prefix: &str,
        payload: &str,
    ) -> Option<(KindRef, IndexMap<String, Value>)> {
        let Some(kind) = self.current.clone() else {
            self.report(
                line,
                DiagnosticKind::MissingKindContext,
                format!("'{prefix}' outside of an 'obj' declaration"),
            );
            return None;
        };
        let trimmed = payload.trim();
        let expression = match parser::parse_expression(trimmed) {
            Ok(expression) => expression,
            Err(errors) => {
                for error in errors {
                    let location = line.location_in(prefix.len(), trimmed, error.span);
                    self.diagnostics.push(
                        Diagnostic::new(DiagnosticKind::InvalidLiteral, error.message).at(location),
                    );
                }
                return None;
            }
        };
        let context = DeclarationContext {
            current: Some(&kind),
            registry: &self.registry,
        };
        match literal::evaluate(&expression, &context) {
            Ok(Value::Map(entries)) => Some((kind, entries)),
            Ok(other) => {
                let location = line.location_in(prefix.len(), trimmed, 0..trimmed.len());
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::InvalidLiteral,
                        format!("'{prefix}' expects a map, found {}", other.value_type()),
                    )
                    .at(location),
                );
                None
            }
            Err(error) => {
                let location = line.location_in(prefix.len(), trimmed, error.span);
                self.diagnostics.push(
                    Diagnostic::new(DiagnosticKind::InvalidLiteral, error.message).at(location),
                );
                None
            }
        }
    }

    fn props(&mut self, line: &Line, payload: &str) {
        let Some((kind, entries)) = self.declaration_map(line, "props:", payload) else {
            return;
        };
        let mut defaults = IndexMap::new();
        for (name, value) in entries {
            let resolved = kind.validate_assignment(&name, value);
            if let Some(diagnostic) = resolved.diagnostic {
                self.diagnostics.push(diagnostic.at(line.location()));
            }
            defaults.insert(name, resolved.value);
        }
        kind.replace_defaults(defaults);
    }

    fn func(&mut self, line: &Line, payload: &str) {
        let Some((kind, entries)) = self.declaration_map(line, "func:", payload) else {
            return;
        };
        for (name, value) in entries {
            match value {
                Value::Operation(operation) => {
                    kind.attach_operation(&name, Rc::unwrap_or_clone(operation));
                }
                other => self.report(
                    line,
                    DiagnosticKind::InvalidOperation,
                    format!(
                        "Operation '{name}' of kind '{}' must be a closure, found {}",
                        kind.name(),
                        other.value_type()
                    ),
                ),
            }
        }
    }

    fn statement(&mut self, line: &Line) {
        match parser::validate_statement(line.text) {
            Ok(Some(action)) => self.statements.push(Statement {
                index: self.statements.len(),
                line: line.number,
                offset: line.offset,
                text: line.text.to_owned(),
                action,
            }),
            // Comment-only line
            Ok(None) => {}
            Err(errors) => {
                let span = errors
                    .first()
                    .map(|error| line.offset + error.span.start..line.offset + error.span.end)
                    .unwrap_or_else(|| line.location().span);
                let reason = errors
                    .first()
                    .map(|error| error.message.clone())
                    .unwrap_or_default();
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::InvalidStatement,
                        format!("Invalid statement `{}`: {reason}", line.text),
                    )
                    .at(Location {
                        line: line.number,
                        span,
                    }),
                );
            }
        }
    }
}

/// `Name:` -> `Name`
fn declared_name(rest: &str) -> &str {
    rest.trim().trim_end_matches(':').trim_end()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|char| char.is_ascii_alphanumeric() || char == '_')
}

pub fn parse_sheet(source: &str) -> ParsedSheet {
    SheetParser::new().parse(source)
}
