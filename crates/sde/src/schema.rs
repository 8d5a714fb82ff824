//! Property schemas: which properties a kind accepts, their types, defaults
//! and required-ness.
//!
//! Validation is deliberately loose. An unknown property or a value of the
//! wrong type produces a [`Diagnostic`] but the value is still handed back to
//! the caller for storing.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Text,
    Number,
    Boolean,
    List,
    Map,
    Record,
    Image,
    Operation,
    Any,
}

impl PropertyType {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Text => matches!(value, Value::Text(_)),
            Self::Number => matches!(value, Value::Integer(_) | Value::Float(_)),
            Self::Boolean => matches!(value, Value::Boolean(_)),
            Self::List => matches!(value, Value::List(_)),
            Self::Map => matches!(value, Value::Map(_)),
            Self::Record => matches!(value, Value::Record(_)),
            Self::Image => matches!(value, Value::Image(_)),
            Self::Operation => matches!(value, Value::Operation(_)),
            Self::Any => true,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::List => "list",
            Self::Map => "map",
            Self::Record => "record",
            Self::Image => "image",
            Self::Operation => "operation",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    pub name: String,
    pub property_type: PropertyType,
    pub default: Option<Value>,
    pub required: bool,
}

impl PropertyDefinition {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            default: None,
            required: false,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// A required property never falls back to its default.
    pub fn effective_default(&self) -> Option<&Value> {
        if self.required {
            None
        } else {
            self.default.as_ref()
        }
    }
}

/// Outcome of [`PropertySchema::validate_assignment`].
#[derive(Debug)]
pub struct ResolvedAssignment {
    pub value: Value,
    pub diagnostic: Option<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct PropertySchema {
    definitions: IndexMap<String, PropertyDefinition>,
}

impl PropertySchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition. A second definition of the same name replaces
    /// the first and is reported.
    pub fn define(
        &mut self,
        kind_name: &str,
        definition: PropertyDefinition,
    ) -> Option<Diagnostic> {
        let name = definition.name.clone();
        self.definitions.insert(name.clone(), definition).map(|_| {
            Diagnostic::new(
                DiagnosticKind::DuplicateProperty,
                format!("Property '{name}' of kind '{kind_name}' redefined"),
            )
        })
    }

    pub fn definition(&self, name: &str) -> Option<&PropertyDefinition> {
        self.definitions.get(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.definitions.values()
    }

    pub fn validate_assignment(
        &self,
        kind_name: &str,
        name: &str,
        value: Value,
    ) -> ResolvedAssignment {
        let Some(definition) = self.definitions.get(name) else {
            return ResolvedAssignment {
                value,
                diagnostic: Some(Diagnostic::new(
                    DiagnosticKind::UnknownProperty,
                    format!("Invalid property: '{name}' is not declared for kind '{kind_name}'"),
                )),
            };
        };
        if value.is_empty_sentinel() {
            if let Some(default) = definition.effective_default() {
                return ResolvedAssignment {
                    value: default.clone(),
                    diagnostic: None,
                };
            }
        }
        let diagnostic = (!definition.property_type.accepts(&value)).then(|| {
            Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                format!(
                    "Invalid type for property '{name}' of kind '{kind_name}': expected {}, got {}",
                    definition.property_type,
                    value.value_type()
                ),
            )
        });
        ResolvedAssignment { value, diagnostic }
    }

    /// Falls back to the schema default when the record holds no value.
    pub fn get(&self, name: &str, current: Option<&Value>) -> Option<Value> {
        match current {
            Some(value) => Some(value.clone()),
            None => self
                .definitions
                .get(name)
                .and_then(PropertyDefinition::effective_default)
                .cloned(),
        }
    }
}
