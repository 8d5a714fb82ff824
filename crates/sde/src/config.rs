//! `sde.toml` settings for loading and running sheets.
//!
//! ```toml
//! mode = "strict"
//! max_call_depth = 32
//!
//! [generator]
//! known_models = ["sd-1.5"]
//!
//! [[property]]
//! kind = "Prompt"
//! name = "seed"
//! type = "number"
//! default = 42
//! ```

use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::diagnostics::Diagnostic;
use crate::registry::ObjectKindRegistry;
use crate::schema::{PropertyDefinition, PropertyType};
use crate::value::Value;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Diagnostics are reported and loading/execution carries on.
    #[default]
    Lenient,
    /// Any load diagnostic rejects the sheet; run-time schema diagnostics
    /// fail their statement.
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub known_models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PropertyConfig {
    pub kind: String,
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub default: Option<toml::Value>,
    #[serde(default)]
    pub required: bool,
}

impl PropertyConfig {
    pub fn to_definition(&self) -> PropertyDefinition {
        let mut definition = PropertyDefinition::new(&self.name, self.property_type);
        if let Some(default) = &self.default {
            definition = definition.with_default(toml_to_value(default));
        }
        if self.required {
            definition = definition.required();
        }
        definition
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    pub mode: LoadMode,
    pub max_call_depth: usize,
    pub generator: GeneratorConfig,
    #[serde(rename = "property")]
    pub properties: Vec<PropertyConfig>,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            mode: LoadMode::default(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            generator: GeneratorConfig::default(),
            properties: Vec::new(),
        }
    }
}

impl SheetConfig {
    pub fn strict() -> Self {
        Self {
            mode: LoadMode::Strict,
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn is_strict(&self) -> bool {
        self.mode == LoadMode::Strict
    }

    /// Registers the configured property definitions, returning any
    /// redefinition diagnostics.
    pub fn apply_properties(&self, registry: &mut ObjectKindRegistry) -> Vec<Diagnostic> {
        self.properties
            .iter()
            .filter_map(|property| registry.define(&property.kind, property.to_definition()))
            .collect()
    }
}

fn toml_to_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(text) => Value::Text(text.clone()),
        toml::Value::Integer(integer) => Value::Integer(*integer),
        toml::Value::Float(float) => Value::Float(*float),
        toml::Value::Boolean(boolean) => Value::Boolean(*boolean),
        toml::Value::Datetime(datetime) => Value::Text(datetime.to_string()),
        toml::Value::Array(items) => Value::List(items.iter().map(toml_to_value).collect()),
        toml::Value::Table(table) => Value::Map(
            table
                .iter()
                .map(|(key, value)| (key.clone(), toml_to_value(value)))
                .collect::<IndexMap<_, _>>(),
        ),
    }
}
