//! YAML sheet documents to sheet text.
//!
//! ```yaml
//! name: Main
//! objects:
//!   - kind: Prompt
//!     props:
//!       polarity: positive
//!     func:
//!       shout: "|self| self.text + '!'"
//! operations:
//!   - prompt = Prompt()
//!   - prompt.toggle()
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SheetDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub objects: Vec<ObjectDocument>,
    #[serde(default)]
    pub operations: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectDocument {
    pub kind: String,
    #[serde(default)]
    pub props: IndexMap<String, serde_yaml::Value>,
    /// Operation name to closure source, emitted verbatim.
    #[serde(default)]
    pub func: IndexMap<String, String>,
}

pub fn convert_file(yaml_path: &Path) -> Result<String> {
    let content = fs::read_to_string(yaml_path)
        .with_context(|| format!("Failed to read {}", yaml_path.display()))?;
    convert_str(&content).with_context(|| format!("Failed to convert {}", yaml_path.display()))
}

pub fn convert_str(content: &str) -> Result<String> {
    let document: SheetDocument =
        serde_yaml::from_str(content).context("Invalid YAML sheet document")?;
    to_sheet_text(&document)
}

pub fn to_sheet_text(document: &SheetDocument) -> Result<String> {
    let mut text = String::new();
    for object in &document.objects {
        writeln!(text, "obj {}:", object.kind)?;
        if !object.props.is_empty() {
            let mut entries = Vec::with_capacity(object.props.len());
            for (name, value) in &object.props {
                entries.push(format!("{}: {}", quote(name)?, literal(value)?));
            }
            writeln!(text, "props: {{{}}}", entries.join(", "))?;
        }
        if !object.func.is_empty() {
            let mut entries = Vec::with_capacity(object.func.len());
            for (name, body) in &object.func {
                if body.contains('\n') {
                    bail!("Operation '{name}' of {} spans several lines", object.kind);
                }
                entries.push(format!("{}: {}", quote(name)?, body.trim()));
            }
            writeln!(text, "func: {{{}}}", entries.join(", "))?;
        }
    }
    writeln!(text, "Sheet {}:", document.name.as_deref().unwrap_or("Main"))?;
    for operation in &document.operations {
        if operation.contains('\n') {
            bail!("Operation `{}` spans several lines", operation.trim());
        }
        writeln!(text, "{}", operation.trim())?;
    }
    Ok(text)
}

fn literal(value: &serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value;
    Ok(match value {
        Value::Null => "None".to_owned(),
        Value::Bool(true) => "True".to_owned(),
        Value::Bool(false) => "False".to_owned(),
        Value::Number(number) => {
            if number.as_f64().is_some_and(|float| !float.is_finite()) {
                bail!("Number {number} has no sheet literal");
            }
            number.to_string()
        }
        Value::String(string) => quote(string)?,
        Value::Sequence(items) => {
            let items = items.iter().map(literal).collect::<Result<Vec<_>>>()?;
            format!("[{}]", items.join(", "))
        }
        Value::Mapping(mapping) => {
            let mut entries = Vec::with_capacity(mapping.len());
            for (key, value) in mapping {
                let Value::String(key) = key else {
                    bail!("Map keys must be strings, found {key:?}");
                };
                entries.push(format!("{}: {}", quote(key)?, literal(value)?));
            }
            format!("{{{}}}", entries.join(", "))
        }
        Value::Tagged(tagged) => literal(&tagged.value)?,
    })
}

/// Sheet text has no escape sequences, so the quote style is picked to fit.
fn quote(text: &str) -> Result<String> {
    if text.contains('\n') {
        bail!("Text {text:?} spans several lines");
    }
    if !text.contains('"') {
        Ok(format!("\"{text}\""))
    } else if !text.contains('\'') {
        Ok(format!("'{text}'"))
    } else {
        bail!("Text {text:?} mixes both quote characters")
    }
}
