//! Runtime values shared by the declaration evaluator and the executor.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::generator::ImageArtifact;
use crate::operation::Operation;
use crate::record::RecordRef;
use crate::registry::KindRef;

#[derive(Clone)]
pub enum Value {
    None,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Kind(KindRef),
    Record(RecordRef),
    Operation(Rc<Operation>),
    Image(Rc<ImageArtifact>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    None,
    Boolean,
    Integer,
    Float,
    Text,
    List,
    Map,
    Kind,
    Record,
    Operation,
    Image,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::List => "list",
            Self::Map => "map",
            Self::Kind => "kind",
            Self::Record => "record",
            Self::Operation => "operation",
            Self::Image => "image",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    Compare,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Subtract | Self::Negate => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Compare => "comparison",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OperatorError {
    #[error("unsupported operand types for {operator}: {left} and {right}")]
    Unsupported {
        operator: Operator,
        left: ValueType,
        right: ValueType,
    },
    #[error("bad operand type for unary -: {0}")]
    UnsupportedUnary(ValueType),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in {0}")]
    Overflow(Operator),
}

/// A record reached again while it is still being serialized.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("circular reference through a '{kind}' record")]
pub struct CircularReference {
    pub kind: String,
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::None => ValueType::None,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Integer(_) => ValueType::Integer,
            Self::Float(_) => ValueType::Float,
            Self::Text(_) => ValueType::Text,
            Self::List(_) => ValueType::List,
            Self::Map(_) => ValueType::Map,
            Self::Kind(_) => ValueType::Kind,
            Self::Record(_) => ValueType::Record,
            Self::Operation(_) => ValueType::Operation,
            Self::Image(_) => ValueType::Image,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(integer) => Some(*integer as f64),
            Self::Float(float) => Some(*float),
            _ => None,
        }
    }

    /// The "empty" sentinel that a schema default may stand in for.
    pub fn is_empty_sentinel(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Boolean(boolean) => *boolean,
            Self::Integer(integer) => *integer != 0,
            Self::Float(float) => *float != 0.0,
            Self::Text(text) => !text.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
            Self::Kind(_) | Self::Record(_) | Self::Operation(_) | Self::Image(_) => true,
        }
    }

    pub fn add(&self, other: &Self) -> Result<Self, OperatorError> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a
                .checked_add(*b)
                .map(Self::Integer)
                .ok_or(OperatorError::Overflow(Operator::Add)),
            (Self::Text(a), Self::Text(b)) => Ok(Self::Text(format!("{a}{b}"))),
            (Self::List(a), Self::List(b)) => {
                Ok(Self::List(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => self.float_operation(other, Operator::Add, |a, b| a + b),
        }
    }

    pub fn subtract(&self, other: &Self) -> Result<Self, OperatorError> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a
                .checked_sub(*b)
                .map(Self::Integer)
                .ok_or(OperatorError::Overflow(Operator::Subtract)),
            _ => self.float_operation(other, Operator::Subtract, |a, b| a - b),
        }
    }

    pub fn multiply(&self, other: &Self) -> Result<Self, OperatorError> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a
                .checked_mul(*b)
                .map(Self::Integer)
                .ok_or(OperatorError::Overflow(Operator::Multiply)),
            _ => self.float_operation(other, Operator::Multiply, |a, b| a * b),
        }
    }

    /// True division: the result is always a float.
    pub fn divide(&self, other: &Self) -> Result<Self, OperatorError> {
        if other.as_f64() == Some(0.0) && self.as_f64().is_some() {
            return Err(OperatorError::DivisionByZero);
        }
        self.float_operation(other, Operator::Divide, |a, b| a / b)
    }

    pub fn negate(&self) -> Result<Self, OperatorError> {
        match self {
            Self::Integer(integer) => integer
                .checked_neg()
                .map(Self::Integer)
                .ok_or(OperatorError::Overflow(Operator::Negate)),
            Self::Float(float) => Ok(Self::Float(-float)),
            other => Err(OperatorError::UnsupportedUnary(other.value_type())),
        }
    }

    pub fn compare(&self, other: &Self) -> Result<Ordering, OperatorError> {
        let ordering = match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        };
        ordering.ok_or(OperatorError::Unsupported {
            operator: Operator::Compare,
            left: self.value_type(),
            right: other.value_type(),
        })
    }

    fn float_operation(
        &self,
        other: &Self,
        operator: Operator,
        operation: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, OperatorError> {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => Ok(Self::Float(operation(a, b))),
            _ => Err(OperatorError::Unsupported {
                operator,
                left: self.value_type(),
                right: other.value_type(),
            }),
        }
    }

    /// JSON view used by `save`. Records nest as `{"kind", "properties"}`;
    /// a record that contains itself, directly or not, is an error.
    pub fn to_json(&self) -> Result<serde_json::Value, CircularReference> {
        self.to_json_within(&mut Vec::new())
    }

    fn to_json_within(
        &self,
        open: &mut Vec<RecordRef>,
    ) -> Result<serde_json::Value, CircularReference> {
        use serde_json::Value as Json;
        Ok(match self {
            Self::None => Json::Null,
            Self::Boolean(boolean) => Json::Bool(*boolean),
            Self::Integer(integer) => Json::from(*integer),
            Self::Float(float) => Json::from(*float),
            Self::Text(text) => Json::String(text.clone()),
            Self::List(items) => Json::Array(
                items
                    .iter()
                    .map(|item| item.to_json_within(open))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), value.to_json_within(open)?)))
                    .collect::<Result<_, CircularReference>>()?,
            ),
            Self::Kind(kind) => Json::String(kind.name()),
            Self::Record(record) => {
                if open.iter().any(|outer| outer.ptr_eq(record)) {
                    return Err(CircularReference {
                        kind: record.kind_name(),
                    });
                }
                open.push(record.clone());
                let properties = record
                    .resolved_properties()
                    .into_iter()
                    .map(|(key, value)| Ok((key, value.to_json_within(open)?)))
                    .collect::<Result<serde_json::Map<_, _>, CircularReference>>();
                open.pop();
                serde_json::json!({
                    "kind": record.kind_name(),
                    "properties": Json::Object(properties?),
                })
            }
            Self::Operation(_) => Json::String("<operation>".to_owned()),
            Self::Image(image) => serde_json::to_value(image.as_ref()).unwrap_or(Json::Null),
        })
    }

    fn write_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Kind(a), Self::Kind(b)) => a.ptr_eq(b),
            (Self::Record(a), Self::Record(b)) => a.ptr_eq(b),
            (Self::Operation(a), Self::Operation(b)) => Rc::ptr_eq(a, b),
            (Self::Image(a), Self::Image(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Boolean(true) => f.write_str("True"),
            Self::Boolean(false) => f.write_str("False"),
            Self::Integer(integer) => write!(f, "{integer}"),
            Self::Float(float) if float.fract() == 0.0 && float.is_finite() => {
                write!(f, "{float:.1}")
            }
            Self::Float(float) => write!(f, "{float}"),
            Self::Text(text) => f.write_str(text),
            Self::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    item.write_nested(f)?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: ")?;
                    value.write_nested(f)?;
                }
                f.write_str("}")
            }
            Self::Kind(kind) => write!(f, "<kind {}>", kind.name()),
            Self::Record(record) => write!(f, "<{} record>", record.kind_name()),
            Self::Operation(operation) => write!(f, "<{operation}>"),
            Self::Image(image) => write!(
                f,
                "<image {}x{} from {}>",
                image.width, image.height, image.model
            ),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "Text({text:?})"),
            other => write!(f, "{}({other})", other.value_type()),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<i64> for Value {
    fn from(integer: i64) -> Self {
        Self::Integer(integer)
    }
}

impl From<f64> for Value {
    fn from(float: f64) -> Self {
        Self::Float(float)
    }
}

impl From<bool> for Value {
    fn from(boolean: bool) -> Self {
        Self::Boolean(boolean)
    }
}
