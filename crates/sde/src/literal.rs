//! Restricted evaluation of `props:` and `func:` payloads.
//!
//! Declarations may build literals and collections, reference values that
//! are already declared, do arithmetic and define closures. Calls of any kind
//! are rejected, so loading a sheet never runs code from it.

use std::cmp::Ordering;
use std::ops::Range;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::operation::{Closure, Operation};
use crate::parser::{ArithmeticOperator, Comparator, Expression, Literal, Spanned};
use crate::registry::{KindRef, ObjectKindRegistry};
use crate::value::{OperatorError, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralError {
    pub message: String,
    /// Byte range within the evaluated payload.
    pub span: Range<usize>,
}

impl LiteralError {
    fn new(message: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// Names visible to a declaration: the current kind's own values first, then
/// every declared kind.
pub struct DeclarationContext<'a> {
    pub current: Option<&'a KindRef>,
    pub registry: &'a ObjectKindRegistry,
}

impl DeclarationContext<'_> {
    fn reference(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.current.and_then(|kind| kind.defaults().get(name).cloned()) {
            return Some(value);
        }
        self.registry.kind(name).cloned().map(Value::Kind)
    }
}

pub fn evaluate(
    expression: &Spanned<Expression>,
    context: &DeclarationContext,
) -> Result<Value, LiteralError> {
    let span = expression.span.into_range();
    let operator_error = |error: OperatorError| LiteralError::new(error.to_string(), span.clone());
    match &expression.node {
        Expression::Literal(literal) => Ok(literal_value(literal)),
        Expression::List { items } => items
            .iter()
            .map(|item| evaluate(item, context))
            .collect::<Result<_, _>>()
            .map(Value::List),
        Expression::Map { entries } => {
            let mut map = IndexMap::new();
            for entry in entries {
                map.insert(entry.key.node.clone(), evaluate(&entry.value, context)?);
            }
            Ok(Value::Map(map))
        }
        Expression::Reference(name) => context
            .reference(name)
            .ok_or_else(|| {
                LiteralError::new(format!("name '{name}' is not defined"), span.clone())
            }),
        Expression::Attribute { target, name } => match evaluate(target, context)? {
            Value::Kind(kind) => kind.resolve(name).ok_or_else(|| {
                LiteralError::new(
                    format!("kind '{}' has no property '{name}'", kind.name()),
                    span.clone(),
                )
            }),
            Value::Map(map) => map.get(name).cloned().ok_or_else(|| {
                LiteralError::new(format!("map has no key '{name}'"), span.clone())
            }),
            other => Err(LiteralError::new(
                format!("{} has no attribute '{name}'", other.value_type()),
                span.clone(),
            )),
        },
        Expression::Closure { parameters, body } => {
            Ok(Value::Operation(Rc::new(Operation::Closure(Closure {
                parameters: parameters.clone(),
                body: body.as_ref().clone(),
            }))))
        }
        Expression::Call { .. } | Expression::MethodCall { .. } => Err(LiteralError::new(
            "calls are not allowed in declarations",
            span.clone(),
        )),
        Expression::ArithmeticOperator(operator) => match operator {
            ArithmeticOperator::Negate { operand } => {
                evaluate(operand, context)?.negate().map_err(operator_error)
            }
            ArithmeticOperator::Add {
                operand_a,
                operand_b,
            } => evaluate(operand_a, context)?
                .add(&evaluate(operand_b, context)?)
                .map_err(operator_error),
            ArithmeticOperator::Subtract {
                operand_a,
                operand_b,
            } => evaluate(operand_a, context)?
                .subtract(&evaluate(operand_b, context)?)
                .map_err(operator_error),
            ArithmeticOperator::Multiply {
                operand_a,
                operand_b,
            } => evaluate(operand_a, context)?
                .multiply(&evaluate(operand_b, context)?)
                .map_err(operator_error),
            ArithmeticOperator::Divide {
                operand_a,
                operand_b,
            } => evaluate(operand_a, context)?
                .divide(&evaluate(operand_b, context)?)
                .map_err(operator_error),
        },
        Expression::Comparator(comparator) => {
            let (operand_a, operand_b) = comparator_operands(comparator);
            let a = evaluate(operand_a, context)?;
            let b = evaluate(operand_b, context)?;
            compare(comparator, &a, &b).map_err(operator_error)
        }
    }
}

pub(crate) fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Integer(integer) => Value::Integer(*integer),
        Literal::Float(float) => Value::Float(*float),
        Literal::Text(text) => Value::Text(text.clone()),
        Literal::Boolean(boolean) => Value::Boolean(*boolean),
        Literal::None => Value::None,
    }
}

pub(crate) fn comparator_operands(
    comparator: &Comparator,
) -> (&Spanned<Expression>, &Spanned<Expression>) {
    match comparator {
        Comparator::Equal {
            operand_a,
            operand_b,
        }
        | Comparator::NotEqual {
            operand_a,
            operand_b,
        }
        | Comparator::Greater {
            operand_a,
            operand_b,
        }
        | Comparator::GreaterOrEqual {
            operand_a,
            operand_b,
        }
        | Comparator::Less {
            operand_a,
            operand_b,
        }
        | Comparator::LessOrEqual {
            operand_a,
            operand_b,
        } => (operand_a, operand_b),
    }
}

pub(crate) fn compare(
    comparator: &Comparator,
    a: &Value,
    b: &Value,
) -> Result<Value, OperatorError> {
    let result = match comparator {
        Comparator::Equal { .. } => a == b,
        Comparator::NotEqual { .. } => a != b,
        Comparator::Greater { .. } => a.compare(b)? == Ordering::Greater,
        Comparator::GreaterOrEqual { .. } => a.compare(b)? != Ordering::Less,
        Comparator::Less { .. } => a.compare(b)? == Ordering::Less,
        Comparator::LessOrEqual { .. } => a.compare(b)? != Ordering::Greater,
    };
    Ok(Value::Boolean(result))
}
