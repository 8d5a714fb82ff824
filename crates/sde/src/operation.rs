use std::fmt;

use crate::parser::{Expression, Spanned};

/// A named behavior attached to a kind and callable on its records.
#[derive(Debug, Clone)]
pub enum Operation {
    Builtin(Builtin),
    Closure(Closure),
}

/// `|self, x| body` from a `func:` line or a statement. When called as a
/// method the receiver binds to the first parameter.
#[derive(Debug, Clone)]
pub struct Closure {
    pub parameters: Vec<String>,
    pub body: Spanned<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    IsPositive,
    IsNegative,
    Toggle,
    Generate,
    ListEffects,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Self::IsPositive => "is_positive",
            Self::IsNegative => "is_negative",
            Self::Toggle => "toggle",
            Self::Generate => "generate",
            Self::ListEffects => "list",
        }
    }

    /// Number of arguments after the receiver.
    pub fn arity(self) -> usize {
        match self {
            Self::Generate => 1,
            Self::IsPositive | Self::IsNegative | Self::Toggle | Self::ListEffects => 0,
        }
    }

    pub fn for_kind(kind_name: &str) -> &'static [Builtin] {
        match kind_name {
            "Prompt" => &[Self::IsPositive, Self::IsNegative, Self::Toggle],
            "Generator" => &[Self::Generate],
            "Effect" => &[Self::ListEffects],
            _ => &[],
        }
    }
}

impl Operation {
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin(_))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(builtin) => write!(f, "builtin operation {}", builtin.name()),
            Self::Closure(closure) => write!(f, "closure |{}|", closure.parameters.join(", ")),
        }
    }
}
