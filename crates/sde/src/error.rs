use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::diagnostics::Diagnostic;
use crate::generator::GenerationError;
use crate::value::{CircularReference, OperatorError, ValueType};

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to read sheet '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("sheet rejected in strict mode with {} diagnostic(s)", diagnostics.len())]
    Rejected { diagnostics: Vec<Diagnostic> },
}

/// The first statement that failed at run time. Remaining statements were not
/// executed.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("statement {index} (line {line}) failed: `{text}`")]
    StatementFailed {
        index: usize,
        line: usize,
        text: String,
        #[source]
        source: RuntimeError,
    },
}

impl ExecutionError {
    pub fn runtime_error(&self) -> &RuntimeError {
        match self {
            Self::StatementFailed { source, .. } => source,
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("name '{0}' is not defined")]
    UndefinedName(String),
    #[error("{0} is not callable")]
    NotCallable(ValueType),
    #[error("'{kind}' record has no operation '{operation}'")]
    UnknownOperation { kind: String, operation: String },
    #[error("{target} has no attribute '{name}'")]
    UnknownAttribute { target: ValueType, name: String },
    #[error("operation '{0}' needs a record to be called on")]
    MissingReceiver(String),
    #[error("{callee} takes {expected} argument(s) but {found} were given")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },
    #[error("expected {expected}, found {found}")]
    TypeError { expected: String, found: ValueType },
    #[error("required property '{property}' of kind '{kind}' has no value")]
    MissingRequiredProperty { kind: String, property: String },
    #[error("property '{property}' must be {expected}, found {found}")]
    InvalidProperty {
        property: String,
        expected: &'static str,
        found: String,
    },
    #[error("maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),
    #[error(transparent)]
    Operator(#[from] OperatorError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("failed to save record to '{}'", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    CircularReference(#[from] CircularReference),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(Diagnostic),
}
