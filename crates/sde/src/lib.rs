//! Loader and execution engine for SDE sheets.
//!
//! A sheet declares object kinds (`obj Prompt:`), their property values
//! (`props:`) and operations (`func:`), then lists statements to run against
//! records of those kinds:
//!
//! ```text
//! obj Prompt:
//! props: {"polarity": "positive"}
//! Sheet Main:
//! prompt = Prompt()
//! prompt.toggle()
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod generator;
pub mod literal;
pub mod loader;
pub mod operation;
pub mod parser;
pub mod record;
pub mod registry;
pub mod schema;
pub mod sheet;
pub mod value;

pub use config::{ConfigError, LoadMode, SheetConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, Location, render_diagnostics};
pub use error::{ExecutionError, RuntimeError, SheetError};
pub use executor::{ExecutionReport, Namespace, SheetExecutor};
pub use generator::{
    DryRunBackend, GenerationBackend, GenerationError, GenerationRequest, ImageArtifact,
    UnavailableBackend,
};
pub use loader::{ParsedSheet, SheetParser, Statement, parse_sheet};
pub use operation::{Builtin, Closure, Operation};
pub use record::RecordRef;
pub use registry::{CANONICAL_KINDS, KindRef, ObjectKindRegistry};
pub use schema::{PropertyDefinition, PropertySchema, PropertyType};
pub use sheet::Sheet;
pub use value::Value;
