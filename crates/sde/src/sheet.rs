use std::path::{Path, PathBuf};

use convert_case::{Case, Casing};
use log::{info, warn};

use crate::config::SheetConfig;
use crate::diagnostics::{Diagnostic, render_diagnostics};
use crate::error::{ExecutionError, SheetError};
use crate::executor::{ExecutionReport, Namespace, SheetExecutor};
use crate::generator::GenerationBackend;
use crate::loader::{SheetParser, Statement};
use crate::registry::ObjectKindRegistry;
use crate::value::Value;

/// A loaded sheet: its kinds, its validated statements and everything that
/// was reported while reading it.
#[derive(Debug)]
pub struct Sheet {
    source_path: Option<PathBuf>,
    source: String,
    name: Option<String>,
    registry: ObjectKindRegistry,
    statements: Vec<Statement>,
    diagnostics: Vec<Diagnostic>,
    config: SheetConfig,
}

impl Sheet {
    pub fn load(path: impl AsRef<Path>, config: SheetConfig) -> Result<Self, SheetError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SheetError::Read {
            path: path.to_owned(),
            source,
        })?;
        let mut sheet = Self::from_source(source, config)?;
        sheet.source_path = Some(path.to_owned());
        Ok(sheet)
    }

    /// In strict mode any diagnostic rejects the sheet.
    pub fn from_source(source: impl Into<String>, config: SheetConfig) -> Result<Self, SheetError> {
        let source = source.into();
        let mut registry = ObjectKindRegistry::new();
        let mut diagnostics = config.apply_properties(&mut registry);
        let parsed = SheetParser::with_registry(registry).parse(&source);
        diagnostics.extend(parsed.diagnostics);

        for diagnostic in &diagnostics {
            warn!("{diagnostic}");
        }
        if config.is_strict() && !diagnostics.is_empty() {
            return Err(SheetError::Rejected { diagnostics });
        }
        info!(
            "Loaded sheet {} with {} kind(s) and {} statement(s)",
            parsed.name.as_deref().unwrap_or("<unnamed>"),
            parsed.registry.len(),
            parsed.statements.len()
        );
        Ok(Self {
            source_path: None,
            source,
            name: parsed.name,
            registry: parsed.registry,
            statements: parsed.statements,
            diagnostics,
            config,
        })
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn registry(&self) -> &ObjectKindRegistry {
        &self.registry
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    pub fn render_diagnostics(&self) -> String {
        let filename = self
            .source_path
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<sheet>".to_owned());
        render_diagnostics(&filename, &self.source, &self.diagnostics)
    }

    /// A fresh namespace: every kind under its own name, plus one new record
    /// per kind under the snake_case name (`Prompt` -> `prompt`).
    pub fn namespace(&self) -> Namespace {
        let mut namespace = Namespace::new();
        for kind in self.registry.kinds() {
            let name = kind.name();
            let record_name = name.to_case(Case::Snake);
            namespace.insert(name.clone(), Value::Kind(kind.clone()));
            if record_name != name {
                namespace.insert(record_name, Value::Record(kind.instantiate()));
            }
        }
        namespace
    }

    pub fn executor<'backend>(
        &self,
        backend: &'backend mut dyn GenerationBackend,
    ) -> SheetExecutor<'backend> {
        SheetExecutor::new(backend).with_config(&self.config)
    }

    /// Runs all statements against a fresh [`Self::namespace`].
    pub fn execute(
        &self,
        backend: &mut dyn GenerationBackend,
    ) -> Result<ExecutionReport, ExecutionError> {
        let mut namespace = self.namespace();
        self.execute_in(&mut namespace, backend)
    }

    pub fn execute_in(
        &self,
        namespace: &mut Namespace,
        backend: &mut dyn GenerationBackend,
    ) -> Result<ExecutionReport, ExecutionError> {
        let mut executor = self.executor(backend);
        executor.execute(&self.statements, namespace)?;
        Ok(executor.into_report())
    }
}
