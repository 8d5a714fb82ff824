//! Runs validated statements against a shared namespace.
//!
//! Statements are interpreted over the fixed grammar in [`Action`]:
//! assignment, property assignment and expression evaluation. Execution is
//! strictly sequential and the first failing statement aborts the rest.

use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::config::{DEFAULT_MAX_CALL_DEPTH, LoadMode, SheetConfig};
use crate::diagnostics::{Diagnostic, Location};
use crate::error::{ExecutionError, RuntimeError};
use crate::generator::{GenerationBackend, GenerationRequest};
use crate::literal::{compare, comparator_operands, literal_value};
use crate::loader::Statement;
use crate::operation::{Builtin, Closure, Operation};
use crate::parser::{Action, ArithmeticOperator, Expression, Spanned};
use crate::record::RecordRef;
use crate::registry::KindRef;
use crate::value::Value;

type Locals = IndexMap<String, Value>;

/// Identifiers visible to statements.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    values: IndexMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Shortcut for reading a record bound to `name`.
    pub fn record(&self, name: &str) -> Option<&RecordRef> {
        match self.values.get(name) {
            Some(Value::Record(record)) => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Statements that completed.
    pub executed: usize,
    /// Lines written by `print`.
    pub output: Vec<String>,
    /// Schema diagnostics raised while running (lenient mode only).
    pub diagnostics: Vec<Diagnostic>,
}

pub struct SheetExecutor<'backend> {
    backend: &'backend mut dyn GenerationBackend,
    mode: LoadMode,
    max_call_depth: usize,
    depth: usize,
    location: Option<Location>,
    report: ExecutionReport,
}

impl<'backend> SheetExecutor<'backend> {
    pub fn new(backend: &'backend mut dyn GenerationBackend) -> Self {
        Self {
            backend,
            mode: LoadMode::default(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            depth: 0,
            location: None,
            report: ExecutionReport::default(),
        }
    }

    pub fn with_config(mut self, config: &SheetConfig) -> Self {
        self.mode = config.mode;
        self.max_call_depth = config.max_call_depth;
        self
    }

    pub fn report(&self) -> &ExecutionReport {
        &self.report
    }

    pub fn into_report(self) -> ExecutionReport {
        self.report
    }

    /// Runs every statement once, in order. On failure the report keeps
    /// whatever the earlier statements produced.
    pub fn execute(
        &mut self,
        statements: &[Statement],
        namespace: &mut Namespace,
    ) -> Result<(), ExecutionError> {
        for statement in statements {
            debug!(
                "Executing statement {} (line {}): {}",
                statement.index, statement.line, statement.text
            );
            self.location = Some(Location {
                line: statement.line,
                span: statement.offset + statement.action.span.start
                    ..statement.offset + statement.action.span.end,
            });
            self.depth = 0;
            self.run(&statement.action.node, namespace)
                .map_err(|source| ExecutionError::StatementFailed {
                    index: statement.index,
                    line: statement.line,
                    text: statement.text.clone(),
                    source,
                })?;
            self.report.executed += 1;
        }
        self.location = None;
        Ok(())
    }

    fn run(&mut self, action: &Action, namespace: &mut Namespace) -> Result<(), RuntimeError> {
        let locals = Locals::new();
        match action {
            Action::Assign { name, value } => {
                let value = self.evaluate(value, &locals, namespace)?;
                namespace.insert(name.clone(), value);
            }
            Action::SetProperty {
                target,
                property,
                value,
            } => {
                let record = match namespace.get(target) {
                    Some(Value::Record(record)) => record.clone(),
                    Some(other) => {
                        return Err(RuntimeError::TypeError {
                            expected: "record".to_owned(),
                            found: other.value_type(),
                        });
                    }
                    None => return Err(RuntimeError::UndefinedName(target.clone())),
                };
                let value = self.evaluate(value, &locals, namespace)?;
                self.set(&record, property, value)?;
            }
            Action::Evaluate(expression) => {
                self.evaluate(expression, &locals, namespace)?;
            }
        }
        Ok(())
    }

    /// Stores through the schema. Its diagnostic is fatal in strict mode.
    fn set(&mut self, record: &RecordRef, name: &str, value: Value) -> Result<(), RuntimeError> {
        let Some(mut diagnostic) = record.set(name, value) else {
            return Ok(());
        };
        if let Some(location) = &self.location {
            diagnostic = diagnostic.at(location.clone());
        }
        match self.mode {
            LoadMode::Strict => Err(RuntimeError::Rejected(diagnostic)),
            LoadMode::Lenient => {
                warn!("{diagnostic}");
                self.report.diagnostics.push(diagnostic);
                Ok(())
            }
        }
    }

    fn evaluate(
        &mut self,
        expression: &Spanned<Expression>,
        locals: &Locals,
        namespace: &Namespace,
    ) -> Result<Value, RuntimeError> {
        match &expression.node {
            Expression::Literal(literal) => Ok(literal_value(literal)),
            Expression::List { items } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.evaluate(item, locals, namespace)?);
                }
                Ok(Value::List(values))
            }
            Expression::Map { entries } => {
                let mut map = IndexMap::new();
                for entry in entries {
                    let value = self.evaluate(&entry.value, locals, namespace)?;
                    map.insert(entry.key.node.clone(), value);
                }
                Ok(Value::Map(map))
            }
            Expression::Reference(name) => lookup(name, locals, namespace)
                .ok_or_else(|| RuntimeError::UndefinedName(name.clone())),
            Expression::Attribute { target, name } => {
                let target = self.evaluate(target, locals, namespace)?;
                attribute(&target, name)
            }
            Expression::Call { callee, arguments } => {
                if let Expression::Reference(name) = &callee.node {
                    if lookup(name, locals, namespace).is_none() {
                        let arguments = self.evaluate_all(arguments, locals, namespace)?;
                        return self.call_global(name, arguments);
                    }
                }
                let callee = self.evaluate(callee, locals, namespace)?;
                let arguments = self.evaluate_all(arguments, locals, namespace)?;
                match callee {
                    Value::Kind(kind) => self.construct(&kind, arguments),
                    Value::Operation(operation) => {
                        self.call_operation("operation", &operation, None, arguments, namespace)
                    }
                    other => Err(RuntimeError::NotCallable(other.value_type())),
                }
            }
            Expression::MethodCall {
                receiver,
                method,
                arguments,
            } => {
                let receiver = self.evaluate(receiver, locals, namespace)?;
                let arguments = self.evaluate_all(arguments, locals, namespace)?;
                self.call_method(receiver, method, arguments, namespace)
            }
            Expression::Closure { parameters, body } => {
                Ok(Value::Operation(Rc::new(Operation::Closure(Closure {
                    parameters: parameters.clone(),
                    body: body.as_ref().clone(),
                }))))
            }
            Expression::ArithmeticOperator(operator) => match operator {
                ArithmeticOperator::Negate { operand } => {
                    Ok(self.evaluate(operand, locals, namespace)?.negate()?)
                }
                ArithmeticOperator::Add {
                    operand_a,
                    operand_b,
                } => {
                    let a = self.evaluate(operand_a, locals, namespace)?;
                    let b = self.evaluate(operand_b, locals, namespace)?;
                    Ok(a.add(&b)?)
                }
                ArithmeticOperator::Subtract {
                    operand_a,
                    operand_b,
                } => {
                    let a = self.evaluate(operand_a, locals, namespace)?;
                    let b = self.evaluate(operand_b, locals, namespace)?;
                    Ok(a.subtract(&b)?)
                }
                ArithmeticOperator::Multiply {
                    operand_a,
                    operand_b,
                } => {
                    let a = self.evaluate(operand_a, locals, namespace)?;
                    let b = self.evaluate(operand_b, locals, namespace)?;
                    Ok(a.multiply(&b)?)
                }
                ArithmeticOperator::Divide {
                    operand_a,
                    operand_b,
                } => {
                    let a = self.evaluate(operand_a, locals, namespace)?;
                    let b = self.evaluate(operand_b, locals, namespace)?;
                    Ok(a.divide(&b)?)
                }
            },
            Expression::Comparator(comparator) => {
                let (operand_a, operand_b) = comparator_operands(comparator);
                let a = self.evaluate(operand_a, locals, namespace)?;
                let b = self.evaluate(operand_b, locals, namespace)?;
                Ok(compare(comparator, &a, &b)?)
            }
        }
    }

    fn evaluate_all(
        &mut self,
        expressions: &[Spanned<Expression>],
        locals: &Locals,
        namespace: &Namespace,
    ) -> Result<Vec<Value>, RuntimeError> {
        expressions
            .iter()
            .map(|expression| self.evaluate(expression, locals, namespace))
            .collect()
    }

    fn call_global(&mut self, name: &str, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
        match name {
            "print" => {
                let line = arguments
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                debug!("print: {line}");
                self.report.output.push(line);
                Ok(Value::None)
            }
            "len" => {
                let [value] = expect_arguments::<1>("len", arguments)?;
                let length = match &value {
                    Value::Text(text) => text.chars().count(),
                    Value::List(items) => items.len(),
                    Value::Map(entries) => entries.len(),
                    other => {
                        return Err(RuntimeError::TypeError {
                            expected: "text, list or map".to_owned(),
                            found: other.value_type(),
                        });
                    }
                };
                Ok(Value::Integer(length as i64))
            }
            _ => Err(RuntimeError::UndefinedName(name.to_owned())),
        }
    }

    /// `Kind()` or `Kind({"name": value, ..})`.
    fn construct(&mut self, kind: &KindRef, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
        let record = kind.instantiate();
        match <[Value; 1]>::try_from(arguments) {
            Ok([Value::Map(properties)]) => {
                for (name, value) in properties {
                    self.set(&record, &name, value)?;
                }
            }
            Ok([other]) => {
                return Err(RuntimeError::TypeError {
                    expected: "map".to_owned(),
                    found: other.value_type(),
                });
            }
            Err(arguments) if arguments.is_empty() => {}
            Err(arguments) => {
                return Err(RuntimeError::ArityMismatch {
                    callee: kind.name(),
                    expected: 1,
                    found: arguments.len(),
                });
            }
        }
        Ok(Value::Record(record))
    }

    fn call_method(
        &mut self,
        receiver: Value,
        method: &str,
        arguments: Vec<Value>,
        namespace: &Namespace,
    ) -> Result<Value, RuntimeError> {
        match receiver {
            Value::Record(record) => {
                if let Some(operation) = record.operation(method) {
                    return self.call_operation(
                        method,
                        &operation,
                        Some(Value::Record(record)),
                        arguments,
                        namespace,
                    );
                }
                self.call_accessor(&record, method, arguments)
            }
            // `Prompt.toggle(prompt)`: the record is passed explicitly.
            Value::Kind(kind) => match kind.operation(method) {
                Some(operation) => {
                    self.call_operation(method, &operation, None, arguments, namespace)
                }
                None => Err(RuntimeError::UnknownOperation {
                    kind: kind.name(),
                    operation: method.to_owned(),
                }),
            },
            Value::Operation(operation) if method == "call" => {
                self.call_operation("operation", &operation, None, arguments, namespace)
            }
            other => Err(RuntimeError::UnknownAttribute {
                target: other.value_type(),
                name: method.to_owned(),
            }),
        }
    }

    /// `get`, `set` and `save`, answered by every record.
    fn call_accessor(
        &mut self,
        record: &RecordRef,
        method: &str,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        match method {
            "get" => {
                let [name] = expect_arguments::<1>("get", arguments)?;
                Ok(record.get(expect_text(&name)?))
            }
            "set" => {
                let [name, value] = expect_arguments::<2>("set", arguments)?;
                self.set(record, expect_text(&name)?, value)?;
                Ok(Value::None)
            }
            "save" => {
                let [path] = expect_arguments::<1>("save", arguments)?;
                let path = PathBuf::from(expect_text(&path)?);
                let json = Value::Record(record.clone()).to_json()?;
                let json = serde_json::to_string_pretty(&json)?;
                std::fs::write(&path, json).map_err(|source| RuntimeError::Save {
                    path: path.clone(),
                    source,
                })?;
                info!("Saved {} record to '{}'", record.kind_name(), path.display());
                Ok(Value::None)
            }
            _ => Err(RuntimeError::UnknownOperation {
                kind: record.kind_name(),
                operation: method.to_owned(),
            }),
        }
    }

    fn call_operation(
        &mut self,
        name: &str,
        operation: &Operation,
        receiver: Option<Value>,
        mut arguments: Vec<Value>,
        namespace: &Namespace,
    ) -> Result<Value, RuntimeError> {
        match operation {
            Operation::Closure(closure) => {
                let bound: Vec<Value> = receiver.into_iter().chain(arguments).collect();
                if bound.len() != closure.parameters.len() {
                    return Err(RuntimeError::ArityMismatch {
                        callee: name.to_owned(),
                        expected: closure.parameters.len(),
                        found: bound.len(),
                    });
                }
                if self.depth >= self.max_call_depth {
                    return Err(RuntimeError::CallDepthExceeded(self.max_call_depth));
                }
                let locals: Locals = closure.parameters.iter().cloned().zip(bound).collect();
                self.depth += 1;
                let result = self.evaluate(&closure.body, &locals, namespace);
                self.depth -= 1;
                result
            }
            Operation::Builtin(builtin) => {
                let receiver = match receiver {
                    Some(receiver) => receiver,
                    None if !arguments.is_empty() => arguments.remove(0),
                    None => return Err(RuntimeError::MissingReceiver(name.to_owned())),
                };
                let record = match receiver {
                    Value::Record(record) => record,
                    other => {
                        return Err(RuntimeError::TypeError {
                            expected: "record".to_owned(),
                            found: other.value_type(),
                        });
                    }
                };
                if arguments.len() != builtin.arity() {
                    return Err(RuntimeError::ArityMismatch {
                        callee: builtin.name().to_owned(),
                        expected: builtin.arity(),
                        found: arguments.len(),
                    });
                }
                self.call_builtin(*builtin, &record, arguments)
            }
        }
    }

    fn call_builtin(
        &mut self,
        builtin: Builtin,
        record: &RecordRef,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        match builtin {
            Builtin::IsPositive => Ok(Value::Boolean(
                record.get("polarity") == Value::from("positive"),
            )),
            Builtin::IsNegative => Ok(Value::Boolean(
                record.get("polarity") == Value::from("negative"),
            )),
            Builtin::Toggle => {
                let polarity = if record.get("polarity") == Value::from("positive") {
                    "negative"
                } else {
                    "positive"
                };
                self.set(record, "polarity", Value::from(polarity))?;
                Ok(Value::None)
            }
            Builtin::Generate => {
                let [prompt] = expect_arguments::<1>("generate", arguments)?;
                let request = generation_request(record, &prompt)?;
                debug!("Generation request: {request:?}");
                let artifact = self.backend.generate(&request)?;
                Ok(Value::Image(Rc::new(artifact)))
            }
            Builtin::ListEffects => {
                let kind = record.kind();
                let names = kind
                    .operation_names()
                    .into_iter()
                    .filter(|name| {
                        kind.operation(name)
                            .is_some_and(|operation| !operation.is_builtin())
                    })
                    .map(Value::Text)
                    .collect();
                Ok(Value::List(names))
            }
        }
    }
}

fn lookup(name: &str, locals: &Locals, namespace: &Namespace) -> Option<Value> {
    locals
        .get(name)
        .or_else(|| namespace.get(name))
        .cloned()
}

fn attribute(target: &Value, name: &str) -> Result<Value, RuntimeError> {
    let unknown = || RuntimeError::UnknownAttribute {
        target: target.value_type(),
        name: name.to_owned(),
    };
    match target {
        Value::Record(record) => record
            .lookup(name)
            .or_else(|| record.operation(name).map(Value::Operation))
            .ok_or_else(unknown),
        Value::Kind(kind) => kind
            .resolve(name)
            .or_else(|| kind.operation(name).map(Value::Operation))
            .ok_or_else(unknown),
        Value::Map(entries) => entries.get(name).cloned().ok_or_else(unknown),
        Value::Image(image) => match name {
            "model" => Ok(Value::Text(image.model.clone())),
            "prompt" => Ok(Value::Text(image.prompt.clone())),
            "width" => Ok(Value::Integer(i64::from(image.width))),
            "height" => Ok(Value::Integer(i64::from(image.height))),
            _ => Err(unknown()),
        },
        _ => Err(unknown()),
    }
}

fn generation_request(
    generator: &RecordRef,
    prompt: &Value,
) -> Result<GenerationRequest, RuntimeError> {
    let prompt = match prompt {
        Value::Text(text) => text.clone(),
        Value::Record(record) => match record.get("text") {
            Value::Text(text) => text,
            other => {
                return Err(RuntimeError::TypeError {
                    expected: "prompt text".to_owned(),
                    found: other.value_type(),
                });
            }
        },
        other => {
            return Err(RuntimeError::TypeError {
                expected: "text or prompt record".to_owned(),
                found: other.value_type(),
            });
        }
    };
    let model = match generator.get("model") {
        Value::Text(model) if !model.is_empty() => model,
        _ => {
            return Err(RuntimeError::MissingRequiredProperty {
                kind: generator.kind_name(),
                property: "model".to_owned(),
            });
        }
    };
    Ok(GenerationRequest {
        model,
        prompt,
        steps: count_property(generator, "steps")?,
        guidance: number_property(generator, "guidance")?,
        width: count_property(generator, "width")?,
        height: count_property(generator, "height")?,
    })
}

fn number_property(record: &RecordRef, name: &str) -> Result<f64, RuntimeError> {
    let value = record.get(name);
    value.as_f64().ok_or_else(|| RuntimeError::TypeError {
        expected: format!("number for '{name}'"),
        found: value.value_type(),
    })
}

/// Steps and pixel sizes: whole numbers from 1 to `u32::MAX`.
fn count_property(record: &RecordRef, name: &str) -> Result<u32, RuntimeError> {
    let number = number_property(record, name)?;
    if number.fract() == 0.0 && (1.0..=f64::from(u32::MAX)).contains(&number) {
        Ok(number as u32)
    } else {
        Err(RuntimeError::InvalidProperty {
            property: name.to_owned(),
            expected: "a positive whole number",
            found: record.get(name).to_string(),
        })
    }
}

fn expect_text(value: &Value) -> Result<&str, RuntimeError> {
    value.as_text().ok_or_else(|| RuntimeError::TypeError {
        expected: "text".to_owned(),
        found: value.value_type(),
    })
}

fn expect_arguments<const N: usize>(
    callee: &str,
    arguments: Vec<Value>,
) -> Result<[Value; N], RuntimeError> {
    <[Value; N]>::try_from(arguments).map_err(|arguments| RuntimeError::ArityMismatch {
        callee: callee.to_owned(),
        expected: N,
        found: arguments.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::DryRunBackend;
    use crate::loader::parse_sheet;

    fn run(source: &str) -> (Result<(), ExecutionError>, ExecutionReport, Namespace) {
        let sheet = parse_sheet(source);
        assert!(sheet.diagnostics.is_empty(), "{:?}", sheet.diagnostics);
        let mut namespace = Namespace::new();
        for kind in sheet.registry.kinds() {
            namespace.insert(kind.name(), Value::Kind(kind.clone()));
        }
        let mut backend = DryRunBackend::new();
        let mut executor = SheetExecutor::new(&mut backend);
        let result = executor.execute(&sheet.statements, &mut namespace);
        (result, executor.into_report(), namespace)
    }

    #[test]
    fn arithmetic_and_print() {
        let (result, report, namespace) = run("x = 2 + 3 * 4\ny = x / 4\nprint(\"x is\", x, y)\n");
        result.unwrap();
        assert_eq!(report.executed, 3);
        assert_eq!(report.output, ["x is 14 3.5"]);
        assert_eq!(namespace.get("x"), Some(&Value::Integer(14)));
    }

    #[test]
    fn statement_closures() {
        let (result, report, _) = run("double = |x| x * 2\nprint(double(21), len([1, 2]), len(\"abc\"))\n");
        result.unwrap();
        assert_eq!(report.output, ["42 2 3"]);
    }

    #[test]
    fn record_accessors() {
        let (result, report, namespace) = run(
            "obj Prompt:\n\
             Sheet Main:\n\
             p = Prompt({\"text\": \"a fox\"})\n\
             p.set(\"polarity\", \"negative\")\n\
             p.text = p.text + \" at dusk\"\n\
             print(p.get(\"text\"), p.is_negative())\n",
        );
        result.unwrap();
        assert_eq!(report.output, ["a fox at dusk True"]);
        let record = namespace.record("p").unwrap();
        assert_eq!(record.get("polarity"), Value::from("negative"));
    }

    #[test]
    fn kind_operations_take_explicit_record() {
        let (result, _, namespace) = run(
            "obj Prompt:\n\
             Sheet Main:\n\
             p = Prompt()\n\
             Prompt.toggle(p)\n",
        );
        result.unwrap();
        assert_eq!(namespace.record("p").unwrap().get("polarity"), Value::from("negative"));
    }

    #[test]
    fn failure_stops_execution() {
        let (result, report, namespace) = run("a = 1\nb = missing + 1\nc = 3\n");
        let error = result.unwrap_err();
        let ExecutionError::StatementFailed { index, line, text, source } = &error;
        assert_eq!((*index, *line, text.as_str()), (1, 2, "b = missing + 1"));
        assert!(matches!(source, RuntimeError::UndefinedName(name) if name == "missing"));
        assert_eq!(report.executed, 1);
        assert!(!namespace.contains("c"));
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let (result, _, _) = run("obj Effect:\nfunc: {\"loop\": |self| self.loop()}\nSheet Main:\ne = Effect()\ne.loop()\n");
        assert!(matches!(
            result.unwrap_err().runtime_error(),
            RuntimeError::CallDepthExceeded(DEFAULT_MAX_CALL_DEPTH)
        ));
    }

    #[test]
    fn arity_is_checked() {
        let (result, _, _) = run("obj Prompt:\nSheet Main:\np = Prompt()\np.toggle(1)\n");
        assert!(matches!(
            result.unwrap_err().runtime_error(),
            RuntimeError::ArityMismatch { expected: 0, found: 1, .. }
        ));
    }

    #[test]
    fn unknown_operation() {
        let (result, _, _) = run("obj Image:\nSheet Main:\ni = Image()\ni.resize(2)\n");
        assert!(matches!(
            result.unwrap_err().runtime_error(),
            RuntimeError::UnknownOperation { kind, operation } if kind == "Image" && operation == "resize"
        ));
    }

    #[test]
    fn lenient_set_collects_diagnostics() {
        let (result, report, _) = run("obj Prompt:\nSheet Main:\np = Prompt()\np.polarity = 3\np.color = \"red\"\n");
        result.unwrap();
        assert_eq!(report.diagnostics.len(), 2);
        assert_eq!(report.diagnostics[0].line(), Some(4));
    }

    #[test]
    fn effect_list_names_sheet_operations() {
        let (result, report, _) = run(
            "obj Effect:\n\
             func: {\"blur\": |self| self.strength, \"sharpen\": |self| 2}\n\
             Sheet Main:\n\
             print(Effect().list())\n",
        );
        result.unwrap();
        assert_eq!(report.output, ["[\"blur\", \"sharpen\"]"]);
    }
}
