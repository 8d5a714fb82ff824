//! Object kinds declared by `obj <Name>:` lines.
//!
//! A kind is shared through a [`KindRef`]: every record keeps a handle to
//! its kind rather than a copy, so operations attached after a record was
//! created are visible on that record too.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::operation::{Builtin, Operation};
use crate::record::RecordRef;
use crate::schema::{PropertyDefinition, PropertySchema, PropertyType, ResolvedAssignment};
use crate::value::Value;

pub const CANONICAL_KINDS: [&str; 5] = ["Prompt", "Generator", "Control", "Effect", "Image"];

#[derive(Debug)]
pub struct KindDefinition {
    name: String,
    schema: PropertySchema,
    defaults: IndexMap<String, Value>,
    operations: IndexMap<String, Rc<Operation>>,
}

#[derive(Clone)]
pub struct KindRef(Rc<RefCell<KindDefinition>>);

impl KindRef {
    fn new(name: &str, schema: PropertySchema) -> Self {
        let operations = Builtin::for_kind(name)
            .iter()
            .map(|builtin| (builtin.name().to_owned(), Rc::new(Operation::Builtin(*builtin))))
            .collect();
        Self(Rc::new(RefCell::new(KindDefinition {
            name: name.to_owned(),
            schema,
            defaults: IndexMap::new(),
            operations,
        })))
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn schema(&self) -> Ref<'_, PropertySchema> {
        Ref::map(self.0.borrow(), |kind| &kind.schema)
    }

    pub fn define(&self, definition: PropertyDefinition) -> Option<Diagnostic> {
        let mut kind = self.0.borrow_mut();
        let KindDefinition { name, schema, .. } = &mut *kind;
        schema.define(name, definition)
    }

    pub fn validate_assignment(&self, name: &str, value: Value) -> ResolvedAssignment {
        let kind = self.0.borrow();
        kind.schema.validate_assignment(&kind.name, name, value)
    }

    /// Kind-level property values from the last `props:` line.
    pub fn defaults(&self) -> IndexMap<String, Value> {
        self.0.borrow().defaults.clone()
    }

    /// Bulk replace, never merge.
    pub fn replace_defaults(&self, defaults: IndexMap<String, Value>) {
        self.0.borrow_mut().defaults = defaults;
    }

    /// Value of `name` for a record that holds none itself: the kind-level
    /// value, then the schema default. A declared property with neither
    /// resolves to `None`; an undeclared one to nothing at all.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        let kind = self.0.borrow();
        if let Some(value) = kind.defaults.get(name) {
            return Some(value.clone());
        }
        kind.schema
            .definition(name)
            .map(|definition| definition.effective_default().cloned().unwrap_or(Value::None))
    }

    pub fn attach_operation(&self, name: &str, operation: Operation) -> Option<Rc<Operation>> {
        self.0
            .borrow_mut()
            .operations
            .insert(name.to_owned(), Rc::new(operation))
    }

    pub fn operation(&self, name: &str) -> Option<Rc<Operation>> {
        self.0.borrow().operations.get(name).cloned()
    }

    pub fn operation_names(&self) -> Vec<String> {
        self.0.borrow().operations.keys().cloned().collect()
    }

    pub fn instantiate(&self) -> RecordRef {
        RecordRef::new(self.clone())
    }
}

impl fmt::Debug for KindRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KindRef({})", self.name())
    }
}

/// Built-in schema for the canonical kinds. `Concept` is built in too but
/// carries no properties and sits outside the canonical order. Any other
/// name starts empty.
pub fn builtin_schema(kind_name: &str) -> PropertySchema {
    let definitions = match kind_name {
        "Prompt" => vec![
            PropertyDefinition::new("text", PropertyType::Text).with_default(""),
            PropertyDefinition::new("polarity", PropertyType::Text).with_default("positive"),
        ],
        "Generator" => vec![
            PropertyDefinition::new("model", PropertyType::Text).required(),
            PropertyDefinition::new("steps", PropertyType::Number).with_default(50i64),
            PropertyDefinition::new("guidance", PropertyType::Number).with_default(7.5),
            PropertyDefinition::new("width", PropertyType::Number).with_default(512i64),
            PropertyDefinition::new("height", PropertyType::Number).with_default(512i64),
        ],
        "Control" | "Effect" => {
            vec![PropertyDefinition::new("strength", PropertyType::Number).with_default(1.0)]
        }
        "Image" => vec![
            PropertyDefinition::new("width", PropertyType::Number).with_default(512i64),
            PropertyDefinition::new("height", PropertyType::Number).with_default(512i64),
            PropertyDefinition::new("path", PropertyType::Text).with_default(""),
        ],
        "Concept" => Vec::new(),
        _ => {
            debug!("'{kind_name}' is a sheet-defined kind");
            Vec::new()
        }
    };
    let mut schema = PropertySchema::new();
    for definition in definitions {
        schema.define(kind_name, definition);
    }
    schema
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderCheck {
    InOrder,
    OutOfOrder { expected: &'static str },
    /// All canonical slots are used up; the declaration is not checked.
    Unchecked,
}

/// Tracks declarations against [`CANONICAL_KINDS`].
///
/// Every declaration advances one slot. A canonical kind is out of order when
/// a canonically later kind was declared before it; a non-canonical name is
/// always out of order. After the fifth declaration checking stops.
#[derive(Debug, Clone, Default)]
pub struct DeclarationOrder {
    position: usize,
    furthest: Option<usize>,
}

impl DeclarationOrder {
    pub fn advance(&mut self, name: &str) -> OrderCheck {
        let Some(expected) = CANONICAL_KINDS.get(self.position).copied() else {
            self.position += 1;
            return OrderCheck::Unchecked;
        };
        self.position += 1;
        match CANONICAL_KINDS.iter().position(|kind| *kind == name) {
            Some(index) if self.furthest.is_some_and(|furthest| index < furthest) => {
                OrderCheck::OutOfOrder { expected }
            }
            Some(index) => {
                self.furthest = Some(self.furthest.map_or(index, |furthest| furthest.max(index)));
                OrderCheck::InOrder
            }
            None => OrderCheck::OutOfOrder { expected },
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.position >= CANONICAL_KINDS.len()
    }
}

#[derive(Debug, Default)]
pub struct ObjectKindRegistry {
    kinds: IndexMap<String, KindRef>,
    /// Definitions registered through [`Self::define`] for kinds not yet
    /// declared, applied on top of the built-in schema at declaration.
    pending: IndexMap<String, Vec<PropertyDefinition>>,
    order: DeclarationOrder,
}

impl ObjectKindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `name`, replacing any earlier kind of that name. Returns the
    /// new kind and the order/duplicate diagnostics it raised.
    pub fn declare_kind(&mut self, name: &str) -> (KindRef, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        match self.order.advance(name) {
            OrderCheck::InOrder => {}
            OrderCheck::OutOfOrder { expected } => diagnostics.push(Diagnostic::new(
                DiagnosticKind::OutOfOrderDeclaration,
                format!("Expected {expected}, got {name}"),
            )),
            OrderCheck::Unchecked => debug!("Kind '{name}' declared past the canonical order"),
        }

        let mut schema = builtin_schema(name);
        for definition in self.pending.get(name).into_iter().flatten() {
            schema.define(name, definition.clone());
        }
        let kind = KindRef::new(name, schema);
        if self.kinds.insert(name.to_owned(), kind.clone()).is_some() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::DuplicateKind,
                format!("Kind '{name}' is already declared"),
            ));
        }
        (kind, diagnostics)
    }

    /// Registers a property definition for `kind_name`, whether or not the
    /// kind has been declared yet.
    pub fn define(
        &mut self,
        kind_name: &str,
        definition: PropertyDefinition,
    ) -> Option<Diagnostic> {
        let pending = self.pending.entry(kind_name.to_owned()).or_default();
        let duplicate = pending.iter().position(|existing| existing.name == definition.name);
        match duplicate {
            Some(index) => pending[index] = definition.clone(),
            None => pending.push(definition.clone()),
        }
        match self.kinds.get(kind_name) {
            Some(kind) => kind.define(definition),
            None => duplicate.map(|_| {
                Diagnostic::new(
                    DiagnosticKind::DuplicateProperty,
                    format!("Property '{}' of kind '{kind_name}' redefined", definition.name),
                )
            }),
        }
    }

    pub fn kind(&self, name: &str) -> Option<&KindRef> {
        self.kinds.get(name)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &KindRef> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn validate_assignment(
        &self,
        kind_name: &str,
        name: &str,
        value: Value,
    ) -> Result<ResolvedAssignment, Diagnostic> {
        self.kinds
            .get(kind_name)
            .map(|kind| kind.validate_assignment(name, value))
            .ok_or_else(|| unknown_kind(kind_name))
    }

    /// Installs or replaces `operation_name` on every existing and future
    /// record of the kind.
    pub fn attach_operation(
        &self,
        kind_name: &str,
        operation_name: &str,
        operation: Operation,
    ) -> Result<Option<Rc<Operation>>, Diagnostic> {
        self.kinds
            .get(kind_name)
            .map(|kind| kind.attach_operation(operation_name, operation))
            .ok_or_else(|| unknown_kind(kind_name))
    }

    pub fn instantiate(&self, kind_name: &str) -> Result<RecordRef, Diagnostic> {
        self.kinds
            .get(kind_name)
            .map(KindRef::instantiate)
            .ok_or_else(|| unknown_kind(kind_name))
    }
}

fn unknown_kind(kind_name: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::UnknownKind,
        format!("Kind '{kind_name}' is not declared"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_diagnostics(names: &[&str]) -> usize {
        let mut registry = ObjectKindRegistry::new();
        names
            .iter()
            .flat_map(|name| registry.declare_kind(name).1)
            .filter(|diagnostic| diagnostic.kind == DiagnosticKind::OutOfOrderDeclaration)
            .count()
    }

    #[test]
    fn canonical_order_is_clean() {
        assert_eq!(order_diagnostics(&CANONICAL_KINDS), 0);
        assert_eq!(order_diagnostics(&["Prompt", "Effect", "Image"]), 0);
    }

    #[test]
    fn concept_is_built_in_and_empty() {
        let mut registry = ObjectKindRegistry::new();
        for name in CANONICAL_KINDS {
            registry.declare_kind(name);
        }
        let (concept, diagnostics) = registry.declare_kind("Concept");
        assert!(diagnostics.is_empty());
        assert_eq!(concept.schema().definitions().count(), 0);
        assert!(concept.operation_names().is_empty());
        assert_eq!(order_diagnostics(&["Concept"]), 1);
    }

    #[test]
    fn reversed_pair_reports_once() {
        let mut registry = ObjectKindRegistry::new();
        let (_, first) = registry.declare_kind("Generator");
        let (_, second) = registry.declare_kind("Prompt");
        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].kind, DiagnosticKind::OutOfOrderDeclaration);
        assert_eq!(second[0].message, "Expected Generator, got Prompt");
        assert!(registry.kind("Generator").is_some());
        assert!(registry.kind("Prompt").is_some());
    }

    #[test]
    fn one_diagnostic_per_misplaced_declaration() {
        assert_eq!(order_diagnostics(&["Image", "Prompt", "Generator", "Control", "Effect"]), 4);
        assert_eq!(order_diagnostics(&["Prompt", "Control", "Generator", "Effect", "Image"]), 1);
    }

    #[test]
    fn order_checking_stops_after_five_declarations() {
        let mut order = DeclarationOrder::default();
        for name in CANONICAL_KINDS {
            assert_eq!(order.advance(name), OrderCheck::InOrder);
        }
        assert!(order.is_terminal());
        assert_eq!(order.advance("Prompt"), OrderCheck::Unchecked);
        assert_eq!(order.advance("Concept"), OrderCheck::Unchecked);
    }

    #[test]
    fn non_canonical_kind_is_out_of_order() {
        let mut order = DeclarationOrder::default();
        assert_eq!(order.advance("Concept"), OrderCheck::OutOfOrder { expected: "Prompt" });
    }

    #[test]
    fn duplicate_kind_replaces_previous() {
        let mut registry = ObjectKindRegistry::new();
        let (first, _) = registry.declare_kind("Prompt");
        let (second, diagnostics) = registry.declare_kind("Prompt");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::DuplicateKind);
        assert!(!first.ptr_eq(&second));
        assert!(registry.kind("Prompt").unwrap().ptr_eq(&second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn attached_operation_reaches_earlier_and_later_records() {
        let mut registry = ObjectKindRegistry::new();
        registry.declare_kind("Effect");
        let earlier = registry.instantiate("Effect").unwrap();
        let closure = crate::parser::parse_expression("|self| 1").unwrap();
        let crate::parser::Expression::Closure { parameters, body } = closure.node else {
            panic!("Expected Closure");
        };
        registry
            .attach_operation(
                "Effect",
                "blur",
                Operation::Closure(crate::operation::Closure {
                    parameters,
                    body: *body,
                }),
            )
            .unwrap();
        let later = registry.instantiate("Effect").unwrap();
        assert!(earlier.operation("blur").is_some());
        assert!(later.operation("blur").is_some());
    }

    #[test]
    fn builtin_operations_are_replaceable() {
        let mut registry = ObjectKindRegistry::new();
        let (prompt, _) = registry.declare_kind("Prompt");
        assert!(prompt.operation("toggle").unwrap().is_builtin());
        let replaced = registry
            .attach_operation("Prompt", "toggle", Operation::Builtin(Builtin::IsPositive))
            .unwrap();
        assert!(replaced.is_some());
        assert!(matches!(
            *prompt.operation("toggle").unwrap(),
            Operation::Builtin(Builtin::IsPositive)
        ));
    }

    #[test]
    fn unknown_kind_calls_are_diagnostics() {
        let registry = ObjectKindRegistry::new();
        assert_eq!(
            registry.instantiate("Prompt").unwrap_err().kind,
            DiagnosticKind::UnknownKind
        );
    }

    #[test]
    fn definitions_before_declaration_are_applied() {
        let mut registry = ObjectKindRegistry::new();
        assert!(registry
            .define("Prompt", PropertyDefinition::new("seed", PropertyType::Number))
            .is_none());
        let (prompt, _) = registry.declare_kind("Prompt");
        assert!(prompt.schema().definition("seed").is_some());
        assert!(prompt.schema().definition("polarity").is_some());
    }

    #[test]
    fn resolve_layers_kind_values_over_schema_defaults() {
        let mut registry = ObjectKindRegistry::new();
        let (generator, _) = registry.declare_kind("Generator");
        assert_eq!(generator.resolve("steps"), Some(Value::Integer(50)));
        assert_eq!(generator.resolve("model"), Some(Value::None));
        assert_eq!(generator.resolve("nonexistent"), None);

        let mut defaults = IndexMap::new();
        defaults.insert("steps".to_owned(), Value::Integer(20));
        generator.replace_defaults(defaults);
        assert_eq!(generator.resolve("steps"), Some(Value::Integer(20)));
    }
}
