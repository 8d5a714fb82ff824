use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::diagnostics::Diagnostic;
use crate::operation::Operation;
use crate::registry::KindRef;
use crate::value::Value;

/// A runtime instance of a kind. Property values are only reachable through
/// the schema-aware accessors.
#[derive(Debug)]
pub struct ObjectRecord {
    kind: KindRef,
    properties: IndexMap<String, Value>,
}

#[derive(Clone)]
pub struct RecordRef(Rc<RefCell<ObjectRecord>>);

impl RecordRef {
    pub fn new(kind: KindRef) -> Self {
        Self(Rc::new(RefCell::new(ObjectRecord {
            kind,
            properties: IndexMap::new(),
        })))
    }

    pub fn kind(&self) -> KindRef {
        self.0.borrow().kind.clone()
    }

    pub fn kind_name(&self) -> String {
        self.0.borrow().kind.name()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Own value, then the kind's layered fallback. `None` when the property
    /// is neither set nor declared.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let record = self.0.borrow();
        match record.properties.get(name) {
            Some(value) => Some(value.clone()),
            None => record.kind.resolve(name),
        }
    }

    /// Like [`Self::lookup`] with absent properties reading as `None`.
    pub fn get(&self, name: &str) -> Value {
        self.lookup(name).unwrap_or(Value::None)
    }

    /// Stores the schema-resolved value and returns the validation
    /// diagnostic, if any. The value is stored either way.
    pub fn set(&self, name: &str, value: Value) -> Option<Diagnostic> {
        let kind = self.kind();
        let resolved = kind.validate_assignment(name, value);
        self.0
            .borrow_mut()
            .properties
            .insert(name.to_owned(), resolved.value);
        resolved.diagnostic
    }

    pub fn operation(&self, name: &str) -> Option<Rc<Operation>> {
        self.kind().operation(name)
    }

    /// Every property with a value: schema defaults, kind values from
    /// `props:` and the record's own values, later layers winning.
    pub fn resolved_properties(&self) -> IndexMap<String, Value> {
        let record = self.0.borrow();
        let mut properties: IndexMap<String, Value> = record
            .kind
            .schema()
            .definitions()
            .filter_map(|definition| {
                definition
                    .effective_default()
                    .map(|default| (definition.name.clone(), default.clone()))
            })
            .collect();
        properties.extend(record.kind.defaults());
        properties.extend(
            record
                .properties
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        properties
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordRef")
            .field("kind", &self.kind_name())
            .field("properties", &self.0.borrow().properties)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use crate::registry::ObjectKindRegistry;

    #[test]
    fn reads_fall_through_to_kind_then_schema() {
        let mut registry = ObjectKindRegistry::new();
        let (prompt, _) = registry.declare_kind("Prompt");
        let record = prompt.instantiate();
        assert_eq!(record.get("polarity"), Value::from("positive"));

        let mut defaults = IndexMap::new();
        defaults.insert("polarity".to_owned(), Value::from("negative"));
        prompt.replace_defaults(defaults);
        assert_eq!(record.get("polarity"), Value::from("negative"));

        assert!(record.set("polarity", Value::from("positive")).is_none());
        assert_eq!(record.get("polarity"), Value::from("positive"));
        assert_eq!(record.lookup("nonexistent"), None);
    }

    #[test]
    fn set_reports_and_still_stores() {
        let mut registry = ObjectKindRegistry::new();
        let (prompt, _) = registry.declare_kind("Prompt");
        let record = prompt.instantiate();
        let diagnostic = record.set("text", Value::Integer(5)).unwrap();
        assert_eq!(diagnostic.kind, DiagnosticKind::TypeMismatch);
        assert_eq!(record.get("text"), Value::Integer(5));
    }

    #[test]
    fn empty_text_resolves_to_default() {
        let mut registry = ObjectKindRegistry::new();
        let (prompt, _) = registry.declare_kind("Prompt");
        let record = prompt.instantiate();
        record.set("polarity", Value::from(""));
        assert_eq!(record.get("polarity"), Value::from("positive"));
    }

    #[test]
    fn resolved_properties_layers_values() {
        let mut registry = ObjectKindRegistry::new();
        let (generator, _) = registry.declare_kind("Generator");
        let record = generator.instantiate();
        record.set("model", Value::from("sd-1.5"));
        let properties = record.resolved_properties();
        assert_eq!(properties.get("model"), Some(&Value::from("sd-1.5")));
        assert_eq!(properties.get("steps"), Some(&Value::Integer(50)));
    }
}
