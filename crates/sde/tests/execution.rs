//! Running sheets: toggling, operation attachment, failures, persistence

use sde::{
    DiagnosticKind, DryRunBackend, ExecutionError, Namespace, RuntimeError, Sheet, SheetConfig,
    Value,
};

fn load(source: &str) -> Sheet {
    let sheet = Sheet::from_source(source, SheetConfig::default()).unwrap();
    assert!(sheet.diagnostics().is_empty(), "{:?}", sheet.diagnostics());
    sheet
}

fn run(sheet: &Sheet) -> (Result<(), ExecutionError>, Namespace, Vec<String>) {
    let mut backend = DryRunBackend::new();
    let mut namespace = sheet.namespace();
    let mut executor = sheet.executor(&mut backend);
    let result = executor.execute(sheet.statements(), &mut namespace);
    let output = executor.into_report().output;
    (result, namespace, output)
}

#[test]
fn toggle_flips_polarity_back_and_forth() {
    let sheet = load(
        "obj Prompt:\n\
         props: {\"polarity\": \"positive\"}\n\
         Sheet Main:\n\
         prompt = Prompt()\n\
         prompt.toggle()\n\
         print(prompt.polarity, prompt.is_negative())\n\
         prompt.toggle()\n\
         print(prompt.get(\"polarity\"), prompt.is_positive())\n",
    );
    let (result, namespace, output) = run(&sheet);
    result.unwrap();
    assert_eq!(output, ["negative True", "positive True"]);
    let prompt = namespace.record("prompt").unwrap();
    assert_eq!(prompt.get("polarity"), Value::from("positive"));
}

#[test]
fn func_reaches_records_created_before_and_after() {
    let mut namespace = Namespace::new();
    let mut backend = DryRunBackend::new();

    let declared = load("obj Prompt:\nSheet Main:\nearly = Prompt({\"text\": \"fox\"})\n");
    let prompt_kind = declared.registry().kind("Prompt").unwrap().clone();
    namespace.insert("Prompt", Value::Kind(prompt_kind.clone()));
    declared.execute_in(&mut namespace, &mut backend).unwrap();

    // Attach after `early` exists, then create `late`.
    let closure = sde::parser::parse_expression("|self| self.text + \"!\"").unwrap();
    let sde::parser::Expression::Closure { parameters, body } = closure.node else {
        panic!("Expected Closure");
    };
    prompt_kind.attach_operation(
        "shout",
        sde::Operation::Closure(sde::Closure {
            parameters,
            body: *body,
        }),
    );

    let statements = load(
        "late = Prompt({\"text\": \"owl\"})\n\
         print(early.shout(), late.shout())\n",
    );
    let report = statements.execute_in(&mut namespace, &mut backend).unwrap();
    assert_eq!(report.output, ["fox! owl!"]);
}

#[test]
fn func_line_attaches_to_seeded_and_constructed_records() {
    let sheet = load(
        "obj Prompt:\n\
         props: {\"text\": \"a fox\"}\n\
         func: {\"shout\": |self| self.text + \"!\", \"twice\": |self, n| n * 2}\n\
         Sheet Main:\n\
         p = Prompt()\n\
         print(prompt.shout(), p.shout(), p.twice(4))\n",
    );
    let (result, _, output) = run(&sheet);
    result.unwrap();
    assert_eq!(output, ["a fox! a fox! 8"]);
}

#[test]
fn func_replaces_builtin_operation() {
    let sheet = load(
        "obj Prompt:\n\
         func: {\"toggle\": |self| \"custom\"}\n\
         Sheet Main:\n\
         print(prompt.toggle(), prompt.polarity)\n",
    );
    let (result, _, output) = run(&sheet);
    result.unwrap();
    assert_eq!(output, ["custom positive"]);
}

#[test]
fn first_failure_aborts_remaining_statements() {
    let sheet = load(
        "obj Prompt:\n\
         Sheet Main:\n\
         print(\"before\")\n\
         prompt.explode()\n\
         print(\"after\")\n",
    );
    let (result, _, output) = run(&sheet);
    let error = result.unwrap_err();
    let ExecutionError::StatementFailed { index, line, text, source } = &error;
    assert_eq!(*index, 1);
    assert_eq!(*line, 4);
    assert_eq!(text, "prompt.explode()");
    assert!(matches!(source, RuntimeError::UnknownOperation { .. }));
    assert_eq!(output, ["before"]);
    assert!(error.to_string().contains("prompt.explode()"));
}

#[test]
fn runtime_schema_diagnostics_depend_on_mode() {
    let source = "obj Prompt:\nSheet Main:\nprompt.polarity = 1\nprint(prompt.polarity)\n";

    let lenient = load(source);
    let mut backend = DryRunBackend::new();
    let report = lenient.execute(&mut backend).unwrap();
    assert_eq!(report.output, ["1"]);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::TypeMismatch);
    assert_eq!(report.diagnostics[0].line(), Some(3));

    let strict = Sheet::from_source(source, SheetConfig::strict()).unwrap();
    let error = strict.execute(&mut backend).unwrap_err();
    assert!(matches!(
        error.runtime_error(),
        RuntimeError::Rejected(diagnostic) if diagnostic.kind == DiagnosticKind::TypeMismatch
    ));
}

#[test]
fn construction_applies_properties_through_the_schema() {
    let sheet = load(
        "obj Image:\n\
         Sheet Main:\n\
         i = Image({\"width\": 1024, \"path\": \"\"})\n\
         print(i.width, i.height, len(i.path))\n",
    );
    let (result, _, output) = run(&sheet);
    result.unwrap();
    assert_eq!(output, ["1024 512 0"]);
}

#[test]
fn save_writes_resolved_properties_as_json() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("prompt.json");
    let sheet = load(&format!(
        "obj Prompt:\n\
         props: {{\"text\": \"a fox\"}}\n\
         Sheet Main:\n\
         prompt.toggle()\n\
         prompt.save(\"{}\")\n",
        path.display()
    ));
    let (result, _, _) = run(&sheet);
    result.unwrap();

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        saved,
        serde_json::json!({
            "kind": "Prompt",
            "properties": { "text": "a fox", "polarity": "negative" }
        })
    );
}

#[test]
fn save_to_missing_directory_fails() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("missing").join("prompt.json");
    let sheet = load(&format!(
        "obj Prompt:\nSheet Main:\nprompt.save(\"{}\")\n",
        path.display()
    ));
    let (result, _, _) = run(&sheet);
    assert!(matches!(
        result.unwrap_err().runtime_error(),
        RuntimeError::Save { .. }
    ));
}

#[test]
fn call_depth_follows_config() {
    let config = SheetConfig::from_toml_str("max_call_depth = 3").unwrap();
    let sheet = Sheet::from_source(
        "obj Effect:\n\
         func: {\"deep\": |self, n| self.deep(n + 1)}\n\
         Sheet Main:\n\
         effect.deep(0)\n",
        config,
    )
    .unwrap();
    let mut backend = DryRunBackend::new();
    let error = sheet.execute(&mut backend).unwrap_err();
    assert!(matches!(
        error.runtime_error(),
        RuntimeError::CallDepthExceeded(3)
    ));
}

#[test]
fn save_rejects_a_record_that_contains_itself() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("prompt.json");
    let sheet = load(&format!(
        "obj Prompt:\n\
         Sheet Main:\n\
         prompt.me = prompt\n\
         prompt.save(\"{}\")\n",
        path.display()
    ));
    let (result, _, _) = run(&sheet);
    let error = result.unwrap_err();
    let ExecutionError::StatementFailed { index, .. } = &error;
    assert_eq!(*index, 1);
    assert!(matches!(
        error.runtime_error(),
        RuntimeError::CircularReference(reference) if reference.kind == "Prompt"
    ));
    assert!(!path.exists());
}

#[test]
fn save_nests_a_record_shared_in_several_places() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("image.json");
    let sheet = load(&format!(
        "obj Prompt:\n\
         obj Image:\n\
         Sheet Main:\n\
         p = Prompt({{\"text\": \"fox\"}})\n\
         image.source = p\n\
         image.sources = [p, p]\n\
         image.save(\"{}\")\n",
        path.display()
    ));
    let (result, _, _) = run(&sheet);
    result.unwrap();

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let nested = serde_json::json!({
        "kind": "Prompt",
        "properties": { "text": "fox", "polarity": "positive" }
    });
    assert_eq!(saved["properties"]["source"], nested);
    assert_eq!(saved["properties"]["sources"], serde_json::json!([nested, nested]));
}

#[test]
fn integer_overflow_fails_the_statement() {
    let sheet = load("x = 9223372036854775807 + 1\nprint(x)\n");
    let (result, namespace, output) = run(&sheet);
    assert!(matches!(
        result.unwrap_err().runtime_error(),
        RuntimeError::Operator(sde::value::OperatorError::Overflow(_))
    ));
    assert!(!namespace.contains("x"));
    assert!(output.is_empty());
}
