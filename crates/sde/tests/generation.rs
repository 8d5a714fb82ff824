//! Generator records and the generation backend seam

use sde::{
    DryRunBackend, GenerationError, RuntimeError, Sheet, SheetConfig, UnavailableBackend, Value,
};

const SHEET: &str = "obj Prompt:\n\
                     props: {\"text\": \"a lighthouse at dusk\"}\n\
                     obj Generator:\n\
                     props: {\"model\": \"sd-1.5\", \"steps\": 30}\n\
                     Sheet Main:\n\
                     image = generator.generate(prompt)\n\
                     print(image.model, image.width, image.prompt)\n";

fn load(source: &str) -> Sheet {
    let sheet = Sheet::from_source(source, SheetConfig::default()).unwrap();
    assert!(sheet.diagnostics().is_empty(), "{:?}", sheet.diagnostics());
    sheet
}

#[test]
fn dry_run_receives_resolved_request() {
    let sheet = load(SHEET);
    let mut backend = DryRunBackend::new();
    let mut namespace = sheet.namespace();
    let report = sheet.execute_in(&mut namespace, &mut backend).unwrap();

    assert_eq!(report.output, ["sd-1.5 512 a lighthouse at dusk"]);
    let [request] = backend.requests() else {
        panic!("Expected one request");
    };
    assert_eq!(request.model, "sd-1.5");
    assert_eq!(request.steps, 30);
    assert_eq!(request.guidance, 7.5);
    assert!(matches!(namespace.get("image"), Some(Value::Image(_))));
}

#[test]
fn plain_text_prompt() {
    let sheet = load(
        "obj Generator:\n\
         props: {\"model\": \"sd-1.5\"}\n\
         Sheet Main:\n\
         generator.generate(\"a red kite\")\n",
    );
    let mut backend = DryRunBackend::new();
    sheet.execute(&mut backend).unwrap();
    assert_eq!(backend.requests()[0].prompt, "a red kite");
}

#[test]
fn unknown_model_is_a_generation_failure() {
    let sheet = load(SHEET);
    let mut backend = DryRunBackend::new().with_known_models(["sd-xl"]);
    let error = sheet.execute(&mut backend).unwrap_err();
    assert!(matches!(
        error.runtime_error(),
        RuntimeError::Generation(GenerationError::ModelNotFound(model)) if model == "sd-1.5"
    ));
}

#[test]
fn unavailable_backend_fails_the_statement() {
    let sheet = load(SHEET);
    let mut backend = UnavailableBackend::new("no GPU");
    let error = sheet.execute(&mut backend).unwrap_err();
    let sde::ExecutionError::StatementFailed { index, line, .. } = &error;
    assert_eq!((*index, *line), (0, 6));
    assert!(matches!(
        error.runtime_error(),
        RuntimeError::Generation(GenerationError::Unavailable(_))
    ));
}

#[test]
fn model_is_required() {
    let sheet = load("obj Generator:\nSheet Main:\ngenerator.generate(\"x\")\n");
    let mut backend = DryRunBackend::new();
    let error = sheet.execute(&mut backend).unwrap_err();
    assert!(matches!(
        error.runtime_error(),
        RuntimeError::MissingRequiredProperty { kind, property } if kind == "Generator" && property == "model"
    ));
    assert!(backend.requests().is_empty());
}

#[test]
fn effect_list_reports_attached_operations() {
    let sheet = load(
        "obj Effect:\n\
         func: {\"blur\": |self| self.strength * 2, \"grain\": |self| 0}\n\
         Sheet Main:\n\
         print(effect.list(), effect.blur())\n",
    );
    let mut backend = DryRunBackend::new();
    let report = sheet.execute(&mut backend).unwrap();
    assert_eq!(report.output, ["[\"blur\", \"grain\"] 2.0"]);
}

#[test]
fn steps_and_sizes_must_be_positive_whole_numbers() {
    for (props, property) in [
        (r#"{"model": "m", "steps": -5}"#, "steps"),
        (r#"{"model": "m", "width": 7.9}"#, "width"),
        (r#"{"model": "m", "height": 0}"#, "height"),
    ] {
        let sheet = load(&format!(
            "obj Generator:\nprops: {props}\nSheet Main:\ngenerator.generate(\"x\")\n"
        ));
        let mut backend = DryRunBackend::new();
        let error = sheet.execute(&mut backend).unwrap_err();
        assert!(
            matches!(
                error.runtime_error(),
                RuntimeError::InvalidProperty { property: name, .. } if name == property
            ),
            "{error:?}"
        );
        assert!(backend.requests().is_empty());
    }

    let sheet = load(
        "obj Generator:\n\
         props: {\"model\": \"m\", \"width\": 768.0}\n\
         Sheet Main:\n\
         generator.generate(\"x\")\n",
    );
    let mut backend = DryRunBackend::new();
    sheet.execute(&mut backend).unwrap();
    assert_eq!(backend.requests()[0].width, 768);
}
