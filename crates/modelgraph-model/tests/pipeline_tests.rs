use std::sync::Arc;

use anyhow::anyhow;
use modelgraph_core::{ValidEmail, ValidRange};
use modelgraph_model::*;
use parking_lot::Mutex;

struct Person;

fn title_case(value: String) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

impl ModelType for Person {
    const NAME: &'static str = "Person";

    fn describe(builder: &mut TypeBuilder<Self>) -> Result<()> {
        builder
            .property::<String>("name")?
            .coerce(|v| v.trim().to_string())
            .coerce(title_case)
            .validate_with(
                |_, raw: &String, results| {
                    results.add(ValidationKind::Information, format!("raw:{}", raw));
                    Ok(())
                },
                ValidationOptions::default().before_coerce(),
            )
            .validate(|_, coerced: &String, results| {
                results.add(ValidationKind::Information, format!("coerced:{}", coerced));
                Ok(())
            });

        builder.property::<String>("code")?.check_with(
            |_, v: &String| v.chars().any(|c| c.is_ascii_digit()),
            ValidationKind::Error,
            "digits are not allowed",
            ValidationOptions::default().before_coerce(),
        );

        builder
            .property::<u32>("age")?
            .validate_using(ValidRange::new(0..=150), ValidationKind::Error, None);

        builder.property::<String>("nickname")?.check_with(
            |_, v: &String| v.len() > 10,
            ValidationKind::Error,
            "too long",
            ValidationOptions::default().stop_on_error(),
        );

        builder.property::<String>("quiet")?.check_with(
            |_, v: &String| v.trim().is_empty(),
            ValidationKind::Error,
            "required",
            ValidationOptions::default().suppress_notify_on_error(),
        );

        builder.property::<i32>("score")?.validate(|_, v: &i32, _| {
            if *v < 0 {
                return Err(anyhow!("negative score {}", v));
            }
            Ok(())
        });

        builder.property::<Option<String>>("email")?.validate_using(
            ValidEmail,
            ValidationKind::Warning,
            None,
        );

        builder
            .property::<String>("title")?
            .on_set(|model, _| {
                let count = model.get::<u32>("title_changes").unwrap_or(0);
                let _ = model.set("title_changes", count + 1);
            });

        Ok(())
    }
}

fn person() -> Arc<Model<Person>> {
    Model::<Person>::new(&DescriptorRegistry::new()).unwrap()
}

fn collect_changes(model: &Model<Person>) -> (Arc<Mutex<Vec<String>>>, Subscription) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let sub = model.on_property_changed(move |e| sink.lock().push(e.property.clone()));
    (log, sub)
}

fn messages(results: &ValidationResultCollection) -> Vec<String> {
    results.iter().map(|r| r.message.clone()).collect()
}

#[test]
fn coercions_run_in_registration_order() {
    let model = person();
    assert!(model.set("name", "   abc   ".to_string()).unwrap());
    assert_eq!(model.get::<String>("name").unwrap(), "Abc");
    assert_eq!(model.previous::<String>("name").unwrap(), "");
}

#[test]
fn before_coerce_rules_see_raw_value() {
    let model = person();
    model.set("name", "   abc   ".to_string()).unwrap();

    let seen = messages(&model.validation_results("name"));
    assert_eq!(seen, vec!["raw:   abc   ", "coerced:Abc"]);
    assert!(!model.has_errors());
}

#[test]
fn before_coerce_rule_without_digits_passes() {
    let model = person();
    assert!(model.set("code", "   abc   ".to_string()).unwrap());
    assert!(model.validation_results("code").is_empty());

    assert!(model.set("code", "abc1".to_string()).unwrap());
    assert!(model.has_errors());
}

#[test]
fn unchanged_value_is_a_noop() {
    let model = person();
    model.set("name", "abc".to_string()).unwrap();
    let (log, _sub) = collect_changes(&model);

    // Coerces to the stored "Abc".
    assert!(!model.set("name", "  abc ".to_string()).unwrap());
    assert!(log.lock().is_empty());

    // After-coerce rules did not run on the no-op pass.
    let seen = messages(&model.validation_results("name"));
    assert_eq!(seen, vec!["raw:  abc "]);
}

#[test]
fn stop_on_error_rejects_without_storing() {
    let model = person();
    model.set("nickname", "short".to_string()).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let _sub = model.on_errors_changed(move |e| sink.lock().push((e.property.clone(), e.has_errors)));
    let (log, _changes) = collect_changes(&model);

    assert!(!model.set("nickname", "much too long to keep".to_string()).unwrap());
    assert_eq!(model.get::<String>("nickname").unwrap(), "short");
    assert!(model.has_errors());
    assert_eq!(model.get_errors(Some("nickname")).len(), 1);
    assert_eq!(*events.lock(), vec![("nickname".to_string(), true)]);
    assert!(log.lock().is_empty());
}

#[test]
fn continue_on_error_stores_and_notifies() {
    let model = person();
    let (log, _sub) = collect_changes(&model);

    assert!(model.set("age", 200u32).unwrap());
    assert_eq!(model.get::<u32>("age").unwrap(), 200);
    assert!(model.has_errors());
    assert_eq!(
        model.get_errors(Some("age"))[0].message,
        "Value out of range: 0..150"
    );
    assert_eq!(*log.lock(), vec!["age"]);
}

#[test]
fn suppressed_rule_stores_without_notifying() {
    let model = person();
    let (log, _sub) = collect_changes(&model);

    assert!(model.set("quiet", "   ".to_string()).unwrap());
    assert_eq!(model.get::<String>("quiet").unwrap(), "   ");
    assert!(model.has_errors());
    assert!(log.lock().is_empty());

    model.set("quiet", "ok".to_string()).unwrap();
    assert_eq!(*log.lock(), vec!["quiet"]);
    assert!(!model.has_errors());
}

#[test]
fn validator_error_becomes_error_result() {
    let model = person();
    assert!(model.set("score", -3).unwrap());

    let results = model.validation_results("score");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].kind, ValidationKind::Error);
    assert!(results[0].message.starts_with("Exception while validating"));
    assert!(results[0].cause().is_some());
}

#[test]
fn errors_changed_fires_on_recovery() {
    let model = person();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let _sub = model.on_errors_changed(move |e| sink.lock().push((e.property.clone(), e.has_errors)));

    model.set("age", 200u32).unwrap();
    model.set("age", 30u32).unwrap();
    model.set("age", 31u32).unwrap();

    assert_eq!(
        *events.lock(),
        vec![("age".to_string(), true), ("age".to_string(), false)]
    );
}

#[test]
fn warnings_do_not_count_as_errors() {
    let model = person();
    model.set("email", Some("not-an-address".to_string())).unwrap();

    assert!(!model.has_errors());
    let errors = model.get_errors(None);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ValidationKind::Warning);
    assert_eq!(errors[0].message, "Invalid Email format");
}

#[test]
fn post_set_actions_run_per_stored_change() {
    let model = person();
    model.set("title", "a".to_string()).unwrap();
    model.set("title", "b".to_string()).unwrap();
    model.set("title", "b".to_string()).unwrap();
    assert_eq!(model.get::<u32>("title_changes").unwrap(), 2);
}

#[test]
fn get_or_init_sets_once() {
    let model = person();
    let (log, _sub) = collect_changes(&model);

    assert_eq!(model.get_or_init("nickname", || "Nick".to_string()).unwrap(), "Nick");
    assert_eq!(model.get_or_init("nickname", || "Other".to_string()).unwrap(), "Nick");
    assert_eq!(*log.lock(), vec!["nickname"]);
}

#[test]
fn injected_results_and_clearing() {
    let model = person();
    assert!(!model.add_validation_result("name", "server rejected", ValidationKind::Error));

    model.set("name", "ann".to_string()).unwrap();
    assert!(model.add_validation_result("name", "server rejected", ValidationKind::Error));
    assert!(model.has_errors());

    model.clear_validation_results();
    assert!(!model.has_errors());
    assert!(model.validation_results("name").is_empty());
}

#[test]
fn wrong_value_type_is_rejected() {
    let model = person();
    assert!(matches!(
        model.set("name", 3u32),
        Err(ModelError::TypeMismatch { .. })
    ));
    assert!(matches!(
        model.collection::<String>("name"),
        Err(ModelError::KindMismatch { .. })
    ));
}
