//! Integration tests for building raw compositions from flat input

use meridian::core::convert::{build_composition, ConversionOptions, Format};
use meridian::core::schema::SchemaIndex;
use meridian::domain::{ContextBag, ConversionError, WebTemplate};
use serde_json::{json, Value};

fn fixture_index() -> SchemaIndex {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/encounter.json");
    let template = WebTemplate::from_file(path).unwrap();
    SchemaIndex::build(&template).unwrap()
}

fn context() -> ContextBag {
    ContextBag::new()
        .with_language("en")
        .with_territory("IE")
        .with_composer_name("Dr. Lee")
        .with_start_time("2024-06-01T10:30:00Z")
}

fn build(index: &SchemaIndex, flat: Value) -> Result<Value, ConversionError> {
    build_composition(index, Format::Flat, &flat, &context(), &ConversionOptions::default())
}

/// Items of the first entry of the given archetype
fn entry<'a>(raw: &'a Value, archetype_id: &str) -> &'a Value {
    raw["content"]
        .as_array()
        .unwrap()
        .iter()
        .find(|entry| entry["archetype_node_id"] == archetype_id)
        .unwrap()
}

fn element<'a>(items: &'a Value, node_id: &str) -> &'a Value {
    items
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["archetype_node_id"] == node_id)
        .unwrap()
}

#[test]
fn test_composition_header_from_context() {
    let index = fixture_index();
    let raw = build(&index, json!({"encounter/problem:0/problem_name": "Asthma"})).unwrap();

    assert_eq!(raw["_type"], "COMPOSITION");
    assert_eq!(raw["archetype_details"]["template_id"]["value"], "Encounter.v1");
    assert_eq!(raw["language"]["code_string"], "en");
    assert_eq!(raw["territory"]["code_string"], "IE");
    assert_eq!(raw["composer"]["_type"], "PARTY_IDENTIFIED");
    assert_eq!(raw["composer"]["name"], "Dr. Lee");
    assert_eq!(raw["context"]["start_time"]["value"], "2024-06-01T10:30:00Z");
}

#[test]
fn test_quantity_magnitude_is_written_as_real() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({
            "encounter/vital_signs:0/any_event:0/body_temperature|magnitude": 300,
            "encounter/vital_signs:0/any_event:0/body_temperature|unit": "Cel"
        }),
    )
    .unwrap();

    let observation = entry(&raw, "openEHR-EHR-OBSERVATION.vital_signs.v1");
    let items = &observation["data"]["events"][0]["data"]["items"];
    let quantity = &element(items, "at0004")["value"];
    assert_eq!(quantity["_type"], "DV_QUANTITY");
    assert_eq!(quantity["units"], "Cel");
    assert_eq!(serde_json::to_string(&quantity["magnitude"]).unwrap(), "300.0");
}

#[test]
fn test_large_integers_keep_every_digit() {
    let index = fixture_index();
    let flat: Value =
        serde_json::from_str(r#"{"encounter/vital_signs:0/any_event:0/step_count": 1234567890123456789}"#).unwrap();
    let raw = build(&index, flat).unwrap();

    let observation = entry(&raw, "openEHR-EHR-OBSERVATION.vital_signs.v1");
    let count = &element(&observation["data"]["events"][0]["data"]["items"], "at0006")["value"];
    assert_eq!(count["_type"], "DV_COUNT");
    assert_eq!(count["magnitude"].to_string(), "1234567890123456789");
}

#[test]
fn test_events_share_the_history_of_their_observation() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({
            "encounter/vital_signs:0/any_event:0/pulse_rate": 72,
            "encounter/vital_signs:0/any_event:1/pulse_rate": 80
        }),
    )
    .unwrap();

    let observation = entry(&raw, "openEHR-EHR-OBSERVATION.vital_signs.v1");
    assert_eq!(observation["data"]["_type"], "HISTORY");
    assert_eq!(observation["data"]["events"].as_array().unwrap().len(), 2);
    assert_eq!(observation["data"]["origin"]["value"], "2024-06-01T10:30:00Z");
    assert_eq!(observation["subject"]["_type"], "PARTY_SELF");
}

#[test]
fn test_duration_components() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Migraine",
            "encounter/problem:0/duration|hour": 0,
            "encounter/problem:0/duration|minute": 30
        }),
    )
    .unwrap();

    let evaluation = entry(&raw, "openEHR-EHR-EVALUATION.problem_diagnosis.v1");
    let duration = &element(&evaluation["data"]["items"], "at0009")["value"];
    assert_eq!(duration["_type"], "DV_DURATION");
    assert_eq!(duration["value"], "PT30M");
}

#[test]
fn test_duration_component_outside_the_template() {
    let index = fixture_index();
    let err = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Migraine",
            "encounter/problem:0/duration": "P2D"
        }),
    )
    .unwrap_err();
    assert!(matches!(err.root_cause(), ConversionError::ConstraintViolation(_)));
}

#[test]
fn test_coded_text_takes_its_label_from_the_template() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/severity|code": "at0048"
        }),
    )
    .unwrap();

    let evaluation = entry(&raw, "openEHR-EHR-EVALUATION.problem_diagnosis.v1");
    let severity = &element(&evaluation["data"]["items"], "at0005")["value"];
    assert_eq!(severity["_type"], "DV_CODED_TEXT");
    assert_eq!(severity["value"], "Moderate");
    assert_eq!(severity["defining_code"]["code_string"], "at0048");
    assert_eq!(severity["defining_code"]["terminology_id"]["value"], "local");
}

#[test]
fn test_unknown_code() {
    let index = fixture_index();
    let err = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/severity|code": "at9999"
        }),
    )
    .unwrap_err();
    assert!(matches!(err.root_cause(), ConversionError::UnknownCode { code, .. } if code == "at9999"));
}

#[test]
fn test_missing_mandatory_element() {
    let index = fixture_index();
    let err = build(&index, json!({"encounter/problem:0/severity|code": "at0047"})).unwrap_err();

    match err.root_cause() {
        ConversionError::Cardinality { node, found, min, .. } => {
            assert_eq!(node, "encounter/problem:0/problem_name");
            assert_eq!(*found, 0);
            assert_eq!(*min, 1);
        }
        other => panic!("expected a cardinality error, got {other:?}"),
    }
}

#[test]
fn test_too_many_occurrences() {
    let index = fixture_index();
    let err = build(
        &index,
        json!({
            "encounter/problem:0/problem_name:0": "Asthma",
            "encounter/problem:0/problem_name:1": "Eczema"
        }),
    )
    .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        ConversionError::Cardinality { found: 2, max: Some(1), .. }
    ));
}

#[test]
fn test_unknown_path_segment() {
    let index = fixture_index();
    let err = build(&index, json!({"encounter/problem:0/colour": "red"})).unwrap_err();
    assert!(matches!(err.root_cause(), ConversionError::UnknownPath { segment, .. } if segment == "colour"));
}

#[test]
fn test_choice_follows_the_supplied_attributes() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/finding|magnitude": 3,
            "encounter/problem:1/problem_name": "Eczema",
            "encounter/problem:1/finding": "patchy rash"
        }),
    )
    .unwrap();

    let problems: Vec<&Value> = raw["content"].as_array().unwrap().iter().collect();
    assert_eq!(problems.len(), 2);
    let counted = &element(&problems[0]["data"]["items"], "at0010")["value"];
    assert_eq!(counted["_type"], "DV_COUNT");
    assert_eq!(counted["magnitude"], 3);
    let described = &element(&problems[1]["data"]["items"], "at0010")["value"];
    assert_eq!(described["_type"], "DV_TEXT");
    assert_eq!(described["value"], "patchy rash");
}

#[test]
fn test_choice_named_explicitly() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/finding/count_value": 4
        }),
    )
    .unwrap();
    let evaluation = entry(&raw, "openEHR-EHR-EVALUATION.problem_diagnosis.v1");
    assert_eq!(element(&evaluation["data"]["items"], "at0010")["value"]["_type"], "DV_COUNT");
}

#[test]
fn test_two_alternatives_are_ambiguous() {
    let index = fixture_index();
    let err = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/finding/count_value": 4,
            "encounter/problem:0/finding/text_value": "four"
        }),
    )
    .unwrap_err();
    assert!(matches!(err.root_cause(), ConversionError::AmbiguousChoice { .. }));
}

#[test]
fn test_careflow_step_sets_the_current_state() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({
            "encounter/procedure:0/procedure_name": "Appendectomy",
            "encounter/procedure:0/ism_transition/careflow_step|code": "at0005"
        }),
    )
    .unwrap();

    let action = entry(&raw, "openEHR-EHR-ACTION.procedure.v1");
    let ism = &action["ism_transition"];
    assert_eq!(ism["_type"], "ISM_TRANSITION");
    assert_eq!(ism["current_state"]["defining_code"]["code_string"], "532");
    assert_eq!(ism["current_state"]["value"], "completed");
    assert_eq!(ism["careflow_step"]["value"], "Procedure performed");
    assert_eq!(action["time"]["value"], "2024-06-01T10:30:00Z");
}

#[test]
fn test_explicit_state_overrides_the_careflow_step() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({
            "encounter/procedure:0/procedure_name": "Appendectomy",
            "encounter/procedure:0/ism_transition/careflow_step|code": "at0005",
            "encounter/procedure:0/ism_transition/current_state|code": "245"
        }),
    )
    .unwrap();

    let action = entry(&raw, "openEHR-EHR-ACTION.procedure.v1");
    assert_eq!(action["ism_transition"]["current_state"]["defining_code"]["code_string"], "245");
}

#[test]
fn test_undeclared_careflow_step() {
    let index = fixture_index();
    let err = build(
        &index,
        json!({
            "encounter/procedure:0/procedure_name": "Appendectomy",
            "encounter/procedure:0/ism_transition/careflow_step|code": "at0099"
        }),
    )
    .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        ConversionError::UnknownTransition { careflow_step, .. } if careflow_step == "at0099"
    ));
    assert!(err.path().unwrap().contains("ism_transition"));
}

#[test]
fn test_action_without_transition() {
    let index = fixture_index();
    let err = build(&index, json!({"encounter/procedure:0/procedure_name": "Appendectomy"})).unwrap_err();
    assert!(matches!(err.root_cause(), ConversionError::Cardinality { node, .. } if node.ends_with("ism_transition")));
}

#[test]
fn test_context_entries_in_the_document() {
    let index = fixture_index();
    let raw = build_composition(
        &index,
        Format::Flat,
        &json!({
            "ctx/territory": "DE",
            "ctx/composer_name": "Dr. Weber",
            "encounter/problem:0/problem_name": "Asthma"
        }),
        &context(),
        &ConversionOptions::default(),
    )
    .unwrap();

    assert_eq!(raw["territory"]["code_string"], "DE");
    assert_eq!(raw["composer"]["name"], "Dr. Weber");
}

#[test]
fn test_uid_generation() {
    let index = fixture_index();
    let options = ConversionOptions {
        generate_uid: true,
        system_id: "ehr.example.org".to_string(),
        ..Default::default()
    };
    let raw = build_composition(
        &index,
        Format::Flat,
        &json!({"encounter/problem:0/problem_name": "Asthma"}),
        &context(),
        &options,
    )
    .unwrap();

    let uid = raw["uid"]["value"].as_str().unwrap();
    assert!(uid.contains("::ehr.example.org::"));
    assert!(uid.ends_with("::1"));
}

#[test]
fn test_ordered_children_in_declared_order() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/course/onset_note:0": "sudden",
            "encounter/problem:0/course/onset_note:1": "at night",
            "encounter/problem:0/course/resolution_note": "inhaler"
        }),
    )
    .unwrap();

    let problem = entry(&raw, "openEHR-EHR-EVALUATION.problem_diagnosis.v1");
    let course = element(&problem["data"]["items"], "at0020");
    let order: Vec<&str> = course["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["value"]["value"].as_str().unwrap())
        .collect();
    assert_eq!(order, vec!["sudden", "at night", "inhaler"]);
}

#[test]
fn test_ordered_children_out_of_declared_order() {
    let index = fixture_index();
    let err = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/course/resolution_note": "inhaler",
            "encounter/problem:0/course/onset_note": "sudden"
        }),
    )
    .unwrap_err();
    assert!(matches!(err.root_cause(), ConversionError::Ordering { .. }));
}

#[test]
fn test_ordered_occurrences_out_of_index_order() {
    let index = fixture_index();
    let err = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/course/onset_note:1": "at night",
            "encounter/problem:0/course/onset_note:0": "sudden"
        }),
    )
    .unwrap_err();
    match err.root_cause() {
        ConversionError::Ordering { node, reason } => {
            assert_eq!(node, "encounter/problem:0/course");
            assert!(reason.contains("onset_note:0"));
        }
        other => panic!("expected an ordering error, got {other:?}"),
    }
}

#[test]
fn test_unordered_parent_accepts_any_input_order() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({
            "encounter/problem:0/severity|code": "at0047",
            "encounter/problem:0/problem_name": "Asthma"
        }),
    );
    assert!(raw.is_ok());
}

#[test]
fn test_occurrence_index_at_the_limit() {
    let index = fixture_index();
    let err = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/severity:18446744073709551615|code": "at0047"
        }),
    )
    .unwrap_err();
    match err.root_cause() {
        ConversionError::Cardinality { found, max, .. } => {
            assert_eq!(*found, usize::MAX);
            assert_eq!(*max, Some(1));
        }
        other => panic!("expected a cardinality error, got {other:?}"),
    }
}

#[test]
fn test_unbounded_node_with_a_huge_index() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({"encounter/problem:18446744073709551615/problem_name": "Migraine"}),
    )
    .unwrap();
    let problem = entry(&raw, "openEHR-EHR-EVALUATION.problem_diagnosis.v1");
    assert_eq!(element(&problem["data"]["items"], "at0002")["value"]["value"], "Migraine");
}

#[test]
fn test_context_link_with_a_huge_index() {
    let index = fixture_index();
    let raw = build(
        &index,
        json!({
            "encounter/problem:0/problem_name": "Asthma",
            "ctx/link:1000000000|meaning": "follow up",
            "ctx/link:1000000000|type": "issue",
            "ctx/link:1000000000|target": "ehr://example/follow-up"
        }),
    )
    .unwrap();
    let links = raw["links"].as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["target"]["value"], "ehr://example/follow-up");
}
