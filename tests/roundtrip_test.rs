//! Integration tests for flat → raw → flat conversions

use meridian::core::convert::{build_composition, flatten_composition, ConversionOptions, Format};
use meridian::core::path::{flat_to_structured, structured_to_flat};
use meridian::core::schema::SchemaIndex;
use meridian::domain::{ContextBag, ConversionError, WebTemplate};
use serde_json::{json, Value};

fn fixture_template() -> WebTemplate {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/encounter.json");
    WebTemplate::from_file(path).unwrap()
}

fn context() -> ContextBag {
    ContextBag::new()
        .with_language("en")
        .with_territory("IE")
        .with_composer_name("Dr. Lee")
        .with_start_time("2024-06-01T10:30:00Z")
}

fn encounter_document() -> Value {
    serde_json::from_str(
        r#"{
            "encounter/vital_signs:0/any_event:0/body_temperature|magnitude": 37.5,
            "encounter/vital_signs:0/any_event:0/body_temperature|unit": "Cel",
            "encounter/vital_signs:0/any_event:0/pulse_rate": 72,
            "encounter/vital_signs:0/any_event:1/pulse_rate": 80,
            "encounter/vital_signs:0/any_event:1/step_count": 1234567890123456789,
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/severity|code": "at0048",
            "encounter/problem:0/duration|hour": 2,
            "encounter/problem:0/duration|minute": 15,
            "encounter/problem:0/finding|magnitude": 3,
            "encounter/problem:1/problem_name": "Eczema",
            "encounter/problem:1/finding": "patchy rash",
            "encounter/procedure:0/procedure_name": "Spirometry",
            "encounter/procedure:0/ism_transition/careflow_step|code": "at0005"
        }"#,
    )
    .unwrap()
}

fn build(index: &SchemaIndex, format: Format, document: &Value) -> Value {
    build_composition(index, format, document, &context(), &ConversionOptions::default()).unwrap()
}

#[test]
fn test_flatten_names_every_supplied_value() {
    let index = SchemaIndex::build(&fixture_template()).unwrap();
    let raw = build(&index, Format::Flat, &encounter_document());
    let flat = flatten_composition(&index, &raw, Format::Flat, None).unwrap();

    assert_eq!(flat["encounter/vital_signs:0/any_event:0/body_temperature|magnitude"], json!(37.5));
    assert_eq!(flat["encounter/vital_signs:0/any_event:0/body_temperature|unit"], "Cel");
    assert_eq!(flat["encounter/vital_signs:0/any_event:1/pulse_rate"], json!(80));
    assert_eq!(
        flat["encounter/vital_signs:0/any_event:1/step_count"].to_string(),
        "1234567890123456789"
    );
    assert_eq!(flat["encounter/problem:0/severity|code"], "at0048");
    assert_eq!(flat["encounter/problem:0/severity|value"], "Moderate");
    assert_eq!(flat["encounter/problem:0/duration|hour"], json!(2));
    assert_eq!(flat["encounter/problem:0/duration|minute"], json!(15));
    assert_eq!(flat["encounter/problem:0/finding/count_value"], json!(3));
    assert_eq!(flat["encounter/problem:1/finding/text_value"], "patchy rash");
    assert_eq!(flat["encounter/procedure:0/ism_transition/current_state|code"], "532");
    assert_eq!(flat["encounter/procedure:0/ism_transition/careflow_step|code"], "at0005");
    assert_eq!(flat["encounter/composer|name"], "Dr. Lee");
    assert_eq!(flat["encounter/territory|code"], "IE");
    assert_eq!(flat["encounter/context/start_time"], "2024-06-01T10:30:00Z");
}

#[test]
fn test_flat_output_rebuilds_the_same_composition() {
    let index = SchemaIndex::build(&fixture_template()).unwrap();
    let raw = build(&index, Format::Flat, &encounter_document());
    let flat = flatten_composition(&index, &raw, Format::Flat, None).unwrap();

    let rebuilt = build(&index, Format::Flat, &flat);
    let flat_again = flatten_composition(&index, &rebuilt, Format::Flat, None).unwrap();
    assert_eq!(flat, flat_again);
}

#[test]
fn test_structured_and_flat_input_are_equivalent() {
    let index = SchemaIndex::build(&fixture_template()).unwrap();
    let raw = build(&index, Format::Flat, &encounter_document());
    let flat = flatten_composition(&index, &raw, Format::Flat, None).unwrap();
    let structured = flatten_composition(&index, &raw, Format::Structured, None).unwrap();

    assert_eq!(structured["encounter"][0]["problem"][1]["problem_name"][0], "Eczema");

    let from_structured = build(&index, Format::Structured, &structured);
    let flat_from_structured = flatten_composition(&index, &from_structured, Format::Flat, None).unwrap();
    assert_eq!(flat, flat_from_structured);
}

#[test]
fn test_structured_view_of_a_flat_document() {
    let flat: indexmap::IndexMap<String, Value> = encounter_document()
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let structured = flat_to_structured(&flat).unwrap();
    let index = SchemaIndex::build(&fixture_template()).unwrap();

    let from_flat = build(&index, Format::Flat, &encounter_document());
    let from_structured = build(&index, Format::Structured, &structured);
    assert_eq!(
        flatten_composition(&index, &from_flat, Format::Flat, None).unwrap(),
        flatten_composition(&index, &from_structured, Format::Flat, None).unwrap()
    );
    assert!(!structured_to_flat(&structured).unwrap().is_empty());
}

#[test]
fn test_flatten_is_deterministic() {
    let index = SchemaIndex::build(&fixture_template()).unwrap();
    let raw = build(&index, Format::Flat, &encounter_document());

    let first = serde_json::to_string(&flatten_composition(&index, &raw, Format::Flat, None).unwrap()).unwrap();
    let second = serde_json::to_string(&flatten_composition(&index, &raw, Format::Flat, None).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_indexing_is_repeatable() {
    let template = fixture_template();
    let first = SchemaIndex::build(&template).unwrap();
    let second = SchemaIndex::build(&template).unwrap();

    assert_eq!(first.len(), second.len());
    assert_eq!(first.template_id(), second.template_id());
    for position in 0..first.len() {
        assert_eq!(first.node(position).path, second.node(position).path);
        assert_eq!(first.node(position).placement, second.node(position).placement);
    }

    let raw_first = build(&first, Format::Flat, &encounter_document());
    let raw_second = build(&second, Format::Flat, &encounter_document());
    assert_eq!(raw_first, raw_second);
}

#[test]
fn test_one_index_serves_many_conversions() {
    let index = SchemaIndex::build(&fixture_template()).unwrap();
    let nodes = index.len();

    for name in ["Asthma", "Eczema", "Migraine"] {
        let raw = build(&index, Format::Flat, &json!({"encounter/problem:0/problem_name": name}));
        let flat = flatten_composition(&index, &raw, Format::Flat, None).unwrap();
        assert_eq!(flat["encounter/problem:0/problem_name"], name);
    }
    assert_eq!(index.len(), nodes);
}

#[test]
fn test_quantity_in_a_choice_element() {
    let template = WebTemplate::from_json_str(
        r#"{
            "templateId": "Test Any.v1",
            "defaultLanguage": "en",
            "tree": {
                "id": "encounter", "name": "Encounter", "rmType": "COMPOSITION", "min": 1,
                "nodeId": "openEHR-EHR-COMPOSITION.encounter.v1", "aqlPath": "/",
                "children": [{
                    "id": "test_any", "name": "Test any", "rmType": "EVALUATION", "max": -1,
                    "nodeId": "openEHR-EHR-EVALUATION.test_any.v1",
                    "aqlPath": "/content[openEHR-EHR-EVALUATION.test_any.v1]",
                    "children": [{
                        "id": "any_element", "name": "Any element", "rmType": "ELEMENT", "nodeId": "at0002",
                        "aqlPath": "/content[openEHR-EHR-EVALUATION.test_any.v1]/data[at0001]/items[at0002]",
                        "children": [{
                            "id": "quantity_value", "name": "Any element", "rmType": "DV_QUANTITY",
                            "aqlPath": "/content[openEHR-EHR-EVALUATION.test_any.v1]/data[at0001]/items[at0002]/value",
                            "inputs": [
                                {"suffix": "magnitude", "type": "DECIMAL"},
                                {"suffix": "unit", "type": "CODED_TEXT", "list": [{"value": "mm"}, {"value": "cm"}]}
                            ]
                        }, {
                            "id": "text_value", "name": "Any element", "rmType": "DV_TEXT",
                            "aqlPath": "/content[openEHR-EHR-EVALUATION.test_any.v1]/data[at0001]/items[at0002]/value"
                        }]
                    }]
                }]
            }
        }"#,
    )
    .unwrap();
    let index = SchemaIndex::build(&template).unwrap();
    let context = ContextBag::new()
        .with_language("en")
        .with_territory("IE")
        .with_composer_name("John");

    let raw = build_composition(
        &index,
        Format::Flat,
        &json!({
            "encounter/test_any/any_element/quantity_value|magnitude": 300,
            "encounter/test_any/any_element/quantity_value|unit": "mm"
        }),
        &context,
        &ConversionOptions::default(),
    )
    .unwrap();

    let quantity = &raw["content"][0]["data"]["items"][0]["value"];
    assert_eq!(quantity["_type"], "DV_QUANTITY");
    assert_eq!(quantity["units"], "mm");
    assert_eq!(serde_json::to_string(&quantity["magnitude"]).unwrap(), "300.0");

    let flat = flatten_composition(&index, &raw, Format::Flat, None).unwrap();
    let magnitude = &flat["encounter/test_any:0/any_element/quantity_value|magnitude"];
    assert_eq!(*magnitude, json!(300.0));
    assert_eq!(serde_json::to_string(magnitude).unwrap(), "300.0");
    assert_eq!(flat["encounter/test_any:0/any_element/quantity_value|unit"], "mm");
}

#[test]
fn test_negative_duration_survives_a_round_trip() {
    let index = SchemaIndex::build(&fixture_template()).unwrap();
    let raw = build(
        &index,
        Format::Flat,
        &json!({
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/duration": "-PT30M"
        }),
    );
    let flat = flatten_composition(&index, &raw, Format::Flat, None).unwrap();
    assert_eq!(flat["encounter/problem:0/duration"], "-PT30M");
    assert!(!flat.as_object().unwrap().contains_key("encounter/problem:0/duration|minute"));

    let rebuilt = build(&index, Format::Flat, &flat);
    let flat_again = flatten_composition(&index, &rebuilt, Format::Flat, None).unwrap();
    assert_eq!(flat_again["encounter/problem:0/duration"], "-PT30M");
}

#[test]
fn test_flatten_refuses_to_drop_a_duration_component() {
    let index = SchemaIndex::build(&fixture_template()).unwrap();
    let mut raw = build(
        &index,
        Format::Flat,
        &json!({
            "encounter/problem:0/problem_name": "Asthma",
            "encounter/problem:0/duration|minute": 30
        }),
    );
    for item in raw["content"][0]["data"]["items"].as_array_mut().unwrap() {
        if item["archetype_node_id"] == "at0009" {
            item["value"]["value"] = json!("P2DT30M");
        }
    }

    let err = flatten_composition(&index, &raw, Format::Flat, None).unwrap_err();
    assert!(matches!(err.root_cause(), ConversionError::ConstraintViolation(_)));
    assert_eq!(err.path(), Some("encounter/problem:0/duration"));
}
