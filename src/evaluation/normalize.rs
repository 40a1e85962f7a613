use serde_json::{Map, Value};

use crate::model::RetrievedCandidate;
use crate::store::{RawResults, ResultRow};

// Identifier priority: flattened `doc_id`, then `id`, then the first of
// METADATA_ID_KEYS inside `metadata`. Tuples use position 0 as `id`.
const METADATA_ID_KEYS: [&str; 3] = ["doc_id", "docId", "id"];
const TUPLE_DISTANCE_MIN_LEN: usize = 5;

pub fn normalize(
    raw_results: Option<&RawResults>,
    top_k: usize,
) -> (Vec<Option<String>>, Vec<Option<f64>>) {
    normalize_candidates(raw_results, top_k)
        .into_iter()
        .map(|candidate| (candidate.identifier, candidate.distance))
        .unzip()
}

pub fn normalize_candidates(
    raw_results: Option<&RawResults>,
    top_k: usize,
) -> Vec<RetrievedCandidate> {
    let Some(raw_results) = raw_results else {
        return Vec::new();
    };

    match raw_results {
        RawResults::Rows(rows) => rows.iter().take(top_k).map(candidate_from_row).collect(),
        RawResults::Tuples(tuples) => tuples
            .iter()
            .take(top_k)
            .map(|tuple| candidate_from_tuple(tuple))
            .collect(),
        RawResults::Objects(objects) => objects
            .iter()
            .take(top_k)
            .map(candidate_from_object)
            .collect(),
    }
}

fn candidate_from_row(row: &ResultRow) -> RetrievedCandidate {
    let identifier = non_null(row.get("doc_id"))
        .or_else(|| non_null(row.get("id")))
        .or_else(|| row.get("metadata").and_then(metadata_identifier));

    RetrievedCandidate {
        identifier: identifier.and_then(identifier_text),
        distance: row.get("distance").and_then(numeric_value),
    }
}

fn candidate_from_tuple(tuple: &[Value]) -> RetrievedCandidate {
    let identifier =
        non_null(tuple.first()).or_else(|| tuple.get(1).and_then(metadata_identifier));

    let distance = if tuple.len() >= TUPLE_DISTANCE_MIN_LEN {
        tuple.last().and_then(numeric_value)
    } else {
        None
    };

    RetrievedCandidate {
        identifier: identifier.and_then(identifier_text),
        distance,
    }
}

fn candidate_from_object(value: &Value) -> RetrievedCandidate {
    match value {
        Value::Object(fields) => candidate_from_row(fields),
        Value::String(_) | Value::Number(_) => RetrievedCandidate {
            identifier: identifier_text(value),
            distance: None,
        },
        _ => RetrievedCandidate {
            identifier: None,
            distance: None,
        },
    }
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|value| !value.is_null())
}

fn metadata_identifier(metadata: &Value) -> Option<&Value> {
    let Value::Object(fields) = metadata else {
        return None;
    };
    first_present(fields, &METADATA_ID_KEYS)
}

fn first_present<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| non_null(fields.get(*key)))
}

fn identifier_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };

    (!text.is_empty()).then_some(text)
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::{normalize, normalize_candidates};
    use crate::model::RetrievedCandidate;
    use crate::store::{RawResults, ResultRow};

    fn row(value: Value) -> ResultRow {
        match value {
            Value::Object(fields) => fields,
            other => panic!("fixture must be an object, got {other}"),
        }
    }

    #[test]
    fn flattened_doc_id_beats_nested_metadata() {
        let raw = RawResults::Rows(vec![row(json!({
            "doc_id": "doc42",
            "id": "uuid-1",
            "metadata": {"doc_id": "other"},
            "distance": 0.12
        }))]);

        let (ids, distances) = normalize(Some(&raw), 5);
        assert_eq!(ids, vec![Some("doc42".to_string())]);
        assert_eq!(distances, vec![Some(0.12)]);
    }

    #[test]
    fn row_priority_falls_through_null_fields() {
        let raw = RawResults::Rows(vec![
            row(json!({"doc_id": null, "id": 17, "metadata": {"doc_id": "M"}})),
            row(json!({"doc_id": null, "id": null, "metadata": {"docId": " M2 ", "id": "x"}})),
            row(json!({"metadata": {"id": "M3"}, "distance": "0.5"})),
            row(json!({"metadata": "not a mapping", "distance": "far"})),
        ]);

        let (ids, distances) = normalize(Some(&raw), 10);
        assert_eq!(
            ids,
            vec![
                Some("17".to_string()),
                Some("M2".to_string()),
                Some("M3".to_string()),
                None
            ]
        );
        assert_eq!(distances, vec![None, None, Some(0.5), None]);
    }

    #[test]
    fn record_without_identifier_degrades_to_none() {
        let raw = RawResults::Rows(vec![row(json!({"content": "text only"}))]);
        let candidates = normalize_candidates(Some(&raw), 3);
        assert_eq!(
            candidates,
            vec![RetrievedCandidate {
                identifier: None,
                distance: None
            }]
        );
    }

    #[test]
    fn tuples_use_position_zero_then_metadata_and_trailing_distance() {
        let raw = RawResults::Tuples(vec![
            vec![
                json!(" D1 "),
                json!({"doc_id": "ignored"}),
                json!("content"),
                json!([0.1, 0.2]),
                json!(0.25),
            ],
            vec![json!(null), json!({"docId": "D2"}), json!("content")],
            vec![
                json!(null),
                json!("not metadata"),
                json!("content"),
                json!([]),
                json!("nan-ish"),
            ],
            vec![],
        ]);

        let (ids, distances) = normalize(Some(&raw), 10);
        assert_eq!(
            ids,
            vec![Some("D1".to_string()), Some("D2".to_string()), None, None]
        );
        assert_eq!(distances, vec![Some(0.25), None, None, None]);
    }

    #[test]
    fn generic_objects_accept_scalars_and_mappings() {
        let raw = RawResults::Objects(vec![
            json!("D7"),
            json!(8),
            json!({"id": "D9", "distance": 1.5}),
            json!(["nested"]),
            json!(null),
        ]);

        let (ids, distances) = normalize(Some(&raw), 10);
        assert_eq!(
            ids,
            vec![
                Some("D7".to_string()),
                Some("8".to_string()),
                Some("D9".to_string()),
                None,
                None
            ]
        );
        assert_eq!(distances, vec![None, None, Some(1.5), None, None]);
    }

    #[test]
    fn output_is_truncated_to_top_k_without_reordering() {
        let raw = RawResults::Objects(vec![json!("D3"), json!("D1"), json!("D2")]);
        let (ids, distances) = normalize(Some(&raw), 2);
        assert_eq!(ids, vec![Some("D3".to_string()), Some("D1".to_string())]);
        assert_eq!(distances.len(), ids.len());
    }

    #[test]
    fn empty_or_absent_results_yield_empty_lists() {
        let (ids, distances) = normalize(None, 5);
        assert!(ids.is_empty() && distances.is_empty());

        let (ids, distances) = normalize(Some(&RawResults::Rows(Vec::new())), 5);
        assert!(ids.is_empty() && distances.is_empty());
    }

    #[test]
    fn blank_and_nested_identifiers_are_unresolved() {
        let raw = RawResults::Rows(vec![
            row(json!({"doc_id": "   ", "id": "fallback"})),
            row(json!({"doc_id": {"nested": true}})),
        ]);

        let (ids, _) = normalize(Some(&raw), 5);
        assert_eq!(ids, vec![None, None]);
    }
}
