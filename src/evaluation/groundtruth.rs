use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::EvalError;
use crate::model::QueryRecord;

pub fn load_groundtruth(path: &Path) -> Result<Vec<QueryRecord>, EvalError> {
    let raw = fs::read(path).map_err(|err| EvalError::malformed(path, err.to_string()))?;
    parse_groundtruth(path, &raw)
}

pub fn parse_groundtruth(path: &Path, raw: &[u8]) -> Result<Vec<QueryRecord>, EvalError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|err| EvalError::malformed(path, format!("invalid json: {err}")))?;

    let Value::Object(entries) = value else {
        return Err(EvalError::malformed(
            path,
            "top level must be an object mapping document ids to question lists",
        ));
    };

    let mut queries = Vec::<QueryRecord>::new();
    for (doc_id, questions) in entries {
        let expected_document_id = doc_id.trim();
        if expected_document_id.is_empty() {
            return Err(EvalError::malformed(path, "document id must not be blank"));
        }

        let Value::Array(questions) = questions else {
            return Err(EvalError::malformed(
                path,
                format!("questions for '{expected_document_id}' must be an array"),
            ));
        };

        for (index, question) in questions.iter().enumerate() {
            let Value::String(question) = question else {
                return Err(EvalError::malformed(
                    path,
                    format!("question {index} for '{expected_document_id}' is not a string"),
                ));
            };

            let question = question.trim();
            if question.is_empty() {
                continue;
            }

            queries.push(QueryRecord {
                question: question.to_string(),
                expected_document_id: expected_document_id.to_string(),
            });
        }
    }

    Ok(queries)
}
