//! Decoding of answer records from the data file.
//!
//! Answer data is loosely shaped: each level is a list of mappings keyed by
//! question id. Entries that cannot be matched to a question are dropped and
//! reported instead of aborting the run.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{InputError, type_name};

/// One `{id, answer, questions, answers, app}` record.
///
/// Nested `questions` and `answers` stay raw until the binder descends into
/// them, so each level is decoded against the module it targets.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    pub id: String,
    pub answer: Option<Value>,
    pub questions: Value,
    pub answers: Value,
    pub app: Option<Value>,
}

/// A dropped entry from an answer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub index: usize,
    pub reason: String,
}

/// Result of decoding one answer list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedAnswers {
    /// Records by question id. A later record for the same id replaces an earlier one.
    pub by_id: HashMap<String, AnswerRecord>,
    pub rejected: Vec<RejectedRecord>,
}

impl DecodedAnswers {
    pub fn get(&self, id: &str) -> Option<&AnswerRecord> {
        self.by_id.get(id)
    }
}

/// One item of a `module` or `module-set` answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleItem {
    pub app: Option<Value>,
    pub questions: Value,
}

/// Decode an answer list. A value that is not a sequence is fatal.
pub fn decode_answer_list(raw: &Value) -> Result<DecodedAnswers, InputError> {
    let items = raw.as_array().ok_or_else(|| {
        InputError::MalformedAnswers(format!(
            "answer list must be a sequence (got {})",
            type_name(raw)
        ))
    })?;

    let mut decoded = DecodedAnswers::default();
    for (index, item) in items.iter().enumerate() {
        match decode_record(item) {
            Ok(record) => {
                decoded.by_id.insert(record.id.clone(), record);
            }
            Err(reason) => decoded.rejected.push(RejectedRecord { index, reason }),
        }
    }
    Ok(decoded)
}

fn decode_record(item: &Value) -> Result<AnswerRecord, String> {
    let map = item
        .as_object()
        .ok_or_else(|| format!("expected a mapping (got {})", type_name(item)))?;
    let id = match map.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => return Err(format!("'id' must be a string (got {})", type_name(other))),
        None => return Err("missing 'id'".to_string()),
    };
    Ok(AnswerRecord {
        id,
        answer: map.get("answer").cloned(),
        questions: list_field(map, "questions"),
        answers: list_field(map, "answers"),
        app: map.get("app").cloned(),
    })
}

fn list_field(map: &Map<String, Value>, key: &str) -> Value {
    map.get(key)
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()))
}

impl AnswerRecord {
    /// The record itself as the single item of a `module` answer.
    pub fn as_module_item(&self) -> ModuleItem {
        ModuleItem {
            app: self.app.clone(),
            questions: self.questions.clone(),
        }
    }

    /// The `answers` list of a `module-set` answer.
    pub fn module_set_items(&self) -> Result<Vec<ModuleItem>, InputError> {
        let items = self.answers.as_array().ok_or_else(|| {
            InputError::MalformedAnswers(format!(
                "'answers' for '{}' must be a sequence (got {})",
                self.id,
                type_name(&self.answers)
            ))
        })?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let map = item.as_object().ok_or_else(|| {
                    InputError::MalformedAnswers(format!(
                        "item {i} of '{}' must be a mapping (got {})",
                        self.id,
                        type_name(item)
                    ))
                })?;
                Ok(ModuleItem {
                    app: map.get("app").cloned(),
                    questions: list_field(map, "questions"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_sequence_is_fatal() {
        let err = decode_answer_list(&json!({"id": "q1"})).expect_err("should fail");
        assert!(matches!(err, InputError::MalformedAnswers(_)));
    }

    #[test]
    fn drops_unusable_entries_and_reports_them() {
        let decoded = decode_answer_list(&json!([
            "q1",
            {"answer": "no id"},
            {"id": 4, "answer": "numeric id"},
            {"id": "q2", "answer": "ok"},
        ]))
        .expect("decode");

        assert_eq!(decoded.by_id.len(), 1);
        assert!(decoded.get("q2").is_some());
        let indexes: Vec<usize> = decoded.rejected.iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(decoded.rejected[1].reason.contains("missing 'id'"));
    }

    #[test]
    fn later_record_for_same_id_wins() {
        let decoded = decode_answer_list(&json!([
            {"id": "q1", "answer": "first"},
            {"id": "q1", "answer": "second"},
        ]))
        .expect("decode");
        assert_eq!(
            decoded.get("q1").and_then(|r| r.answer.clone()),
            Some(json!("second"))
        );
    }

    #[test]
    fn missing_nested_lists_default_to_empty() {
        let decoded = decode_answer_list(&json!([{"id": "q1"}])).expect("decode");
        let record = decoded.get("q1").expect("record");
        assert_eq!(record.questions, json!([]));
        assert_eq!(record.answers, json!([]));
        assert!(record.answer.is_none());
        assert!(record.module_set_items().expect("items").is_empty());
    }

    #[test]
    fn module_set_items_must_be_mappings() {
        let decoded =
            decode_answer_list(&json!([{"id": "s", "answers": [{"app": "a/b"}, "c/d"]}]))
                .expect("decode");
        let err = decoded
            .get("s")
            .expect("record")
            .module_set_items()
            .expect_err("should fail");
        assert!(err.to_string().contains("item 1"));
    }
}
