//! Items to evaluate and the scored records persisted for them.

use super::metrics::MetricScores;
use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// One evaluation unit: a question, its reference answer and the model's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Stable key, unique within the input file.
    pub id: String,
    pub question: String,
    pub reference_answer: String,
    pub candidate_answer: String,
    /// Grouping tag. Kept as loaded; coerced to an integer only when aggregating.
    pub category: Value,
}

impl Item {
    /// Build an item from one entry of the merged input file.
    ///
    /// The entry must carry `question`, `answer`, `response` and `category`.
    /// Non-string answers (years, counts) are rendered to text.
    pub fn from_value(id: &str, value: &Value) -> Result<Self> {
        let field = |name: &'static str| -> Result<&Value> {
            match value.get(name) {
                Some(Value::Null) | None => Err(EvalError::DataIncomplete {
                    id: id.to_string(),
                    field: name,
                }),
                Some(v) => Ok(v),
            }
        };

        Ok(Self {
            id: id.to_string(),
            question: text_of(field("question")?),
            reference_answer: text_of(field("answer")?),
            candidate_answer: text_of(field("response")?),
            category: field("category")?.clone(),
        })
    }
}

/// Render a JSON value as plain text: strings as-is, everything else as JSON.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Load the merged items file: a JSON object keyed by item id, in file order.
pub fn load_items(path: &Path) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        EvalError::Serialization(format!("Failed to parse items file {:?}: {}", path, e))
    })
}

/// Persisted result for one item.
///
/// Score fields hold raw JSON values so that a hand-edited or legacy store
/// still loads; they are coerced (and any fallback reported) by the
/// aggregator. The aliases accept stores written with the older
/// `answer`/`response`/`bleu_score`/`f1_score`/`llm_score` field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    #[serde(default)]
    pub question: String,
    #[serde(alias = "answer", default)]
    pub reference_answer: String,
    #[serde(alias = "response", default)]
    pub candidate_answer: String,
    #[serde(default)]
    pub category: Value,
    #[serde(alias = "bleu_score", default)]
    pub similarity_score: Value,
    #[serde(alias = "f1_score", default)]
    pub overlap_f1: Value,
    #[serde(alias = "llm_score", default)]
    pub judge_score: Value,
}

impl ScoredRecord {
    /// Record for an item that went through scoring and judging.
    pub fn new(item: &Item, scores: MetricScores, judge_score: Option<u8>) -> Self {
        Self {
            question: item.question.clone(),
            reference_answer: item.reference_answer.clone(),
            candidate_answer: item.candidate_answer.clone(),
            category: item.category.clone(),
            similarity_score: Value::from(scores.similarity_score),
            overlap_f1: Value::from(scores.overlap_f1),
            judge_score: judge_score.map(Value::from).unwrap_or(Value::Null),
        }
    }

    /// Whether the judge verdict is present; such records are never re-judged.
    pub fn has_judge_score(&self) -> bool {
        !self.judge_score.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_from_complete_entry() {
        let entry = json!({
            "question": "When did Caroline go to the LGBTQ support group?",
            "answer": 2023,
            "response": "7 May 2023",
            "category": 2
        });
        let item = Item::from_value("4", &entry).unwrap();
        assert_eq!(item.id, "4");
        assert_eq!(item.reference_answer, "2023");
        assert_eq!(item.candidate_answer, "7 May 2023");
        assert_eq!(item.category, json!(2));
    }

    #[test]
    fn test_item_missing_response_is_incomplete() {
        let entry = json!({"question": "q", "answer": "a", "category": 1});
        match Item::from_value("9", &entry) {
            Err(EvalError::DataIncomplete { id, field }) => {
                assert_eq!(id, "9");
                assert_eq!(field, "response");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let entry = json!({"question": "q", "answer": "a", "response": null, "category": 1});
        assert!(Item::from_value("9", &entry).is_err());
    }

    #[test]
    fn test_record_accepts_legacy_field_names() {
        let legacy = json!({
            "question": "q",
            "answer": "a",
            "response": "b",
            "category": "3",
            "bleu_score": 0.25,
            "f1_score": "0.5",
            "llm_score": 1
        });
        let record: ScoredRecord = serde_json::from_value(legacy).unwrap();
        assert_eq!(record.reference_answer, "a");
        assert_eq!(record.candidate_answer, "b");
        assert_eq!(record.overlap_f1, json!("0.5"));
        assert!(record.has_judge_score());
    }

    #[test]
    fn test_record_without_verdict() {
        let item = Item::from_value(
            "1",
            &json!({"question": "q", "answer": "a", "response": "a", "category": 1}),
        )
        .unwrap();
        let record = ScoredRecord::new(
            &item,
            MetricScores {
                similarity_score: 1.0,
                overlap_f1: 1.0,
            },
            None,
        );
        assert!(!record.has_judge_score());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["judge_score"], Value::Null);
        assert_eq!(json["reference_answer"], "a");
    }
}
