//! Test doubles shared by the evaluation tests.

use super::record::Item;
use crate::error::{EvalError, Result};
use crate::llm::{ChatBackend, LlmResponse, Message};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Backend that replays scripted replies (`None` = transport failure).
///
/// Once the script is exhausted it approves every `Id: <id>` line found in
/// the prompt, or answers `1` to prompts without ids.
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub(crate) fn new(replies: Vec<Option<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn approving() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn approve_all(prompt: &str) -> String {
        let ids: Vec<&str> = prompt
            .lines()
            .filter_map(|line| line.strip_prefix("Id: "))
            .collect();
        if ids.is_empty() {
            return "1".to_string();
        }
        let verdicts: Map<String, Value> =
            ids.into_iter().map(|id| (id.to_string(), json!(1))).collect();
        Value::Object(verdicts).to_string()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Some(content)) => Ok(LlmResponse::from_content(content)),
            Some(None) => Err(EvalError::Http("connection reset".to_string())),
            None => Ok(LlmResponse::from_content(Self::approve_all(&prompt))),
        }
    }
}

/// Build an item with the given answers.
pub(crate) fn item(id: &str, reference: &str, candidate: &str, category: i64) -> Item {
    Item {
        id: id.to_string(),
        question: format!("question {}", id),
        reference_answer: reference.to_string(),
        candidate_answer: candidate.to_string(),
        category: json!(category),
    }
}

/// Merged-input entries as they appear in `merged_answers_all.json`.
pub(crate) fn entries(specs: &[(&str, &str, &str, i64)]) -> Map<String, Value> {
    specs
        .iter()
        .map(|(id, reference, candidate, category)| {
            (
                id.to_string(),
                json!({
                    "question": format!("question {}", id),
                    "answer": reference,
                    "response": candidate,
                    "category": category,
                }),
            )
        })
        .collect()
}
