//! LLM-as-judge for answer correctness.
//!
//! Model output is untrusted free text. Every failure (transport, API,
//! missing braces, invalid JSON) degrades to "no verdict" for the affected
//! ids instead of an error, and is logged together with the raw content.

use super::record::Item;
use crate::config::LlmConfig;
use crate::error::{EvalError, Result};
use crate::llm::{ChatBackend, LlmClient, Prompts, json, render};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Verdicts for one batch: item id to 1 (correct), 0 (incorrect) or `None`.
pub type Verdicts = HashMap<String, Option<u8>>;

/// LLM-as-Judge for evaluating answer correctness.
pub struct LlmJudge<B> {
    backend: B,
}

impl LlmJudge<LlmClient> {
    /// Create from LLM config.
    pub fn from_config(config: LlmConfig) -> Result<Self> {
        Ok(Self::new(LlmClient::new(config)?))
    }
}

impl<B: ChatBackend> LlmJudge<B> {
    /// Create a new judge with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Judge a batch of items with a single LLM call.
    ///
    /// Never fails: on any error every submitted id maps to `None`.
    pub async fn judge_batch(&self, items: &[Item]) -> Verdicts {
        if items.is_empty() {
            return Verdicts::new();
        }

        let prompt = Self::build_batch_prompt(items);
        let content = match self.backend.complete(None, &prompt).await {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, items = items.len(), "batch judge call failed");
                return Self::no_verdicts(items);
            }
        };

        match Self::parse_batch_response(&content, items) {
            Ok(verdicts) => verdicts,
            Err(e) => {
                warn!(error = %e, raw = %content, "could not parse batch judge response");
                Self::no_verdicts(items)
            }
        }
    }

    /// Judge one item; the model is asked for a bare `1` or `0`.
    ///
    /// Every failure path returns `None`; callers decide how to treat it.
    pub async fn judge_one(&self, item: &Item) -> Option<u8> {
        let prompt = render(
            Prompts::judge_single(),
            &[
                ("question", item.question.as_str()),
                ("reference", item.reference_answer.as_str()),
                ("candidate", item.candidate_answer.as_str()),
            ],
        );

        match self.backend.complete(None, &prompt).await {
            Ok(content) => {
                let verdict = Self::parse_single_response(&content);
                if verdict.is_none() {
                    warn!(id = %item.id, raw = %content, "unrecognised judge verdict");
                }
                verdict
            }
            Err(e) => {
                warn!(id = %item.id, error = %e, "judge call failed");
                None
            }
        }
    }

    /// Render the batched prompt: header, one block per item, JSON example.
    pub fn build_batch_prompt(items: &[Item]) -> String {
        let blocks: Vec<String> = items
            .iter()
            .map(|item| {
                render(
                    Prompts::judge_batch_item(),
                    &[
                        ("id", item.id.as_str()),
                        ("question", item.question.as_str()),
                        ("reference", item.reference_answer.as_str()),
                        ("candidate", item.candidate_answer.as_str()),
                    ],
                )
            })
            .collect();

        format!(
            "{}\n{}\n{}",
            Prompts::judge_batch_header(),
            blocks.join("\n"),
            Prompts::judge_batch_footer()
        )
    }

    /// Parse the first JSON object of a batch response into per-id verdicts.
    ///
    /// Ids the model left out, or answered with something other than 0/1,
    /// get `None`. Ids that were not asked for are ignored.
    pub fn parse_batch_response(content: &str, items: &[Item]) -> Result<Verdicts> {
        let map = json::parse_first_object(content).map_err(|e| match e {
            EvalError::LlmParse(msg) => {
                EvalError::LlmParse(format!("Failed to parse judge response: {}", msg))
            }
            other => other,
        })?;

        Ok(items
            .iter()
            .map(|item| {
                let verdict = map.get(&item.id).and_then(verdict_of);
                if verdict.is_none() {
                    debug!(id = %item.id, "no usable verdict for item");
                }
                (item.id.clone(), verdict)
            })
            .collect())
    }

    /// Leading `1`/`0` of the trimmed content, if any.
    fn parse_single_response(content: &str) -> Option<u8> {
        let trimmed = content.trim().trim_start_matches(['`', '"', '\'']);
        match trimmed.chars().next() {
            Some('1') => Some(1),
            Some('0') => Some(0),
            _ => None,
        }
    }

    fn no_verdicts(items: &[Item]) -> Verdicts {
        items.iter().map(|item| (item.id.clone(), None)).collect()
    }
}

/// Accept 0/1 as integers, integral floats, strings or booleans.
fn verdict_of(value: &Value) -> Option<u8> {
    match value {
        Value::Bool(b) => Some(u8::from(*b)),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 0.0 => Some(0),
            Some(v) if v == 1.0 => Some(1),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "0" => Some(0),
            "1" => Some(1),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::testing::{ScriptedBackend, item};

    type Judge = LlmJudge<ScriptedBackend>;

    #[test]
    fn test_parse_fenced_batch_response() {
        let items = vec![item("7", "a", "a", 1), item("8", "b", "c", 1)];
        let content = "Here you go: ```json\n{\"7\":1,\"8\":0}\n``` thanks";
        let verdicts = Judge::parse_batch_response(content, &items).unwrap();
        assert_eq!(verdicts["7"], Some(1));
        assert_eq!(verdicts["8"], Some(0));
    }

    #[test]
    fn test_parse_lenient_verdict_encodings() {
        let items = vec![
            item("1", "q", "a", 1),
            item("2", "q", "a", 1),
            item("3", "q", "a", 1),
            item("4", "q", "a", 1),
        ];
        let content = r#"{"1":"1","2":true,"3":"maybe","99":1}"#;
        let verdicts = Judge::parse_batch_response(content, &items).unwrap();
        assert_eq!(verdicts["1"], Some(1));
        assert_eq!(verdicts["2"], Some(1));
        assert_eq!(verdicts["3"], None);
        assert_eq!(verdicts["4"], None);
        assert!(!verdicts.contains_key("99"));
    }

    #[test]
    fn test_batch_prompt_lists_every_item() {
        let items = vec![
            item("10", "Caroline", "Caroline", 1),
            item("11", "Rome", "Paris", 2),
        ];
        let prompt = Judge::build_batch_prompt(&items);
        assert!(prompt.contains(
            "Id: 10\nQuestion: question 10\nReference answer: Caroline\nModel answer: Caroline"
        ));
        assert!(prompt.contains(
            "Id: 11\nQuestion: question 11\nReference answer: Rome\nModel answer: Paris"
        ));
        assert!(prompt.find("Id: 10").unwrap() < prompt.find("Id: 11").unwrap());
        assert!(prompt.ends_with(r#"{"1":1,"2":0}"#));
    }

    #[tokio::test]
    async fn test_malformed_response_yields_null_for_every_id() {
        let backend = ScriptedBackend::new(vec![Some("I think they are all right.".to_string())]);
        let judge = LlmJudge::new(backend);
        let items = vec![item("1", "q", "a", 1), item("2", "q", "b", 1)];

        let verdicts = judge.judge_batch(&items).await;
        assert_eq!(verdicts.len(), 2);
        assert!(verdicts.values().all(Option::is_none));
    }

    #[tokio::test]
    async fn test_transport_failure_yields_null_for_every_id() {
        let judge = LlmJudge::new(ScriptedBackend::new(vec![None]));
        let items = vec![item("1", "q", "a", 1)];
        let verdicts = judge.judge_batch(&items).await;
        assert_eq!(verdicts["1"], None);
    }

    #[tokio::test]
    async fn test_judge_one() {
        let judge = LlmJudge::new(ScriptedBackend::new(vec![
            Some(" 1".to_string()),
            Some("\"0\" because it is wrong".to_string()),
            Some("Correct!".to_string()),
            None,
        ]));
        let it = item("1", "q", "a", 1);
        assert_eq!(judge.judge_one(&it).await, Some(1));
        assert_eq!(judge.judge_one(&it).await, Some(0));
        assert_eq!(judge.judge_one(&it).await, None);
        assert_eq!(judge.judge_one(&it).await, None);
    }
}
