//! Conversion of a multi-session dialogue dataset into answering prompts.
//!
//! Each sample becomes `sample_{i}.txt` (the dialogue, instructions and
//! numbered questions) plus `answers_{i}.json` (the reference answers keyed
//! by question number).

use crate::error::{EvalError, Result};
use crate::eval::record::text_of;
use crate::llm::{Prompts, render};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Timestamp format used by the dataset, e.g. `1:56 pm on 8 May, 2023`.
const SOURCE_DATE_FORMAT: &str = "%I:%M %p on %d %B, %Y";

/// Timestamp format written into prompts, e.g. `May 08, 2023 at 01:56 PM`.
const PROMPT_DATE_FORMAT: &str = "%B %d, %Y at %I:%M %p";

/// Adversarial questions have no answer in the dialogue and are not asked.
const ADVERSARIAL_CATEGORY: i64 = 5;

/// One dataset sample: a conversation and the questions about it.
#[derive(Debug, Clone, Deserialize)]
pub struct Sample {
    pub conversation: Map<String, Value>,
    #[serde(default)]
    pub qa: Vec<QaPair>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QaPair {
    pub question: Value,
    #[serde(default)]
    pub answer: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct Turn {
    speaker: String,
    text: String,
    #[serde(default)]
    img_url: Option<Vec<String>>,
    #[serde(default)]
    blip_caption: Option<String>,
}

/// Rendered output for one sample.
#[derive(Debug, Clone)]
pub struct RenderedSample {
    /// Prompt text for `sample_{i}.txt`.
    pub prompt: String,
    /// Reference answers for `answers_{i}.json`.
    pub answers: Map<String, Value>,
    /// QA pairs left out because they had no answer.
    pub skipped: usize,
}

/// Totals of a conversion run.
#[derive(Debug, Clone, Default)]
pub struct ConvertSummary {
    pub samples: usize,
    pub questions: usize,
    pub skipped: usize,
}

/// Load the dataset: a JSON array of samples.
pub fn load_samples(path: &Path) -> Result<Vec<Sample>> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| EvalError::Dataset(format!("Failed to parse dataset {:?}: {}", path, e)))
}

/// Convert every sample of `dataset` into prompt and answer files in `output_dir`.
pub fn convert_dataset(dataset: &Path, output_dir: &Path) -> Result<ConvertSummary> {
    if !dataset.exists() {
        return Err(EvalError::Dataset(format!(
            "Dataset file not found: {:?}",
            dataset
        )));
    }

    let samples = load_samples(dataset)?;
    fs::create_dir_all(output_dir).map_err(|e| EvalError::io(output_dir, e))?;
    info!(samples = samples.len(), output_dir = %output_dir.display(), "converting dataset");

    let mut summary = ConvertSummary::default();
    for (i, sample) in samples.iter().enumerate() {
        let rendered = render_sample(sample, i)?;

        let prompt_path = output_dir.join(format!("sample_{}.txt", i));
        fs::write(&prompt_path, &rendered.prompt).map_err(|e| EvalError::io(&prompt_path, e))?;

        let answers_path = output_dir.join(format!("answers_{}.json", i));
        let data = serde_json::to_string_pretty(&rendered.answers)
            .map_err(|e| EvalError::Serialization(e.to_string()))?;
        fs::write(&answers_path, data).map_err(|e| EvalError::io(&answers_path, e))?;

        summary.samples += 1;
        summary.questions += rendered.answers.len();
        summary.skipped += rendered.skipped;
    }

    Ok(summary)
}

/// Render one sample's prompt and answer key. `index` is only used in errors.
pub fn render_sample(sample: &Sample, index: usize) -> Result<RenderedSample> {
    let conversation = &sample.conversation;
    let speaker = |key: &str| {
        conversation
            .get(key)
            .map(text_of)
            .unwrap_or_default()
    };

    let mut lines = vec![render(
        Prompts::dialogue_header(),
        &[
            ("speaker_a", speaker("speaker_a").as_str()),
            ("speaker_b", speaker("speaker_b").as_str()),
        ],
    )];

    for (when, turns) in sessions(conversation, index)? {
        lines.push(when.format(PROMPT_DATE_FORMAT).to_string());
        for turn in turns {
            lines.push(format!("{}：{}", turn.speaker, turn.text));
            let caption = turn.blip_caption.as_deref().unwrap_or("");
            for url in turn.img_url.iter().flatten() {
                lines.push(format!("img({}) ({})", url, caption));
            }
        }
        lines.push(String::new());
    }

    lines.extend(Prompts::answer_instructions().iter().map(|s| s.to_string()));

    let mut answers = Map::new();
    let mut skipped = 0;
    for (idx, qa) in sample.qa.iter().enumerate() {
        let category = qa.category.clone().unwrap_or(Value::Null);
        if category.as_i64() == Some(ADVERSARIAL_CATEGORY) {
            continue;
        }
        let Some(answer) = qa.answer.clone() else {
            warn!(sample = index, question = idx, "question has no reference answer, skipping");
            skipped += 1;
            continue;
        };

        let question = text_of(&qa.question);
        lines.push(format!("{}:{}", idx, question));
        answers.insert(
            idx.to_string(),
            json!({
                "category": category,
                "answer": answer,
                "question": question,
            }),
        );
    }

    Ok(RenderedSample {
        prompt: lines.join("\n"),
        answers,
        skipped,
    })
}

/// Dated sessions of a conversation in chronological order.
fn sessions(
    conversation: &Map<String, Value>,
    index: usize,
) -> Result<Vec<(NaiveDateTime, Vec<Turn>)>> {
    let mut found = Vec::new();

    for (key, value) in conversation {
        let Some(number) = key.strip_prefix("session_") else {
            continue;
        };
        if key.ends_with("_date_time") {
            continue;
        }
        let Some(date) = conversation.get(&format!("{}_date_time", key)) else {
            continue;
        };

        let date = text_of(date);
        let when = NaiveDateTime::parse_from_str(date.trim(), SOURCE_DATE_FORMAT).map_err(|e| {
            EvalError::Dataset(format!(
                "sample {}: cannot parse {} date '{}': {}",
                index, key, date, e
            ))
        })?;
        let turns: Vec<Turn> = serde_json::from_value(value.clone()).map_err(|e| {
            EvalError::Dataset(format!("sample {}: malformed {}: {}", index, key, e))
        })?;

        let order = number.parse::<u32>().unwrap_or(u32::MAX);
        found.push((when, order, turns));
    }

    found.sort_by_key(|(when, order, _)| (*when, *order));
    Ok(found.into_iter().map(|(when, _, turns)| (when, turns)).collect())
}
