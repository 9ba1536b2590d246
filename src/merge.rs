//! Merge reference answers with the model's predictions into one scoring input.

use crate::config::MERGED_FILENAME;
use crate::error::{EvalError, Result};
use crate::eval::store::write_atomic;
use crate::llm::json::parse_first_object;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Totals of a merge run.
#[derive(Debug, Clone, Default)]
pub struct MergeSummary {
    /// Sample pairs merged.
    pub samples: usize,
    /// Entries written to the merged file.
    pub entries: usize,
    /// Entries that received a model response.
    pub answered: usize,
    /// Predictions whose content could not be parsed.
    pub unparsable: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Files named `<prefix><n>.<ext>` directly inside `dir`, keyed by `n`.
fn numbered_files(dir: &Path, prefix: &str, ext: &str) -> Result<BTreeMap<u64, PathBuf>> {
    let suffix = format!(".{}", ext);
    let mut found = BTreeMap::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            EvalError::io(dir, source)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let number = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(n) = number {
            found.insert(n, entry.path().to_path_buf());
        }
    }
    Ok(found)
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| EvalError::Dataset(format!("Failed to parse {:?}: {}", path, e)))
}

/// Answers keyed by question number from a saved completion body.
pub fn extract_predictions(raw: &Value) -> Result<Map<String, Value>> {
    let content = raw
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| EvalError::LlmParse("prediction has no message content".to_string()))?;
    parse_first_object(&content.replace("\\\"", ""))
}

/// Merge every `answers_<n>.json` with its `prediction_<n>.json` in `output_dir`.
///
/// Entries are renumbered globally in sample order and written to
/// `merged_answers_all.json`.
pub fn merge_predictions(output_dir: &Path) -> Result<MergeSummary> {
    let answers = numbered_files(output_dir, "answers_", "json")?;
    let predictions = numbered_files(output_dir, "prediction_", "json")?;

    let mut merged = Map::new();
    let mut summary = MergeSummary {
        output: output_dir.join(MERGED_FILENAME),
        ..Default::default()
    };

    for (n, answers_path) in &answers {
        let Some(prediction_path) = predictions.get(n) else {
            warn!(sample = n, "no prediction for sample, skipping");
            continue;
        };

        let Value::Object(entries) = read_json(answers_path)? else {
            return Err(EvalError::Dataset(format!(
                "{:?} is not a JSON object",
                answers_path
            )));
        };

        let responses = match extract_predictions(&read_json(prediction_path)?) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %prediction_path.display(), error = %e, "could not parse prediction");
                summary.unparsable.push(prediction_path.clone());
                Map::new()
            }
        };

        for (key, mut entry) in entries {
            if let (Some(response), Value::Object(fields)) = (responses.get(&key), &mut entry) {
                fields.insert("response".to_string(), response.clone());
                summary.answered += 1;
            }
            merged.insert(summary.entries.to_string(), entry);
            summary.entries += 1;
        }
        summary.samples += 1;
    }

    let data = serde_json::to_vec_pretty(&merged)
        .map_err(|e| EvalError::Serialization(e.to_string()))?;
    write_atomic(&summary.output, &data)?;

    info!(
        samples = summary.samples,
        entries = summary.entries,
        output = %summary.output.display(),
        "merge complete"
    );
    Ok(summary)
}
