//! Answer generation: send each converted sample prompt to the model.
//!
//! Predictions are written next to the prompts as `prediction_<id>.json`
//! holding the raw completion body. Samples that already have a prediction
//! are skipped, so an interrupted run can simply be started again.

use crate::error::{EvalError, Result};
use crate::eval::store::write_atomic;
use crate::llm::{ChatBackend, Message};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Retry settings for answer generation.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Attempts per sample before giving up on it.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Totals of a generation run.
#[derive(Debug, Clone, Default)]
pub struct GenerateSummary {
    /// Samples answered in this run.
    pub generated: usize,
    /// Samples that already had a prediction.
    pub existing: usize,
    /// Ids of samples that failed every attempt.
    pub failed: Vec<String>,
}

/// `sample_<id>.txt` files directly inside `dir`, ordered by id.
pub fn sample_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
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
        let Some(id) = name
            .strip_prefix("sample_")
            .and_then(|rest| rest.strip_suffix(".txt"))
        else {
            continue;
        };
        found.push((id.to_string(), entry.path().to_path_buf()));
    }

    found.sort_by(|(a, _), (b, _)| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    });
    Ok(found)
}

/// Answer every sample prompt in `output_dir` that has no prediction yet.
pub async fn generate_answers<B: ChatBackend>(
    backend: &B,
    output_dir: &Path,
    options: &GenerateOptions,
) -> Result<GenerateSummary> {
    let samples = sample_files(output_dir)?;
    info!(samples = samples.len(), dir = %output_dir.display(), "generating answers");

    let mut summary = GenerateSummary::default();
    for (id, path) in samples {
        let prediction_path = output_dir.join(format!("prediction_{}.json", id));
        if prediction_path.exists() {
            info!(sample = %id, "prediction exists, skipping");
            summary.existing += 1;
            continue;
        }

        let prompt = fs::read_to_string(&path).map_err(|e| EvalError::io(&path, e))?;
        let attempts = options.max_retries.max(1);
        let mut saved = false;

        for attempt in 1..=attempts {
            match backend.chat(vec![Message::user(prompt.as_str())]).await {
                Ok(response) => {
                    let data = serde_json::to_vec_pretty(&response.raw)
                        .map_err(|e| EvalError::Serialization(e.to_string()))?;
                    write_atomic(&prediction_path, &data)?;
                    info!(sample = %id, path = %prediction_path.display(), "prediction saved");
                    saved = true;
                    break;
                }
                Err(e) => warn!(sample = %id, attempt, error = %e, "answer generation failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(options.retry_delay).await;
            }
        }

        if saved {
            summary.generated += 1;
        } else {
            warn!(sample = %id, "giving up on sample");
            summary.failed.push(id);
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::testing::ScriptedBackend;
    use tempfile::TempDir;

    fn options() -> GenerateOptions {
        GenerateOptions {
            max_retries: 2,
            retry_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_sample_files_are_ordered_numerically() {
        let dir = TempDir::new().unwrap();
        for name in ["sample_10.txt", "sample_2.txt", "answers_2.json", "sample_x.md"] {
            fs::write(dir.path().join(name), "prompt").unwrap();
        }
        let ids: Vec<String> = sample_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["2", "10"]);
    }

    #[tokio::test]
    async fn test_generates_missing_predictions_with_retry() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("sample_0.txt"), "dialogue 0").unwrap();
        fs::write(dir.path().join("sample_1.txt"), "dialogue 1").unwrap();
        fs::write(dir.path().join("sample_2.txt"), "dialogue 2").unwrap();
        fs::write(dir.path().join("prediction_1.json"), "{}").unwrap();

        // sample 0 fails once then succeeds; sample 2 fails both attempts
        let backend = ScriptedBackend::new(vec![
            None,
            Some(r#"{"0":"Paris"}"#.to_string()),
            None,
            None,
        ]);
        let summary = generate_answers(&backend, dir.path(), &options())
            .await
            .unwrap();

        assert_eq!(summary.generated, 1);
        assert_eq!(summary.existing, 1);
        assert_eq!(summary.failed, vec!["2".to_string()]);
        assert_eq!(backend.calls(), 4);

        let saved: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("prediction_0.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["choices"][0]["message"]["content"], r#"{"0":"Paris"}"#);
        assert!(!dir.path().join("prediction_2.json").exists());
    }
}
