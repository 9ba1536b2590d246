//! The scoring run: batch, judge, score, persist, then aggregate.
//!
//! Batches are processed strictly one after another and the store is flushed
//! after each one, so an interrupted run resumes from the last finished batch.

use super::aggregate::{AggregateReport, aggregate};
use super::batch::{Batch, next_batches};
use super::judge::{LlmJudge, Verdicts};
use super::metrics;
use super::record::ScoredRecord;
use super::store::{Records, ResultStore};
use crate::config::Config;
use crate::error::Result;
use crate::llm::ChatBackend;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Longest wait between two attempts at the same batch.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Settings for a scoring run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Items per judge call.
    pub batch_size: usize,
    /// Pause after every judge call, to stay under the endpoint's rate limit.
    pub request_delay: Duration,
    /// Extra attempts for a batch whose judge call failed as a whole.
    pub judge_retries: u32,
    /// First backoff before retrying a failed batch; doubles per attempt.
    pub retry_backoff: Duration,
    /// Judge items one call each instead of in batches.
    pub single_item: bool,
    /// Result store file.
    pub store_path: PathBuf,
    /// Text report file; nothing is written when `None`.
    pub report_path: Option<PathBuf>,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        let delay = Duration::from_secs(config.request_delay_secs);
        Self {
            batch_size: config.batch_size,
            request_delay: delay,
            judge_retries: config.judge_retries,
            retry_backoff: delay.max(Duration::from_secs(1)),
            single_item: false,
            store_path: config.store_path(),
            report_path: Some(config.report_path()),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Batches judged in this run.
    pub batches: usize,
    /// Items scored in this run.
    pub scored: usize,
    /// Items of this run that ended without a verdict and were recorded as 0.
    pub judge_failures: usize,
    /// Items skipped for missing fields.
    pub skipped: usize,
    /// Items left untouched because a previous run already judged them.
    pub resumed: usize,
    /// Aggregate over the whole store after the run.
    pub report: AggregateReport,
}

/// Drives a judge over pending items and keeps the result store current.
pub struct Pipeline<B> {
    judge: LlmJudge<B>,
    options: PipelineOptions,
}

impl<B: ChatBackend> Pipeline<B> {
    pub fn new(judge: LlmJudge<B>, options: PipelineOptions) -> Self {
        Self { judge, options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Score every pending item of `items`, then aggregate the whole store.
    pub async fn run(&self, items: &Map<String, Value>) -> Result<RunSummary> {
        let mut store = ResultStore::load(&self.options.store_path)?;
        let judged = store.judged_ids();
        info!(
            items = items.len(),
            already_judged = judged.len(),
            "starting scoring run"
        );

        let mut batches = next_batches(items, &judged, self.options.batch_size);
        let mut batch_count = 0;
        let mut scored = 0;
        let mut judge_failures = 0;

        for batch in batches.by_ref() {
            let verdicts = self.judge_with_retry(&batch).await;

            let mut updates = Records::new();
            for item in &batch.items {
                let scores = metrics::score(&item.candidate_answer, &item.reference_answer);
                let verdict = match verdicts.get(&item.id).copied().flatten() {
                    Some(v) => v,
                    None => {
                        warn!(id = %item.id, "judge gave no verdict, recording 0");
                        judge_failures += 1;
                        0
                    }
                };
                updates.insert(item.id.clone(), ScoredRecord::new(item, scores, Some(verdict)));
            }

            scored += updates.len();
            store.upsert_and_flush(updates)?;
            batch_count += 1;
            info!(
                batch = batch.index,
                size = batch.len(),
                total = store.len(),
                "batch persisted"
            );
        }

        let skipped = batches.skipped();
        let resumed = batches.resumed();

        let report = aggregate(store.records())?;
        if let Some(path) = &self.options.report_path {
            report.write_to(path)?;
            info!(path = %path.display(), "report written");
        }

        Ok(RunSummary {
            batches: batch_count,
            scored,
            judge_failures,
            skipped,
            resumed,
            report,
        })
    }

    /// Judge a batch, retrying with exponential backoff while every verdict is missing.
    async fn judge_with_retry(&self, batch: &Batch) -> Verdicts {
        let mut attempt = 0;
        loop {
            let verdicts = self.judge_once(batch).await;

            let failed_whole = verdicts.values().all(Option::is_none);
            if !failed_whole || attempt >= self.options.judge_retries {
                return verdicts;
            }

            let backoff = backoff_for(self.options.retry_backoff, attempt);
            attempt += 1;
            warn!(
                batch = batch.index,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "judge failed for the whole batch, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    async fn judge_once(&self, batch: &Batch) -> Verdicts {
        if !self.options.single_item {
            let verdicts = self.judge.judge_batch(&batch.items).await;
            tokio::time::sleep(self.options.request_delay).await;
            return verdicts;
        }

        let mut verdicts = Verdicts::with_capacity(batch.len());
        for item in &batch.items {
            verdicts.insert(item.id.clone(), self.judge.judge_one(item).await);
            tokio::time::sleep(self.options.request_delay).await;
        }
        verdicts
    }
}

/// Wait before retry number `attempt + 1`: `base * 2^attempt`, capped at [`MAX_BACKOFF`].
fn backoff_for(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt))
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

/// Aggregate an existing store without judging anything.
///
/// The report file is only written when aggregation succeeds.
pub fn report_from_store(store_path: &Path, report_path: Option<&Path>) -> Result<AggregateReport> {
    let store = ResultStore::load(store_path)?;
    let report = aggregate(store.records())?;
    if let Some(path) = report_path {
        report.write_to(path)?;
    }
    Ok(report)
}
