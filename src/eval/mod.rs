//! Batched, resumable scoring of model answers.
//!
//! This module provides:
//! - Lexical metrics (BLEU-1 style similarity, token F1)
//! - LLM-as-judge correctness verdicts, batched or per item
//! - Batch construction over pending items
//! - A durable JSON result store with atomic rewrites
//! - Per-category aggregation and the text report
//! - The pipeline tying these together

pub mod aggregate;
pub mod batch;
pub mod judge;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::{AggregateReport, ScoreMeans, aggregate};
pub use batch::{Batch, BatchBuilder, next_batches};
pub use judge::{LlmJudge, Verdicts};
pub use metrics::MetricScores;
pub use pipeline::{Pipeline, PipelineOptions, RunSummary, report_from_store};
pub use record::{Item, ScoredRecord, load_items};
pub use store::{Records, ResultStore, load_records};
