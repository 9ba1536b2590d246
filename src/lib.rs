//! QA Eval - batched, resumable LLM-as-judge evaluation for conversational QA.
//!
//! A run goes through four stages, each of which can be re-run on its own:
//! 1. `dataset` turns multi-session dialogues into answering prompts
//! 2. `answer` asks the model under test to answer every prompt
//! 3. `merge` pairs the model's answers with the reference answers
//! 4. `eval` scores every item lexically and with an LLM judge, persists the
//!    results after each batch and reports per-category means
//!
//! # Quick Start
//!
//! ```no_run
//! use qa_eval::{
//!     config::Config,
//!     eval::{LlmJudge, Pipeline, PipelineOptions, load_items},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     config.validate()?;
//!
//!     let items = load_items(&config.merged_path())?;
//!     let judge = LlmJudge::from_config(config.llm.clone())?;
//!     let pipeline = Pipeline::new(judge, PipelineOptions::from_config(&config));
//!
//!     let summary = pipeline.run(&items).await?;
//!     println!("{}", summary.report.render());
//!     Ok(())
//! }
//! ```

pub mod answer;
pub mod config;
pub mod dataset;
pub mod error;
pub mod eval;
pub mod llm;
pub mod merge;

// Re-export commonly used types
pub use config::Config;
pub use error::{EvalError, Result};
pub use eval::{AggregateReport, LlmJudge, Pipeline, PipelineOptions, RunSummary};
pub use llm::{ChatBackend, LlmClient};
