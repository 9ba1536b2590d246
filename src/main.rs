//! QA Eval CLI
//!
//! Converts a dialogue dataset, collects model answers and scores them with
//! an LLM judge.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qa_eval::{
    answer::{GenerateOptions, generate_answers},
    config::Config,
    dataset::convert_dataset,
    eval::{LlmJudge, Pipeline, PipelineOptions, load_items, report_from_store},
    llm::LlmClient,
    merge::merge_predictions,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// QA Eval - LLM-as-judge evaluation for conversational question answering
#[derive(Parser)]
#[command(name = "qa-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (JSON or YAML); defaults to the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert the dataset into per-sample prompts and answer keys
    Convert {
        /// Dataset file (overrides `dataset` from the config)
        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },

    /// Ask the model to answer every converted sample
    Answer,

    /// Merge answer keys with model predictions into one scoring input
    Merge,

    /// Score merged answers with lexical metrics and the LLM judge
    Score {
        /// Judge one item per call instead of in batches
        #[arg(long)]
        single: bool,

        /// Items per judge call (overrides `batch_size` from the config)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Also write the aggregate as JSON to this path
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Aggregate an existing result store without judging anything
    Report {
        /// Also write the aggregate as JSON to this path
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Convert { dataset } => cmd_convert(config, dataset),
        Commands::Answer => cmd_answer(config).await,
        Commands::Merge => cmd_merge(config),
        Commands::Score {
            single,
            batch_size,
            report_json,
        } => cmd_score(config, single, batch_size, report_json).await,
        Commands::Report { report_json } => cmd_report(config, report_json),
        Commands::Test => cmd_test(config).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_convert(config: Config, dataset: Option<PathBuf>) -> Result<()> {
    config.validate_output_dir().context("Invalid configuration")?;
    let dataset = dataset
        .or(config.dataset.clone())
        .context("No dataset given. Pass --dataset or set dataset in the config file.")?;

    let summary = convert_dataset(&dataset, &config.output_dir).context("Conversion failed")?;

    println!("Converted {} samples", summary.samples);
    println!("  Questions:  {}", summary.questions);
    println!("  Skipped:    {}", summary.skipped);
    println!("  Output:     {}", config.output_dir.display());
    Ok(())
}

async fn cmd_answer(config: Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    println!("Generating answers with model: {}", config.llm.model);
    let client = LlmClient::new(config.llm.clone()).context("Failed to create LLM client")?;
    let options = GenerateOptions {
        max_retries: config.max_retries,
        retry_delay: Duration::from_secs(config.request_delay_secs),
    };

    let start = Instant::now();
    let summary = generate_answers(&client, &config.output_dir, &options)
        .await
        .context("Answer generation failed")?;

    println!("\nAnswer generation finished in {:.2?}", start.elapsed());
    println!("  Generated:  {}", summary.generated);
    println!("  Existing:   {}", summary.existing);
    if !summary.failed.is_empty() {
        println!("  Failed:     {}", summary.failed.join(", "));
    }
    Ok(())
}

fn cmd_merge(config: Config) -> Result<()> {
    config.validate_output_dir().context("Invalid configuration")?;

    let summary = merge_predictions(&config.output_dir).context("Merge failed")?;

    println!("Merged {} samples into {} entries", summary.samples, summary.entries);
    println!("  With response:  {}", summary.answered);
    for path in &summary.unparsable {
        println!("  Unparsable:     {}", path.display());
    }
    println!("  Output:         {}", summary.output.display());
    Ok(())
}

async fn cmd_score(
    config: Config,
    single: bool,
    batch_size: Option<usize>,
    report_json: Option<PathBuf>,
) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let merged = config.merged_path();
    let items = load_items(&merged)
        .with_context(|| format!("Failed to load items from '{}'", merged.display()))?;

    let mut options = PipelineOptions::from_config(&config);
    options.single_item = single;
    if let Some(size) = batch_size {
        options.batch_size = size;
    }

    println!("Scoring {} items with judge: {}", items.len(), config.llm.model);
    if single {
        println!("  Mode:       one item per call");
    } else {
        println!("  Batch size: {}", options.batch_size.max(1));
    }
    println!();

    let judge = LlmJudge::from_config(config.llm.clone()).context("Failed to create LLM client")?;
    let pipeline = Pipeline::new(judge, options);

    let start = Instant::now();
    let summary = pipeline.run(&items).await.context("Scoring failed")?;

    println!("{}", summary.report.render());
    println!("{}", "─".repeat(40));
    println!("  Batches:         {}", summary.batches);
    println!("  Scored:          {}", summary.scored);
    println!("  Judge failures:  {}", summary.judge_failures);
    println!("  Skipped:         {}", summary.skipped);
    println!("  Already judged:  {}", summary.resumed);
    println!("  Time:            {:.2?}", start.elapsed());
    println!("  Report:          {}", config.report_path().display());

    if let Some(path) = report_json {
        summary
            .report
            .write_json(&path)
            .context("Failed to write JSON report")?;
        println!("  JSON report:     {}", path.display());
    }
    Ok(())
}

fn cmd_report(config: Config, report_json: Option<PathBuf>) -> Result<()> {
    config.validate_output_dir().context("Invalid configuration")?;

    let store = config.store_path();
    if !store.exists() {
        anyhow::bail!(
            "Result store not found at '{}'. Run 'score' command first.",
            store.display()
        );
    }

    let report_path = config.report_path();
    let report = report_from_store(&store, Some(&report_path)).context("Aggregation failed")?;
    println!("{}", report.render());
    println!("Report saved to: {}", report_path.display());

    if let Some(path) = report_json {
        report.write_json(&path).context("Failed to write JSON report")?;
        println!("JSON report saved to: {}", path.display());
    }
    Ok(())
}

async fn cmd_test(config: Config) -> Result<()> {
    println!("Testing LLM connection...\n");

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!("  Azure:     {}", config.llm.is_azure);
    let shown: String = config.llm.api_key.chars().take(8).collect();
    println!("  API Key:   {}...", shown);
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm).context("Failed to create LLM client")?;

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => {
            println!("Connection successful!");
        }
        Err(e) => {
            println!("Connection failed: {}", e);
        }
    }

    Ok(())
}
