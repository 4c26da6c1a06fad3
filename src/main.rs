use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use retort_agents::Pipeline;
use retort_bench::{BenchOptions, BenchRunner};
use retort_core::config::AppConfig;
use retort_graph::{RunInput, State};
use retort_tools::ToolRegistry;

#[derive(Parser)]
#[command(
    name = "retort",
    version,
    about = "Multi-agent LLM pipelines for chemistry question answering"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "retort.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one question through a pipeline and print the answer
    Ask {
        /// Pipeline: direct, reasoning, ensemble, ensemble_advanced, rag,
        /// rag_reasoning, ensemble_researcher, collaboration, planned
        #[arg(short, long, default_value = "reasoning")]
        pipeline: String,

        /// Required answer shape, passed to the answerer verbatim
        #[arg(long)]
        answer_format: Option<String>,

        /// The question (read from stdin when omitted)
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Run a pipeline over the benchmark corpus
    Bench {
        #[arg(short, long, default_value = "ensemble")]
        pipeline: String,

        /// Only run tasks in this category subdirectory
        #[arg(long)]
        category: Option<String>,

        /// Stop after this many tasks
        #[arg(long)]
        max_tasks: Option<usize>,

        /// Re-run tasks that already have a report
        #[arg(long)]
        force: bool,

        /// Report directory name (defaults to the pipeline name)
        #[arg(long)]
        run_name: Option<String>,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("retort=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if !cli.config.exists() {
        anyhow::bail!(
            "No config file found at {}. See retort.toml.example for reference.",
            cli.config.display()
        );
    }
    let config = AppConfig::load(&cli.config)?;

    let client = retort_llm::create_client(config.model.retry.clone().unwrap_or_default());
    let tools = Arc::new(ToolRegistry::with_chemistry_tools(&config.tools));

    match cli.command {
        Commands::Ask {
            pipeline,
            answer_format,
            question,
        } => {
            let pipeline: Pipeline = pipeline.parse()?;
            let text = if question.is_empty() {
                io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                question.join(" ")
            };
            if text.trim().is_empty() {
                anyhow::bail!("empty question");
            }

            let input = match answer_format {
                Some(format) => RunInput::question(text.trim()).with_answer_format(format),
                None => retort_bench::split_answer_format(&text),
            };

            let graph = pipeline.build(client, tools, &config)?;
            info!(pipeline = pipeline.name(), "running question");
            let outcome = graph
                .run(State::seeded(&input), config.pipeline.step_budget)
                .await?;
            if !outcome.converged() {
                warn!(steps = outcome.steps, "run hit the step budget before answering");
            }
            println!("{}", outcome.final_text());
        }
        Commands::Bench {
            pipeline,
            category,
            max_tasks,
            force,
            run_name,
        } => {
            let pipeline: Pipeline = pipeline.parse()?;
            let runner = BenchRunner::new(client, tools, config);
            let summary = runner
                .run(
                    pipeline,
                    BenchOptions {
                        category,
                        max_tasks,
                        force,
                        run_name,
                    },
                )
                .await?;

            println!("Bench results ({}):", pipeline.name());
            for (category, stats) in &summary.per_category {
                println!(
                    "  {:<24} {:>3}/{:<3} ({:.0}%)",
                    format!("{}:", category),
                    stats.correct,
                    stats.total,
                    stats.fraction_correct * 100.0
                );
            }
            println!(
                "  {:<24} {:>3}/{:<3} ({:.0}%), {} failed",
                "overall:",
                summary.correct,
                summary.total,
                summary.fraction_correct * 100.0,
                summary.failed
            );
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
