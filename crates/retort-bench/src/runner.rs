use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use retort_agents::Pipeline;
use retort_core::config::AppConfig;
use retort_core::error::{Result, RetortError};
use retort_core::traits::CompletionClient;
use retort_core::types::RunId;
use retort_graph::{Graph, State};
use retort_tools::ToolRegistry;

use crate::report::{Report, ReportStore, Summary};
use crate::score::{extract_answer, is_correct};
use crate::task::{load_tasks, TaskFile};

/// What to run and how.
#[derive(Debug, Clone, Default)]
pub struct BenchOptions {
    pub category: Option<String>,
    pub max_tasks: Option<usize>,
    /// Re-run tasks that already have a report.
    pub force: bool,
    /// Report directory name; defaults to the pipeline name, which is what
    /// makes interrupted runs resumable.
    pub run_name: Option<String>,
}

/// Drives one pipeline over the task corpus: a bounded pool of independent
/// whole-graph runs, one report file per task.
pub struct BenchRunner {
    client: Arc<dyn CompletionClient>,
    tools: Arc<ToolRegistry>,
    config: AppConfig,
}

impl BenchRunner {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        tools: Arc<ToolRegistry>,
        config: AppConfig,
    ) -> Self {
        Self {
            client,
            tools,
            config,
        }
    }

    pub async fn run(&self, pipeline: Pipeline, opts: BenchOptions) -> Result<Summary> {
        let mut tasks = load_tasks(
            Path::new(&self.config.bench.data_dir),
            opts.category.as_deref(),
        )?;
        if let Some(max) = opts.max_tasks {
            tasks.truncate(max);
        }

        let run_name = opts
            .run_name
            .clone()
            .unwrap_or_else(|| pipeline.name().to_string());
        let store = Arc::new(ReportStore::open(
            Path::new(&self.config.bench.reports_dir),
            &run_name,
        )?);

        // One compiled graph serves every run; nodes hold no per-run state.
        let graph = Arc::new(pipeline.build(self.client.clone(), self.tools.clone(), &self.config)?);
        let semaphore = Arc::new(Semaphore::new(self.config.bench.max_workers));
        let timeout = Duration::from_secs(self.config.bench.task_timeout_secs);
        let step_budget = self.config.pipeline.step_budget;
        let pipeline_name = pipeline.name();
        let run_id = RunId::new();

        info!(
            pipeline = pipeline_name,
            run_id = %run_id,
            tasks = tasks.len(),
            workers = self.config.bench.max_workers,
            "bench run starting"
        );

        let mut pool: JoinSet<Result<()>> = JoinSet::new();
        let mut skipped = 0usize;
        for task in tasks {
            if !opts.force && store.contains(&task.name) {
                debug!(task = %task.name, "already scored, skipping");
                skipped += 1;
                continue;
            }
            let graph = graph.clone();
            let store = store.clone();
            let semaphore = semaphore.clone();
            let run_id = run_id.clone();
            pool.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| RetortError::Config(format!("worker pool closed: {e}")))?;
                let report =
                    run_task(&graph, &task, pipeline_name, run_id, timeout, step_budget).await;
                store.write(&report)
            });
        }

        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => error!(error = %e, "bench worker panicked"),
            }
        }

        let summary = Summary::from_reports(&store.load_all()?);
        info!(
            pipeline = pipeline_name,
            total = summary.total,
            correct = summary.correct,
            failed = summary.failed,
            skipped,
            fraction_correct = summary.fraction_correct,
            "bench run finished"
        );
        Ok(summary)
    }
}

/// Run one task to a report. Failures and timeouts become failed reports;
/// the harness never retries them.
async fn run_task(
    graph: &Graph,
    task: &TaskFile,
    pipeline: &str,
    run_id: RunId,
    timeout: Duration,
    step_budget: usize,
) -> Report {
    let initial = State::seeded(&task.run_input());
    match tokio::time::timeout(timeout, graph.run(initial, step_budget)).await {
        Ok(Ok(outcome)) => {
            let answer = extract_answer(outcome.final_text()).to_string();
            let correct = is_correct(&task.expected, &answer);
            info!(task = %task.name, correct, steps = outcome.steps, "task scored");
            Report::scored(
                task,
                pipeline,
                run_id,
                answer,
                correct,
                outcome.steps,
                outcome.converged(),
            )
        }
        Ok(Err(failure)) => {
            warn!(task = %task.name, error = %failure, "task run aborted");
            Report::failed(task, pipeline, run_id, failure.to_string())
        }
        Err(_) => {
            let error = RetortError::RunTimeout(timeout.as_secs());
            warn!(task = %task.name, timeout_secs = timeout.as_secs(), "task run timed out");
            Report::failed(task, pipeline, run_id, error.to_string())
        }
    }
}
