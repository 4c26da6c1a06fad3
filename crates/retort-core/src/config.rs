use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetortError};

/// Top-level Retort configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Primary model, used by aggregator/answerer/routing nodes.
    pub model: ModelConfig,
    /// Smaller or higher-temperature model for the generator ensemble.
    /// Falls back to `model` when absent.
    #[serde(default)]
    pub small_model: Option<ModelConfig>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub bench: BenchConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| RetortError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| RetortError::Config(e.to_string()))
    }

    /// The model generator/student nodes should use.
    pub fn small_model(&self) -> &ModelConfig {
        self.small_model.as_ref().unwrap_or(&self.model)
    }
}

/// Connection and sampling parameters for one OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_base_url() -> String {
    "http://localhost:8000/v1".to_string()
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_temperature() -> f32 {
    0.0
}

/// Retry configuration for completion requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    1000
}
fn default_max_backoff() -> u64 {
    30000
}

/// Shape parameters for the pipeline graphs, fixed at graph construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of parallel student branches in the ensemble pipelines.
    #[serde(default = "default_num_generators")]
    pub num_generators: usize,
    /// Generate→reflect rounds before the reasoning pipeline answers.
    #[serde(default = "default_num_generations")]
    pub num_generations: u64,
    /// Hard cap on node executions per run. This is the only general
    /// cycle-termination guarantee, so it is not optional.
    #[serde(default = "default_step_budget")]
    pub step_budget: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_generators: default_num_generators(),
            num_generations: default_num_generations(),
            step_budget: default_step_budget(),
        }
    }
}

fn default_num_generators() -> usize {
    5
}
fn default_num_generations() -> u64 {
    3
}
fn default_step_budget() -> usize {
    50
}

/// Benchmark harness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,
    /// Concurrent whole-graph runs. One run = one question.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Per-run wall-clock timeout; an exceeded run is reported as failed.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            reports_dir: default_reports_dir(),
            max_workers: default_max_workers(),
            task_timeout_secs: default_task_timeout(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}
fn default_reports_dir() -> String {
    "reports".to_string()
}
fn default_max_workers() -> usize {
    20
}
fn default_task_timeout() -> u64 {
    600
}

/// API keys for the tool collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub core_api_key: Option<String>,
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
