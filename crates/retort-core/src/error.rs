use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetortError {
    // Completion errors
    #[error("completion request failed: {0}")]
    CompletionRequest(String),

    #[error("completion response parse error: {0}")]
    CompletionParse(String),

    #[error("structured output did not match the expected shape: {0}")]
    StructuredOutput(String),

    // Tool errors
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    // Graph errors
    #[error("graph construction failed: {0}")]
    GraphCompile(String),

    #[error("node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },

    #[error("routing directive names unknown node: {0}")]
    UnknownRoute(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    // Bench errors
    #[error("task file error: {path}: {message}")]
    TaskFile { path: String, message: String },

    #[error("run timed out after {0}s")]
    RunTimeout(u64),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RetortError>;
