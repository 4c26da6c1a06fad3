use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use retort_core::error::{Result, RetortError};
use retort_graph::RunInput;

/// Benchmark corpus convention: everything after this marker describes the
/// required answer shape, not the question itself.
const FORMAT_SEP: &str = "You MUST include";

/// Boilerplate the corpus appends to multiple-choice questions. It only
/// confuses pipelines that answer in free text, so the splitter drops it.
const MCQ_BOILERPLATE: &str =
    "Please answer by responding with the letter of the correct answer.";

/// What a task's answer is checked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expected {
    /// Multiple choice: the correct option letter.
    Mcq { correct: String },
    /// A numeric value within an absolute tolerance.
    Numeric { value: f64, tolerance: f64 },
    /// Free text that must contain this fragment (case-insensitive).
    Text { contains: String },
}

/// One benchmark question, loaded from a JSON file under
/// `<data_dir>/<category>/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFile {
    pub name: String,
    pub category: String,
    pub question: String,
    #[serde(default)]
    pub answer_format: Option<String>,
    pub expected: Expected,
}

impl TaskFile {
    /// The typed seed for a run. An explicit `answer_format` wins; otherwise
    /// the question text is split on the corpus separator.
    pub fn run_input(&self) -> RunInput {
        match &self.answer_format {
            Some(format) => {
                RunInput::question(self.question.trim()).with_answer_format(format.clone())
            }
            None => split_answer_format(&self.question),
        }
    }
}

/// Split corpus prompt text into a typed [`RunInput`].
///
/// The format hint keeps its leading marker so the answerer sees the full
/// instruction. Text without the marker passes through as a plain question.
pub fn split_answer_format(text: &str) -> RunInput {
    match text.split_once(FORMAT_SEP) {
        Some((question, format)) => {
            let question = question.replace(MCQ_BOILERPLATE, "");
            RunInput::question(question.trim())
                .with_answer_format(format!("{FORMAT_SEP}{format}"))
        }
        None => RunInput::question(text.trim()),
    }
}

fn task_err(path: &Path, message: impl Into<String>) -> RetortError {
    RetortError::TaskFile {
        path: path.display().to_string(),
        message: message.into(),
    }
}

/// Load one task file.
pub fn load_task(path: &Path) -> Result<TaskFile> {
    let content = std::fs::read_to_string(path).map_err(|e| task_err(path, e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| task_err(path, e.to_string()))
}

/// Load every task under `data_dir`, one subdirectory per category,
/// optionally filtered to a single category. Tasks come back ordered by
/// category then name so bench runs are reproducible.
pub fn load_tasks(data_dir: &Path, category: Option<&str>) -> Result<Vec<TaskFile>> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    match category {
        Some(cat) => {
            let dir = data_dir.join(cat);
            if !dir.is_dir() {
                return Err(task_err(&dir, "category directory not found"));
            }
            dirs.push(dir);
        }
        None => {
            for entry in std::fs::read_dir(data_dir).map_err(|e| task_err(data_dir, e.to_string()))? {
                let entry = entry.map_err(|e| task_err(data_dir, e.to_string()))?;
                if entry.path().is_dir() {
                    dirs.push(entry.path());
                }
            }
        }
    }
    dirs.sort();

    let mut tasks = Vec::new();
    for dir in dirs {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|e| task_err(&dir, e.to_string()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        for file in files {
            tasks.push(load_task(&file)?);
        }
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitter_separates_question_from_format_hint() {
        let input = split_answer_format(
            "What is the pKa of acetic acid?You MUST include the numeric value in your answer.",
        );
        assert_eq!(input.question, "What is the pKa of acetic acid?");
        assert_eq!(
            input.answer_format.as_deref(),
            Some("You MUST include the numeric value in your answer.")
        );
    }

    #[test]
    fn splitter_drops_mcq_boilerplate() {
        let input = split_answer_format(
            "Which option is aromatic? Please answer by responding with the letter of the \
             correct answer.You MUST include the letter in your answer.",
        );
        assert_eq!(input.question, "Which option is aromatic?");
        assert!(input.answer_format.unwrap().starts_with("You MUST include"));
    }

    #[test]
    fn text_without_marker_passes_through() {
        let input = split_answer_format("  Name the strongest acid.  ");
        assert_eq!(input.question, "Name the strongest acid.");
        assert_eq!(input.answer_format, None);
    }

    #[test]
    fn explicit_answer_format_wins_over_splitting() {
        let task = TaskFile {
            name: "t".to_string(),
            category: "c".to_string(),
            question: "Q? You MUST include nothing.".to_string(),
            answer_format: Some("You MUST include units.".to_string()),
            expected: Expected::Text {
                contains: "x".to_string(),
            },
        };
        let input = task.run_input();
        assert_eq!(input.answer_format.as_deref(), Some("You MUST include units."));
        assert!(input.question.contains("You MUST include nothing."));
    }

    #[test]
    fn loads_tasks_per_category_in_stable_order() {
        let dir = tempfile::tempdir().unwrap();
        for (cat, name) in [("acids", "b_task"), ("acids", "a_task"), ("organic", "z_task")] {
            let cat_dir = dir.path().join(cat);
            std::fs::create_dir_all(&cat_dir).unwrap();
            let task = serde_json::json!({
                "name": name,
                "category": cat,
                "question": "q",
                "expected": { "kind": "mcq", "correct": "A" }
            });
            std::fs::write(cat_dir.join(format!("{name}.json")), task.to_string()).unwrap();
        }

        let all = load_tasks(dir.path(), None).unwrap();
        assert_eq!(
            all.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            ["a_task", "b_task", "z_task"]
        );

        let acids = load_tasks(dir.path(), Some("acids")).unwrap();
        assert_eq!(acids.len(), 2);
        assert!(load_tasks(dir.path(), Some("missing")).is_err());
    }

    #[test]
    fn malformed_json_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_task(&path).unwrap_err();
        assert!(matches!(err, RetortError::TaskFile { .. }));
    }
}
