use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retort_core::error::Result;
use retort_core::types::RunId;

/// Outcome record for one task, persisted as `reports/<run>/<task>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub task: String,
    pub category: String,
    pub pipeline: String,
    /// Shared by every report written by the same invocation, so reports in
    /// a resumed run directory can be told apart.
    pub run_id: RunId,
    pub answer: String,
    pub correct: bool,
    /// The run aborted or timed out; `correct` is always false then.
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: usize,
    pub converged: bool,
    pub completed_at: DateTime<Utc>,
}

impl Report {
    pub fn scored(
        task: &crate::task::TaskFile,
        pipeline: &str,
        run_id: RunId,
        answer: String,
        correct: bool,
        steps: usize,
        converged: bool,
    ) -> Self {
        Self {
            task: task.name.clone(),
            category: task.category.clone(),
            pipeline: pipeline.to_string(),
            run_id,
            answer,
            correct,
            failed: false,
            error: None,
            steps,
            converged,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(
        task: &crate::task::TaskFile,
        pipeline: &str,
        run_id: RunId,
        error: String,
    ) -> Self {
        Self {
            task: task.name.clone(),
            category: task.category.clone(),
            pipeline: pipeline.to_string(),
            run_id,
            answer: String::new(),
            correct: false,
            failed: true,
            error: Some(error),
            steps: 0,
            converged: false,
            completed_at: Utc::now(),
        }
    }
}

/// One report file per task under a named run directory. A task that already
/// has a report is considered scored; the runner skips it unless forced.
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn open(reports_dir: &Path, run_name: &str) -> Result<Self> {
        let dir = reports_dir.join(run_name);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, task: &str) -> PathBuf {
        self.dir.join(format!("{task}.json"))
    }

    pub fn contains(&self, task: &str) -> bool {
        self.path_for(task).is_file()
    }

    pub fn write(&self, report: &Report) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(self.path_for(&report.task), json)?;
        Ok(())
    }

    /// All reports in this run, ordered by task name.
    pub fn load_all(&self) -> Result<Vec<Report>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            reports.push(serde_json::from_str(&content)?);
        }
        Ok(reports)
    }
}

/// Aggregate over one run's reports.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total: usize,
    pub correct: usize,
    pub failed: usize,
    pub fraction_correct: f64,
    pub per_category: BTreeMap<String, CategorySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub total: usize,
    pub correct: usize,
    pub fraction_correct: f64,
}

fn fraction(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

impl Summary {
    pub fn from_reports(reports: &[Report]) -> Self {
        let mut per_category: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let mut correct = 0;
        let mut failed = 0;
        for report in reports {
            let entry = per_category.entry(report.category.clone()).or_default();
            entry.0 += 1;
            if report.correct {
                entry.1 += 1;
                correct += 1;
            }
            if report.failed {
                failed += 1;
            }
        }
        Self {
            total: reports.len(),
            correct,
            failed,
            fraction_correct: fraction(correct, reports.len()),
            per_category: per_category
                .into_iter()
                .map(|(cat, (total, correct))| {
                    (
                        cat,
                        CategorySummary {
                            total,
                            correct,
                            fraction_correct: fraction(correct, total),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Expected, TaskFile};

    fn task(name: &str, category: &str) -> TaskFile {
        TaskFile {
            name: name.to_string(),
            category: category.to_string(),
            question: "q".to_string(),
            answer_format: None,
            expected: Expected::Mcq {
                correct: "A".to_string(),
            },
        }
    }

    #[test]
    fn store_round_trips_and_detects_scored_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::open(dir.path(), "ensemble").unwrap();
        assert!(!store.contains("t1"));

        let run_id = RunId::new();
        let report = Report::scored(
            &task("t1", "acids"),
            "ensemble",
            run_id.clone(),
            "A".into(),
            true,
            7,
            true,
        );
        store.write(&report).unwrap();
        assert!(store.contains("t1"));

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].task, "t1");
        assert_eq!(loaded[0].run_id, run_id);
        assert!(loaded[0].correct);
    }

    #[test]
    fn summary_aggregates_overall_and_per_category() {
        let run_id = RunId::new();
        let reports = vec![
            Report::scored(&task("t1", "acids"), "p", run_id.clone(), "A".into(), true, 1, true),
            Report::scored(&task("t2", "acids"), "p", run_id.clone(), "B".into(), false, 1, true),
            Report::scored(&task("t3", "organic"), "p", run_id.clone(), "A".into(), true, 1, true),
            Report::failed(&task("t4", "organic"), "p", run_id, "timed out".into()),
        ];
        let summary = Summary::from_reports(&reports);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.correct, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.fraction_correct, 0.5);
        assert_eq!(summary.per_category["acids"].fraction_correct, 0.5);
        assert_eq!(summary.per_category["organic"].correct, 1);
    }

    #[test]
    fn empty_run_summarizes_to_zero() {
        let summary = Summary::from_reports(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.fraction_correct, 0.0);
    }
}
