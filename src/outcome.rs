use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::TransformationStage;
use crate::repair::RepairOutcome;
use crate::report::{TestRecord, TestReport};

/// Terminal result of a run that reached Finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Clean,
    ResidualFailures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TestCounts {
    pub total: usize,
    pub failing: usize,
    pub skipped: usize,
}

impl From<&TestReport> for TestCounts {
    fn from(report: &TestReport) -> Self {
        Self {
            total: report.total(),
            failing: report.failing_count(),
            skipped: report.skipped_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedStage {
    pub name: String,
    pub recipe: String,
    pub toolchain: String,
}

impl From<&TransformationStage> for AppliedStage {
    fn from(stage: &TransformationStage) -> Self {
        Self {
            name: stage.name.clone(),
            recipe: stage.recipe.clone(),
            toolchain: stage.toolchain.name.clone(),
        }
    }
}

/// Everything a finished run reports, as printed and as written to `--output`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub repository: String,
    pub branch: String,
    pub workspace: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<AppliedStage>,
    pub initial_tests: TestCounts,
    pub final_tests: TestCounts,
    pub repairs: Vec<RepairOutcome>,
    pub records: Vec<TestRecord>,
    pub outcome: Outcome,
    pub pushed: bool,
}

impl RunSummary {
    /// `Unit.case` of every case still failing at the end of the run.
    pub fn remaining_failures(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.is_failing())
            .map(TestRecord::qualified_name)
            .collect()
    }
}
