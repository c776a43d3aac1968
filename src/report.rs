use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{MigrafixError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Errored,
    Skipped,
}

impl TestStatus {
    pub fn is_failing(self) -> bool {
        matches!(self, Self::Failed | Self::Errored)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "error",
            Self::Skipped => "skipped",
        }
    }
}

/// One executed test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRecord {
    /// Declared name of the owning test unit (fully qualified class name)
    pub unit: String,
    pub case: String,
    pub status: TestStatus,
    /// Failure message and trace excerpt, when the case failed
    pub failure: Option<String>,
}

impl TestRecord {
    pub fn is_failing(&self) -> bool {
        self.status.is_failing()
    }

    /// `Unit.case`, used in logs and commit messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.unit, self.case)
    }
}

/// Parsed results of one test-suite run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    records: Vec<TestRecord>,
    ran: bool,
}

impl TestReport {
    /// Report for a run that produced no report directory.
    pub fn missing() -> Self {
        Self {
            records: Vec::new(),
            ran: false,
        }
    }

    pub fn from_records(mut records: Vec<TestRecord>) -> Self {
        records.sort_by(|a, b| a.unit.cmp(&b.unit).then_with(|| a.case.cmp(&b.case)));
        Self { records, ran: true }
    }

    pub fn tests_ran(&self) -> bool {
        self.ran
    }

    /// All records, sorted by (unit, case).
    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn failing(&self) -> Vec<&TestRecord> {
        self.records.iter().filter(|r| r.is_failing()).collect()
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn failing_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_failing()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == TestStatus::Skipped)
            .count()
    }

    pub fn passed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == TestStatus::Passed)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.ran && self.failing_count() == 0
    }
}

/// File naming convention of the report directory.
#[derive(Debug, Clone)]
pub struct ReportLayout {
    pub prefix: String,
    pub suffix: String,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            prefix: "TEST-".to_string(),
            suffix: ".xml".to_string(),
        }
    }
}

impl ReportLayout {
    fn matches(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&self.prefix) && name.ends_with(&self.suffix))
    }
}

#[derive(Debug, Deserialize)]
struct SuiteXml {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "testcase", default)]
    cases: Vec<CaseXml>,
}

#[derive(Debug, Deserialize)]
struct CaseXml {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@classname", default)]
    class_name: Option<String>,
    #[serde(default)]
    failure: Option<FaultXml>,
    #[serde(default)]
    error: Option<FaultXml>,
    #[serde(default)]
    skipped: Option<FaultXml>,
}

#[derive(Debug, Deserialize)]
struct FaultXml {
    #[serde(rename = "@message", default)]
    message: Option<String>,
    #[serde(rename = "$text", default)]
    text: Option<String>,
}

impl FaultXml {
    fn detail(&self) -> String {
        [self.message.as_deref(), self.text.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parses every report file in `dir`.
///
/// # Errors
///
/// Returns [`MigrafixError::MalformedReport`] for the first report file that
/// is not valid XML of the expected shape, and an IO error if the directory
/// exists but cannot be read.
pub fn parse_reports(dir: &Path, layout: &ReportLayout) -> Result<TestReport> {
    if !dir.is_dir() {
        warn!("No test report directory at {}", dir.display());
        return Ok(TestReport::missing());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    files.retain(|path| layout.matches(path));
    files.sort();

    let mut records = Vec::new();
    for file in &files {
        let parsed = parse_report_file(file, layout)?;
        debug!("{}: {} test cases", file.display(), parsed.len());
        records.extend(parsed);
    }

    let report = TestReport::from_records(records);
    info!(
        "Parsed {} report files: {} test cases, {} failing",
        files.len(),
        report.total(),
        report.failing_count()
    );
    Ok(report)
}

fn parse_report_file(path: &Path, layout: &ReportLayout) -> Result<Vec<TestRecord>> {
    let contents = fs::read_to_string(path)?;
    let suite: SuiteXml =
        quick_xml::de::from_str(&contents).map_err(|source| MigrafixError::MalformedReport {
            path: path.to_path_buf(),
            source,
        })?;

    let fallback_unit = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| {
            name.trim_start_matches(layout.prefix.as_str())
                .trim_end_matches(layout.suffix.as_str())
                .to_string()
        })
        .unwrap_or_default();

    Ok(suite
        .cases
        .into_iter()
        .map(|case| {
            let unit = if suite.name.is_empty() {
                case.class_name
                    .clone()
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| fallback_unit.clone())
            } else {
                suite.name.clone()
            };
            let (status, failure) = classify(&case);
            TestRecord {
                unit,
                case: case.name,
                status,
                failure,
            }
        })
        .collect())
}

fn classify(case: &CaseXml) -> (TestStatus, Option<String>) {
    if let Some(failure) = &case.failure {
        (TestStatus::Failed, Some(failure.detail()))
    } else if let Some(error) = &case.error {
        (TestStatus::Errored, Some(error.detail()))
    } else if case.skipped.is_some() {
        (TestStatus::Skipped, None)
    } else {
        (TestStatus::Passed, None)
    }
}
