use std::fmt::Write;

use comfy_table::Cell;

use crate::outcome::{Outcome, RunSummary};
use crate::repair::RepairState;
use crate::report::TestReport;

use super::styling::{bright, bright_red, bright_yellow, cyan, dim, failure_count};
use super::tables::{create_table, cyan_header, repair_state_cell, status_cell};

/// Prints the run overview, the final test table and the repair table to stdout.
pub fn print_summary(summary: &RunSummary) {
    println!("{}", render_summary(summary));
}

/// Prints the records of a parsed report directory to stdout.
pub fn print_records(report: &TestReport) {
    println!("{}", render_records(report));
}

/// The final line of a run: explicit success or residual failures.
pub fn summary_line(summary: &RunSummary) -> String {
    let published = if summary.pushed {
        "pushed"
    } else {
        "committed locally"
    };
    match summary.outcome {
        Outcome::Clean => format!(
            "✅ Upgrade completed! All {} tests pass. Branch '{}' {published}.",
            summary.final_tests.total, summary.branch
        ),
        Outcome::ResidualFailures => format!(
            "⚠️  Upgrade completed with {} residual test failures. Branch '{}' {published}.",
            summary.final_tests.failing, summary.branch
        ),
    }
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_records(report: &TestReport) -> String {
    let mut output = String::new();

    if !report.tests_ran() {
        let _ = writeln!(
            output,
            "{}",
            bright_red("No test reports found. Did the tests run?")
        );
        return output;
    }

    add_section_header(&mut output, "🧪", "Test Cases");
    let _ = writeln!(
        output,
        "  {} {}  {} {}  {} {}  {} {}\n",
        dim("Total:"),
        bright_yellow(report.total()),
        dim("Passed:"),
        bright_yellow(report.passed_count()),
        dim("Failing:"),
        failure_count(report.failing_count()),
        dim("Skipped:"),
        bright_yellow(report.skipped_count()),
    );

    if report.total() == 0 {
        let _ = writeln!(output, "{}", bright_yellow("No test cases detected."));
        return output;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["Test Unit", "Case", "Status", "Failure"]));
    for record in report.records() {
        let failure = record
            .failure
            .as_deref()
            .and_then(|detail| detail.lines().next())
            .unwrap_or("");
        table.add_row(vec![
            Cell::new(&record.unit),
            Cell::new(&record.case),
            status_cell(record.status),
            Cell::new(failure),
        ]);
    }
    let _ = writeln!(output, "{table}");
    output
}

fn render_summary(summary: &RunSummary) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");
    let stages = summary
        .stages
        .iter()
        .map(|s| s.recipe.as_str())
        .collect::<Vec<_>>()
        .join(" → ");
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {} → {}\n  {} {}\n",
        dim("Repository:"),
        cyan(&summary.repository),
        dim("Branch:"),
        cyan(&summary.branch),
        dim("Recipes:"),
        bright_yellow(stages),
        dim("Failing tests:"),
        bright_yellow(summary.initial_tests.failing),
        failure_count(summary.final_tests.failing),
        dim("Run time:"),
        dim(format!(
            "{}s",
            (summary.finished_at - summary.started_at).num_seconds()
        )),
    );

    if !summary.repairs.is_empty() {
        add_section_header(&mut output, "🔧", "Repairs");
        let mut table = create_table();
        table.set_header(cyan_header(&["Test", "Result", "Attempts", "Note"]));
        for repair in &summary.repairs {
            let note = match &repair.state {
                RepairState::Skipped { reason } => reason.clone(),
                _ => repair
                    .file
                    .as_ref()
                    .map(|f| f.display().to_string())
                    .unwrap_or_default(),
            };
            table.add_row(vec![
                Cell::new(&repair.test),
                repair_state_cell(&repair.state),
                Cell::new(repair.state.attempts()),
                Cell::new(note),
            ]);
        }
        let _ = writeln!(output, "{table}\n");
    }

    let remaining = summary.remaining_failures();
    if !remaining.is_empty() {
        add_section_header(&mut output, "❌", "Residual Failures");
        for name in remaining {
            let _ = writeln!(output, "  • {name}");
        }
        output.push('\n');
    }

    let _ = writeln!(output, "{}", summary_line(summary));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::TestCounts;
    use crate::repair::RepairOutcome;
    use crate::report::{TestRecord, TestStatus};
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(case: &str, status: TestStatus) -> TestRecord {
        TestRecord {
            unit: "com.acme.CartTest".to_string(),
            case: case.to_string(),
            status,
            failure: status
                .is_failing()
                .then(|| "expected: <1> but was: <2>\n\tat CartTest".to_string()),
        }
    }

    fn summary(outcome: Outcome, records: Vec<TestRecord>) -> RunSummary {
        let report = TestReport::from_records(records.clone());
        RunSummary {
            repository: "https://github.com/acme/shop.git".to_string(),
            branch: "refactor/upgrade-20261015-093005-000".to_string(),
            workspace: PathBuf::from("/tmp/ws"),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            stages: vec![],
            initial_tests: TestCounts {
                total: 2,
                failing: 1,
                skipped: 0,
            },
            final_tests: TestCounts::from(&report),
            repairs: vec![RepairOutcome {
                test: "com.acme.CartTest.addsItem".to_string(),
                file: Some(PathBuf::from("src/test/java/com/acme/CartTest.java")),
                state: RepairState::Exhausted { attempts: 3 },
            }],
            records,
            outcome,
            pushed: true,
        }
    }

    #[test]
    fn test_render_records_missing_report() {
        let output = render_records(&TestReport::missing());
        assert!(output.contains("Did the tests run?"));
    }

    #[test]
    fn test_render_records_lists_failures() {
        let report = TestReport::from_records(vec![
            record("addsItem", TestStatus::Failed),
            record("removesItem", TestStatus::Passed),
        ]);
        let output = render_records(&report);
        assert!(output.contains("com.acme.CartTest"));
        assert!(output.contains("addsItem"));
        assert!(output.contains("expected: <1> but was: <2>"));
        assert!(!output.contains("at CartTest"));
    }

    #[test]
    fn test_summary_line_for_each_outcome() {
        let clean = summary(Outcome::Clean, vec![record("addsItem", TestStatus::Passed)]);
        assert!(summary_line(&clean).contains("All 1 tests pass"));

        let residual = summary(
            Outcome::ResidualFailures,
            vec![record("addsItem", TestStatus::Failed)],
        );
        let line = summary_line(&residual);
        assert!(line.contains("1 residual test failures"));
        assert!(line.contains("refactor/upgrade-20261015-093005-000"));
    }

    #[test]
    fn test_render_summary_lists_repairs_and_residuals() {
        let residual = summary(
            Outcome::ResidualFailures,
            vec![record("addsItem", TestStatus::Failed)],
        );
        let output = render_summary(&residual);
        assert!(output.contains("Repairs"));
        assert!(output.contains("unresolved"));
        assert!(output.contains("Residual Failures"));
        assert!(output.contains("com.acme.CartTest.addsItem"));
    }
}
