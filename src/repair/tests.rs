use std::fs;
use std::path::Path;
use std::time::Duration;

use super::*;
use crate::config::TestsConfig;
use crate::report::TestStatus;
use crate::testing::ScriptedOracle;

const ORDER_TEST: &str = "package com.acme;\nclass OrderServiceTest { /* OrderServiceTest */ }\n";
const ORDER_SUBJECT: &str = "package com.acme;\nclass OrderService {}\n";
const FIXED_ORDER_TEST: &str = "package com.acme;\nclass OrderServiceTest { /* fixed OrderServiceTest */ }\n";

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        delay: Duration::ZERO,
    }
}

fn failing(unit: &str, case: &str) -> TestRecord {
    TestRecord {
        unit: unit.to_string(),
        case: case.to_string(),
        status: TestStatus::Failed,
        failure: Some(format!("{case} failed")),
    }
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn workspace() -> (tempfile::TempDir, SourceLayout) {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("src/test/java/com/acme/OrderServiceTest.java"),
        ORDER_TEST,
    );
    write(
        &dir.path().join("src/main/java/com/acme/OrderService.java"),
        ORDER_SUBJECT,
    );
    let layout = SourceLayout::from_config(dir.path(), &TestsConfig::default());
    (dir, layout)
}

#[tokio::test]
async fn test_first_usable_fix_stops_attempts() {
    let (dir, layout) = workspace();
    let oracle = ScriptedOracle::new().answer("OrderServiceTest", vec![Some(FIXED_ORDER_TEST)]);
    let record = failing("com.acme.OrderServiceTest", "placesOrder");

    let report = RepairLoop::new(&oracle, &layout, policy())
        .repair(&[&record])
        .await
        .unwrap();

    assert_eq!(oracle.seen().len(), 1);
    assert_eq!(report.fixed_count(), 1);
    assert_eq!(report.outcomes[0].state, RepairState::Fixed { attempts: 1 });
    let written =
        fs::read_to_string(dir.path().join("src/test/java/com/acme/OrderServiceTest.java"))
            .unwrap();
    assert_eq!(written, FIXED_ORDER_TEST);
}

#[tokio::test]
async fn test_never_more_than_max_attempts() {
    let (dir, layout) = workspace();
    let oracle = ScriptedOracle::new().answer("OrderServiceTest", vec![None, None, None, None]);
    let record = failing("com.acme.OrderServiceTest", "placesOrder");

    let report = RepairLoop::new(&oracle, &layout, policy())
        .repair(&[&record])
        .await
        .unwrap();

    assert_eq!(oracle.seen().len(), 3);
    assert_eq!(report.outcomes[0].state, RepairState::Exhausted { attempts: 3 });
    assert_eq!(report.unresolved().len(), 1);
    let untouched =
        fs::read_to_string(dir.path().join("src/test/java/com/acme/OrderServiceTest.java"))
            .unwrap();
    assert_eq!(untouched, ORDER_TEST);
}

#[tokio::test]
async fn test_retry_after_unusable_answer() {
    let (_dir, layout) = workspace();
    let oracle =
        ScriptedOracle::new().answer("OrderServiceTest", vec![None, Some(FIXED_ORDER_TEST)]);
    let record = failing("com.acme.OrderServiceTest", "placesOrder");

    let report = RepairLoop::new(&oracle, &layout, policy())
        .repair(&[&record])
        .await
        .unwrap();

    assert_eq!(oracle.seen().len(), 2);
    assert_eq!(report.outcomes[0].state, RepairState::Fixed { attempts: 2 });
    assert_eq!(report.outcomes[0].state.attempts(), 2);
}

#[tokio::test]
async fn test_missing_test_file_skips_without_oracle_call() {
    let (_dir, layout) = workspace();
    let oracle = ScriptedOracle::new();
    let record = failing("com.acme.InvoiceTest", "totals");

    let report = RepairLoop::new(&oracle, &layout, policy())
        .repair(&[&record])
        .await
        .unwrap();

    assert!(oracle.seen().is_empty());
    assert!(matches!(
        report.outcomes[0].state,
        RepairState::Skipped { .. }
    ));
    assert_eq!(report.outcomes[0].file, None);
}

#[tokio::test]
async fn test_request_carries_subject_and_failure_detail() {
    let (_dir, layout) = workspace();
    let oracle = ScriptedOracle::new().answer("OrderServiceTest", vec![Some(FIXED_ORDER_TEST)]);
    let record = failing("com.acme.OrderServiceTest", "placesOrder");

    RepairLoop::new(&oracle, &layout, policy())
        .repair(&[&record])
        .await
        .unwrap();

    let seen = &oracle.seen()[0];
    assert_eq!(seen.test_source, ORDER_TEST);
    assert_eq!(seen.subject_source, ORDER_SUBJECT);
    assert_eq!(seen.failure_detail, "placesOrder failed");
}

#[tokio::test]
async fn test_missing_subject_sends_empty_subject() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("src/test/java/com/acme/LegacyTest.java"),
        "class LegacyTest {}",
    );
    let layout = SourceLayout::from_config(dir.path(), &TestsConfig::default());
    let oracle = ScriptedOracle::new().answer("LegacyTest", vec![Some("class LegacyTest { }")]);
    let record = failing("com.acme.LegacyTest", "works");

    let report = RepairLoop::new(&oracle, &layout, policy())
        .repair(&[&record])
        .await
        .unwrap();

    assert_eq!(report.fixed_count(), 1);
    assert_eq!(oracle.seen()[0].subject_source, "");
}

#[tokio::test]
async fn test_cases_in_same_file_build_on_previous_fix() {
    let (_dir, layout) = workspace();
    let oracle = ScriptedOracle::new().answer(
        "OrderServiceTest",
        vec![Some(FIXED_ORDER_TEST), Some(FIXED_ORDER_TEST)],
    );
    let first = failing("com.acme.OrderServiceTest", "placesOrder");
    let second = failing("com.acme.OrderServiceTest", "cancelsOrder");

    let report = RepairLoop::new(&oracle, &layout, policy())
        .repair(&[&first, &second])
        .await
        .unwrap();

    let seen = oracle.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].test_source, ORDER_TEST);
    assert_eq!(seen[1].test_source, FIXED_ORDER_TEST);
    assert_eq!(report.fixed_count(), 2);
}

#[tokio::test]
async fn test_one_unresolved_record_does_not_stop_the_loop() {
    let (dir, layout) = workspace();
    write(
        &dir.path().join("src/test/java/com/acme/PaymentTest.java"),
        "class PaymentTest {}",
    );
    let oracle = ScriptedOracle::new()
        .answer("PaymentTest", vec![None, None, None])
        .answer("OrderServiceTest", vec![Some(FIXED_ORDER_TEST)]);
    let payment = failing("com.acme.PaymentTest", "charges");
    let order = failing("com.acme.OrderServiceTest", "placesOrder");

    let report = RepairLoop::new(&oracle, &layout, policy())
        .repair(&[&payment, &order])
        .await
        .unwrap();

    assert_eq!(oracle.calls_for("PaymentTest"), 3);
    assert_eq!(oracle.calls_for("OrderServiceTest"), 1);
    assert_eq!(report.fixed_count(), 1);
    assert_eq!(report.unresolved()[0].test, "com.acme.PaymentTest.charges");
}
