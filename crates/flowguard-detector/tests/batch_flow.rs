//! End-to-end batch runs against a temporary state directory

mod common;

use common::*;
use flowguard_core::{CategoryStatus, Error, Label, Severity};
use flowguard_detector::EndOfDataset;
use flowguard_telemetry::{BatchState, EventQuery, EventReader, LedgerPaths, LedgerStatus};
use std::sync::Arc;
use tempfile::TempDir;

fn reader(dir: &TempDir) -> EventReader {
    let paths = LedgerPaths::in_dir(dir.path());
    EventReader::new(paths.event_log, paths.summary_log)
}

#[tokio::test]
async fn test_ten_record_batch_with_three_attacks() {
    let dir = TempDir::new().unwrap();
    let mut runner = runner(
        dir.path(),
        artifacts(),
        dataset_from_rows(&ten_record_rows()),
        10,
        EndOfDataset::Fail,
    );

    let report = runner.run_batch().await.unwrap();

    assert_eq!(report.before, BatchState::new(0, 0));
    assert_eq!(report.after, BatchState::new(10, 10));
    assert_eq!(report.summary.total, 10);
    assert_eq!(report.summary.attacks, 3);
    assert_eq!(report.summary.normal, 7);

    let attacks: Vec<_> = report
        .events
        .iter()
        .filter(|e| e.result.is_attack())
        .collect();
    assert_eq!(attacks.len(), 3);

    let risks: Vec<f64> = attacks.iter().map(|e| e.result.risk_score).collect();
    assert_eq!(risks, vec![35.0, 65.0, 92.0]);

    let severities: Vec<Severity> = attacks.iter().map(|e| e.result.severity).collect();
    assert_eq!(
        severities,
        vec![Severity::Medium, Severity::High, Severity::Critical]
    );

    let types: Vec<&str> = attacks.iter().map(|e| e.result.attack_type.as_str()).collect();
    assert_eq!(types, vec!["DoS", "Exploits", "Exploits"]);

    let ids: Vec<u64> = report.events.iter().map(|e| e.event_id).collect();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>());

    let logged = reader(&dir).query(&EventQuery::new()).unwrap();
    assert_eq!(logged.len(), 10);
    assert_eq!(logged[8].event_id, 9);
    assert_eq!(logged[8].label, Label::Attack);
    assert_eq!(logged[8].risk_score, 92.0);
    assert_eq!(logged[8].severity, Severity::Critical);

    let summaries = reader(&dir).summaries().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].total, 10);
    assert_eq!(summaries[0].attacks, 3);

    let snapshot = runner.metrics().snapshot();
    assert_eq!(snapshot.records, 10);
    assert_eq!(snapshot.attacks, 3);
    assert_eq!(snapshot.batches, 1);
}

#[tokio::test]
async fn test_normal_records_report_normal_category() {
    let dir = TempDir::new().unwrap();
    let category = Arc::new(MockCategory::new());
    let artifacts = artifacts_with(Arc::new(MockBinary::new()), Some(category.clone()));
    let mut runner = runner(
        dir.path(),
        artifacts,
        dataset_from_rows(&normal_rows(5)),
        5,
        EndOfDataset::Fail,
    );

    let report = runner.run_batch().await.unwrap();

    for event in &report.events {
        assert_eq!(event.result.label, Label::Normal);
        assert_eq!(event.result.attack_type, "Normal");
        assert_eq!(event.result.category_status, CategoryStatus::Skipped);
    }
    assert_eq!(category.call_count(), 0);
    assert_eq!(report.summary.mean_attack_risk, None);
}

#[tokio::test]
async fn test_cursor_advances_monotonically() {
    let dir = TempDir::new().unwrap();
    let mut runner = runner(
        dir.path(),
        artifacts(),
        dataset_from_rows(&normal_rows(40)),
        10,
        EndOfDataset::Fail,
    );

    let (reports, error) = runner.run(3).await;
    assert!(error.is_none());
    assert_eq!(reports.len(), 3);

    for (k, report) in reports.iter().enumerate() {
        let k = k as u64;
        assert_eq!(report.before, BatchState::new(10 * k, 10 * k));
        assert_eq!(report.after, BatchState::new(10 * (k + 1), 10 * (k + 1)));
    }

    let ids: Vec<u64> = reader(&dir)
        .query(&EventQuery::new())
        .unwrap()
        .iter()
        .map(|e| e.event_id)
        .collect();
    assert_eq!(ids, (1..=30).collect::<Vec<_>>());
    assert_eq!(reader(&dir).summaries().unwrap().len(), 3);
}

#[tokio::test]
async fn test_cursor_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let dataset = dataset_from_rows(&normal_rows(30));

    {
        let mut first = runner(dir.path(), artifacts(), dataset.clone(), 10, EndOfDataset::Fail);
        first.run_batch().await.unwrap();
    }

    let mut second = runner(dir.path(), artifacts(), dataset, 10, EndOfDataset::Fail);
    assert_eq!(second.state(), BatchState::new(10, 10));

    let report = second.run_batch().await.unwrap();
    assert_eq!(report.window.start, 10);
    assert_eq!(report.events[0].event_id, 11);
}

#[tokio::test]
async fn test_failed_record_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut rows = normal_rows(10);
    rows[6] = (0.5, 9, "tcp");

    let mut runner = runner(
        dir.path(),
        artifacts(),
        dataset_from_rows(&rows),
        10,
        EndOfDataset::Fail,
    );

    let err = runner.run_batch().await.unwrap_err();
    assert!(matches!(err, Error::Classifier(_)));
    assert_eq!(runner.state(), BatchState::new(0, 0));

    assert!(reader(&dir).query(&EventQuery::new()).unwrap().is_empty());
    assert!(reader(&dir).summaries().unwrap().is_empty());

    let status = LedgerStatus::read(&LedgerPaths::in_dir(dir.path())).unwrap();
    assert!(!status.pending_journal);
    assert_eq!(runner.metrics().snapshot().records, 0);
}

#[tokio::test]
async fn test_dataset_missing_feature_column_is_rejected() {
    let dir = TempDir::new().unwrap();
    let dataset = Arc::new(
        flowguard_detector::Dataset::from_reader("prob,proto\n0.2,tcp\n".as_bytes()).unwrap(),
    );
    let mut runner = runner(dir.path(), artifacts(), dataset, 10, EndOfDataset::Fail);

    let err = runner.run_batch().await.unwrap_err();
    assert!(matches!(err, Error::Schema(ref m) if m.contains("flag")));
    assert_eq!(runner.state(), BatchState::new(0, 0));
    assert!(reader(&dir).query(&EventQuery::new()).unwrap().is_empty());
}

#[tokio::test]
async fn test_end_of_dataset_fails_after_partial_window() {
    let dir = TempDir::new().unwrap();
    let mut runner = runner(
        dir.path(),
        artifacts(),
        dataset_from_rows(&normal_rows(25)),
        10,
        EndOfDataset::Fail,
    );

    let (reports, error) = runner.run(4).await;
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[2].window.len, 5);
    assert_eq!(reports[2].after, BatchState::new(25, 25));

    match error {
        Some(Error::EndOfDataset { chunk_start, len }) => {
            assert_eq!(chunk_start, 25);
            assert_eq!(len, 25);
        }
        other => panic!("expected EndOfDataset, got {:?}", other),
    }
    assert_eq!(runner.state(), BatchState::new(25, 25));
    assert_eq!(reader(&dir).summaries().unwrap().len(), 3);
}

#[tokio::test]
async fn test_end_of_dataset_wraps() {
    let dir = TempDir::new().unwrap();
    let mut runner = runner(
        dir.path(),
        artifacts(),
        dataset_from_rows(&normal_rows(15)),
        10,
        EndOfDataset::Wrap,
    );

    let (reports, error) = runner.run(3).await;
    assert!(error.is_none());

    assert!(!reports[1].window.wrapped);
    assert_eq!(reports[1].after, BatchState::new(15, 15));

    let wrapped = &reports[2];
    assert!(wrapped.window.wrapped);
    assert_eq!(wrapped.window.start, 0);
    assert_eq!(wrapped.after, BatchState::new(10, 25));
    assert_eq!(wrapped.events[0].event_id, 16);
    assert_eq!(wrapped.events[0].offset, 0);
}

#[tokio::test]
async fn test_empty_dataset_is_end_of_dataset() {
    let dir = TempDir::new().unwrap();
    let mut runner = runner(
        dir.path(),
        artifacts(),
        dataset_from_rows(&[]),
        10,
        EndOfDataset::Wrap,
    );

    let err = runner.run_batch().await.unwrap_err();
    assert!(matches!(err, Error::EndOfDataset { len: 0, .. }));
}

#[tokio::test]
async fn test_slow_category_model_degrades_to_unknown() {
    let dir = TempDir::new().unwrap();
    let category = MockCategory::new().with_latency(STAGE_TIMEOUT * 5);
    let artifacts = artifacts_with(Arc::new(MockBinary::new()), Some(Arc::new(category)));
    let mut runner = runner(
        dir.path(),
        artifacts,
        dataset_from_rows(&[(0.05, 0, "tcp"), (0.92, 1, "udp")]),
        2,
        EndOfDataset::Fail,
    );

    let report = runner.run_batch().await.unwrap();
    let attack = &report.events[1].result;

    assert_eq!(attack.label, Label::Attack);
    assert_eq!(attack.risk_score, 92.0);
    assert_eq!(attack.attack_type, "Unknown");
    assert_eq!(attack.category_status, CategoryStatus::TimedOut);
    assert_eq!(report.after, BatchState::new(2, 2));
    assert_eq!(runner.metrics().snapshot().degraded, 1);
}

#[tokio::test]
async fn test_missing_category_model_reports_unknown() {
    let dir = TempDir::new().unwrap();
    let artifacts = artifacts_with(Arc::new(MockBinary::new()), None);
    let mut runner = runner(
        dir.path(),
        artifacts,
        dataset_from_rows(&[(0.70, 1, "tcp")]),
        1,
        EndOfDataset::Fail,
    );

    let report = runner.run_batch().await.unwrap();
    let result = &report.events[0].result;
    assert_eq!(result.attack_type, "Unknown");
    assert_eq!(result.category_status, CategoryStatus::Unavailable);
    assert_eq!(result.severity, Severity::High);
}

#[tokio::test]
async fn test_second_runner_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let dataset = dataset_from_rows(&normal_rows(10));
    let _first = runner(dir.path(), artifacts(), dataset, 10, EndOfDataset::Fail);

    let err = flowguard_telemetry::BatchLedger::open(LedgerPaths::in_dir(dir.path()))
        .err()
        .unwrap();
    assert!(matches!(err, Error::CursorLocked(_)));
}

#[tokio::test]
async fn test_event_query_filters_committed_events() {
    let dir = TempDir::new().unwrap();
    let mut runner = runner(
        dir.path(),
        artifacts(),
        dataset_from_rows(&ten_record_rows()),
        10,
        EndOfDataset::Fail,
    );
    runner.run_batch().await.unwrap();

    let reader = reader(&dir);
    let high = reader
        .query(&EventQuery::new().min_severity(Severity::High))
        .unwrap();
    assert_eq!(high.len(), 2);

    let exploits = reader
        .query(&EventQuery::new().attack_type("Exploits").limit(1))
        .unwrap();
    assert_eq!(exploits.len(), 1);
    assert_eq!(exploits[0].event_id, 9);

    assert_eq!(
        reader.count(&EventQuery::new().label(Label::Normal)).unwrap(),
        7
    );
}
