//! Time-series analysis scheduling through the scheduler: enqueue dedup,
//! worker failure handling with backoff, restart after a gap, and alert
//! debounce on saved results.

mod common;

use chrono::Duration;

use common::{harness, Harness, ACCOUNT, NOW};
use vigil::domain::models::{
    scope_keys, AnalysisRecord, AnalysisType, ClaimFilter, ExecutionStatus, LearningEngineError,
    MonitoredConfiguration, RecordKind, TimeSeriesAnalysisResult, VerificationKind,
};
use vigil::domain::ports::{AnalysisRecordRepository, Clock};
use vigil::services::{AlertOutcome, FailureOutcome};

const CONFIG: &str = "cfg-metrics";

fn metrics_config() -> MonitoredConfiguration {
    MonitoredConfiguration::new(CONFIG, ACCOUNT, VerificationKind::TimeSeries, "PROMETHEUS")
}

async fn collected_through(h: &Harness, minute: i64) {
    let record = AnalysisRecord::new(CONFIG, minute, RecordKind::Collected).with_created_at(h.clock.now());
    h.records.save(&record).await.unwrap();
}

fn failure(minute: i64) -> LearningEngineError {
    LearningEngineError {
        analysis_minute: minute,
        error_msg: "engine crashed".to_string(),
    }
}

/// Claim the task and report failure until its retries run out.
async fn exhaust_retries(h: &Harness) {
    let engine = h.service.learning_engine();
    let filter = ClaimFilter::service_guard(vec![AnalysisType::TimeSeries]);
    loop {
        let task = engine.next_task(&filter).await.unwrap().expect("a claimable task");
        let outcome = engine.notify_failure(task.id, &failure(task.analysis_minute)).await.unwrap();
        if outcome == FailureOutcome::Failed {
            break;
        }
    }
}

#[tokio::test]
async fn test_trigger_twice_creates_one_task() {
    let h = harness().await;
    h.add_config(&metrics_config()).await;
    collected_through(&h, NOW - 2).await;

    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 1);
    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 0);

    let tasks = h.tasks_for_scope(&scope_keys::time_series(CONFIG)).await;
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.analysis_minute, NOW - 2);
    assert_eq!(task.analysis_start_minute, Some(NOW - 16 - 120));
    assert_eq!(task.status, ExecutionStatus::Queued);
    assert_eq!(task.backoff_count, 1);
    assert!(task.urls.save.contains(&task.id.to_string()));
}

#[tokio::test]
async fn test_one_task_per_tag() {
    let h = harness().await;
    let mut config = metrics_config();
    config.tags = vec!["web".to_string(), "db".to_string()];
    h.add_config(&config).await;
    collected_through(&h, NOW - 2).await;

    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 2);
    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 0);

    let mut tags: Vec<_> = h
        .all_tasks()
        .await
        .into_iter()
        .filter_map(|t| t.tag)
        .collect();
    tags.sort();
    assert_eq!(tags, vec!["db".to_string(), "web".to_string()]);
}

#[tokio::test]
async fn test_nothing_scheduled_before_a_full_window_is_collected() {
    let h = harness().await;
    h.add_config(&metrics_config()).await;

    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 0);

    // A first analysis continues right after the last analysed minute.
    h.records
        .save(&AnalysisRecord::new(CONFIG, NOW - 10, RecordKind::TimeSeries).with_risk(0.1))
        .await
        .unwrap();
    collected_through(&h, NOW - 2).await;
    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 0);
    assert!(h.all_tasks().await.is_empty());
}

#[tokio::test]
async fn test_failed_window_is_recreated_with_growing_backoff() {
    let h = harness().await;
    h.add_config(&metrics_config()).await;
    collected_through(&h, NOW - 2).await;
    let scope_key = scope_keys::time_series(CONFIG);

    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 1);
    exhaust_retries(&h).await;

    // The failure is forked, then the window waits one five minute step.
    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 0);
    let tasks = h.tasks_for_scope(&scope_key).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].attempt, 1);
    assert_eq!(tasks[0].status, ExecutionStatus::Failed);

    h.clock.advance(Duration::minutes(5));
    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 1);
    let tasks = h.tasks_for_scope(&scope_key).await;
    assert_eq!(tasks.len(), 2);
    let fresh = tasks.iter().find(|t| !t.is_fork()).unwrap();
    assert_eq!(fresh.status, ExecutionStatus::Queued);
    assert_eq!(fresh.backoff_count, 2);

    exhaust_retries(&h).await;

    // Two steps now: still backing off after five minutes.
    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 0);
    h.clock.advance(Duration::minutes(5));
    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 0);
    h.clock.advance(Duration::minutes(5));
    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 1);

    let tasks = h.tasks_for_scope(&scope_key).await;
    assert_eq!(tasks.len(), 3);
    let mut attempts: Vec<u32> = tasks.iter().map(|t| t.attempt).collect();
    attempts.sort_unstable();
    assert_eq!(attempts, vec![0, 1, 2]);
    let fresh = tasks.iter().find(|t| !t.is_fork()).unwrap();
    assert_eq!(fresh.backoff_count, 3);
}

#[tokio::test]
async fn test_requeue_below_retry_ceiling() {
    let h = harness().await;
    h.add_config(&metrics_config()).await;
    collected_through(&h, NOW - 2).await;
    h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap();

    let engine = h.service.learning_engine();
    let filter = ClaimFilter::service_guard(vec![AnalysisType::TimeSeries]);
    let claimed = engine.next_task(&filter).await.unwrap().unwrap();
    assert_eq!(claimed.status, ExecutionStatus::Running);
    assert_eq!(claimed.retry, 1);

    let outcome = engine.notify_failure(claimed.id, &failure(claimed.analysis_minute)).await.unwrap();
    assert_eq!(outcome, FailureOutcome::Requeued);
    let task = engine.task(claimed.id).await.unwrap().unwrap();
    assert_eq!(task.status, ExecutionStatus::Queued);
    assert_eq!(task.retry, 1);
}

#[tokio::test]
async fn test_restart_after_gap_keeps_alignment() {
    let h = harness().await;
    h.add_config(&metrics_config()).await;
    let last_analysis = NOW - 200;
    h.records
        .save(&AnalysisRecord::new(CONFIG, last_analysis, RecordKind::TimeSeries).with_risk(0.1))
        .await
        .unwrap();
    collected_through(&h, NOW - 2).await;

    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 1);

    let task = h.all_tasks().await.remove(0);
    assert_eq!((task.analysis_minute - last_analysis).rem_euclid(15), 0);
    assert!(task.analysis_minute >= NOW - 120);
    assert_eq!(task.analysis_minute, NOW - 110);
}

#[tokio::test]
async fn test_alert_opens_after_consecutive_breaches() {
    let h = harness().await;
    h.add_config(&metrics_config().with_alerts(0.5, 2)).await;
    collected_through(&h, NOW - 2).await;

    h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap();
    let first = h.all_tasks().await.remove(0);
    assert_eq!(first.alert_threshold, Some(0.5));

    let outcome = h
        .service
        .save_time_series_result(
            first.id,
            &TimeSeriesAnalysisResult {
                analysis_minute: first.analysis_minute,
                risk_score: 0.9,
                tag: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, AlertOutcome::Debounced);
    assert!(h.manager.opened_alerts().is_empty());
    let done = h.service.learning_engine().task(first.id).await.unwrap().unwrap();
    assert_eq!(done.status, ExecutionStatus::Success);

    // Next window.
    h.clock.advance(Duration::minutes(15));
    collected_through(&h, NOW + 13).await;
    assert_eq!(h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap(), 1);
    let second = h
        .all_tasks()
        .await
        .into_iter()
        .find(|t| t.analysis_minute == NOW + 13)
        .unwrap();

    let outcome = h
        .service
        .save_time_series_result(
            second.id,
            &TimeSeriesAnalysisResult {
                analysis_minute: second.analysis_minute,
                risk_score: 0.8,
                tag: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, AlertOutcome::Opened);
    let alerts = h.manager.opened_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].config_id, CONFIG);
    assert_eq!(alerts[0].analysis_end_time, (NOW + 13) * 60_000);
}

#[tokio::test]
async fn test_score_below_threshold_closes_alert() {
    let h = harness().await;
    h.add_config(&metrics_config().with_alerts(0.5, 1)).await;
    collected_through(&h, NOW - 2).await;
    h.service.trigger_time_series_analysis(ACCOUNT).await.unwrap();
    let task = h.all_tasks().await.remove(0);

    let outcome = h
        .service
        .save_time_series_result(
            task.id,
            &TimeSeriesAnalysisResult {
                analysis_minute: task.analysis_minute,
                risk_score: 0.2,
                tag: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, AlertOutcome::Closed);
    assert!(h.manager.opened_alerts().is_empty());
}

#[tokio::test]
async fn test_result_for_unknown_task_is_an_error() {
    let h = harness().await;
    let result = TimeSeriesAnalysisResult {
        analysis_minute: NOW,
        risk_score: 0.9,
        tag: None,
    };
    assert!(h
        .service
        .save_time_series_result(uuid::Uuid::new_v4(), &result)
        .await
        .is_err());
}
