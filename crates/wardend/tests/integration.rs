//! Integration tests for wardend
//!
//! These tests verify the end-to-end sanction lifecycle across the store,
//! scheduler, executor and mock collaborators.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use warden_api::SanctionStatus;
use warden_config::{ExecutorConfig, SchedulerConfig};
use warden_core::{
    AuditReporter, ImposeRequest, JobOutcome, ReverseOutcome, ReversalScheduler, SanctionError,
    SanctionExecutor,
};
use warden_host_api::{MockResolver, MockSink};
use warden_store::{JobStore, SanctionStore, SqliteStore};
use warden_util::{DurationError, SubjectId, parse_duration};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap()
}

fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        max_attempts: 5,
        base_backoff: Duration::from_secs(30),
        max_backoff: Duration::from_secs(3600),
        lease: Duration::from_secs(300),
    }
}

fn make_executor(
    store: Arc<SqliteStore>,
    resolver: Arc<MockResolver>,
    sink: Arc<MockSink>,
) -> SanctionExecutor {
    SanctionExecutor::new(
        store.clone(),
        resolver,
        ReversalScheduler::new(store, scheduler_config()),
        AuditReporter::new(sink),
        ExecutorConfig::default(),
    )
}

fn open_store(path: &Path) -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open(path).unwrap())
}

#[test]
fn test_duration_parsing_properties() {
    for bad in ["0m", "-5h", "garbage"] {
        assert!(parse_duration(bad).is_err(), "{:?} should be rejected", bad);
    }
    assert_eq!(parse_duration("0m"), Err(DurationError::NotPositive));
    assert_eq!(parse_duration("3d"), Ok(Duration::from_secs(3 * 24 * 3600)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_imposes_yield_one_sanction() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let resolver = Arc::new(MockResolver::new());
    resolver.add_subject("u1");
    let executor = Arc::new(make_executor(
        store.clone(),
        resolver.clone(),
        Arc::new(MockSink::new()),
    ));

    let mut handles = Vec::new();
    for i in 0..10 {
        let executor = executor.clone();
        handles.push(tokio::spawn(async move {
            let request = ImposeRequest::new("u1", format!("mod-{}", i), "1d", "raid");
            executor.impose(request, t0()).await
        }));
    }

    let mut successes = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(SanctionError::AlreadySanctioned(_)) => duplicates += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(duplicates, 9);

    let history = store.history(&SubjectId::new("u1")).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(store.list_jobs(None).unwrap().len(), 1);
}

#[tokio::test]
async fn test_expiry_fires_exactly_one_reversal() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let resolver = Arc::new(MockResolver::new());
    resolver.add_subject("x");
    let executor = make_executor(store.clone(), resolver.clone(), Arc::new(MockSink::new()));

    executor
        .impose(ImposeRequest::new("x", "mod", "3d", "spam"), t0())
        .await
        .unwrap();

    // Nothing fires before expiry
    assert!(executor.tick(t0() + ChronoDuration::days(2)).await.is_empty());

    let at_expiry = t0() + ChronoDuration::days(3);
    let outcomes = executor.tick(at_expiry).await;
    assert!(matches!(outcomes[..], [JobOutcome::Completed { .. }]));

    // Later ticks find nothing
    assert!(executor.tick(at_expiry + ChronoDuration::hours(1)).await.is_empty());
    assert_eq!(resolver.revert_calls(), 1);

    let history = store.history(&SubjectId::new("x")).unwrap();
    assert_eq!(history[0].status, SanctionStatus::Reversed);
}

#[tokio::test]
async fn test_apply_failure_leaves_subject_unsanctioned() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let resolver = Arc::new(MockResolver::new());
    resolver.add_subject("u1");
    *resolver.fail_apply.lock().unwrap() = true;
    let executor = make_executor(store.clone(), resolver, Arc::new(MockSink::new()));

    let err = executor
        .impose(ImposeRequest::new("u1", "mod", "1d", "spam"), t0())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "external_action_failed");
    assert!(!store.exists(&SubjectId::new("u1")).unwrap());
}

#[tokio::test]
async fn test_reverse_after_transient_failure_reverts_once() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let resolver = Arc::new(MockResolver::new());
    resolver.add_subject("u1");
    let executor = make_executor(store.clone(), resolver.clone(), Arc::new(MockSink::new()));
    let subject = SubjectId::new("u1");

    executor
        .impose(ImposeRequest::new("u1", "mod", "1h", "spam"), t0())
        .await
        .unwrap();

    resolver
        .fail_reverts
        .store(1, std::sync::atomic::Ordering::SeqCst);
    let later = t0() + ChronoDuration::hours(2);
    let err = executor.reverse(&subject, later).await.unwrap_err();
    assert_eq!(err.kind(), "reversal_failed");

    assert!(matches!(
        executor.reverse(&subject, later).await.unwrap(),
        ReverseOutcome::Reversed(_)
    ));
    assert_eq!(
        executor.reverse(&subject, later).await.unwrap(),
        ReverseOutcome::NotSanctioned
    );

    // One failed attempt plus one success; the no-op call never reached the resolver
    assert_eq!(resolver.revert_calls(), 2);
}

#[tokio::test]
async fn test_one_day_sanction_reversed_after_twenty_five_hours() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let resolver = Arc::new(MockResolver::new());
    resolver.add_subject("U1");
    let sink = Arc::new(MockSink::new());
    let executor = make_executor(store.clone(), resolver, sink.clone());
    let subject = SubjectId::new("U1");

    let outcome = executor
        .impose(ImposeRequest::new("U1", "M1", "1d", "test"), t0())
        .await
        .unwrap();
    assert_eq!(outcome.message(), "<@U1> has been temporarily banned for 1 day.");
    assert!(store.exists(&subject).unwrap());

    let outcomes = executor.tick(t0() + ChronoDuration::hours(25)).await;
    assert_eq!(outcomes.len(), 1);

    assert!(!store.exists(&subject).unwrap());
    let history = store.history(&subject).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SanctionStatus::Reversed);
    assert_eq!(history[0].actor, SubjectId::new("M1"));
    assert_eq!(history[0].reason, "test");

    let kinds: Vec<&str> = sink.events().iter().map(|e| e.kind.name()).collect();
    assert_eq!(kinds, vec!["sanction_imposed", "sanction_reversed"]);
}

#[tokio::test]
async fn test_restart_fires_overdue_job() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("warden.db");

    {
        let resolver = Arc::new(MockResolver::new());
        resolver.add_subject("u1");
        let executor = make_executor(open_store(&db_path), resolver, Arc::new(MockSink::new()));
        executor
            .impose(ImposeRequest::new("u1", "mod", "1d", "spam"), t0())
            .await
            .unwrap();
        // Process exits before the sanction expires
    }

    let store = open_store(&db_path);
    let resolver = Arc::new(MockResolver::new());
    let executor = make_executor(store.clone(), resolver.clone(), Arc::new(MockSink::new()));

    let restart_at = t0() + ChronoDuration::days(2);
    let report = executor.recover(restart_at).unwrap();
    assert_eq!(report.overdue, 1);

    let outcomes = executor.tick(restart_at).await;
    assert!(matches!(outcomes[..], [JobOutcome::Completed { .. }]));
    assert_eq!(resolver.revert_calls(), 1);
    assert!(!store.exists(&SubjectId::new("u1")).unwrap());
    assert!(store.list_jobs(None).unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_rearms_job_claimed_by_crashed_process() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("warden.db");

    {
        let store = open_store(&db_path);
        let executor = make_executor(
            store.clone(),
            Arc::new(MockResolver::new()),
            Arc::new(MockSink::new()),
        );
        executor
            .impose(ImposeRequest::new("u1", "mod", "1h", "spam"), t0())
            .await
            .unwrap();

        // Claimed at expiry, then the process died mid-reversal
        let expiry = t0() + ChronoDuration::hours(1);
        let claimed = store
            .claim_due_jobs(expiry, expiry + ChronoDuration::minutes(5))
            .unwrap();
        assert_eq!(claimed.len(), 1);
    }

    let store = open_store(&db_path);
    let resolver = Arc::new(MockResolver::new());
    let executor = make_executor(store.clone(), resolver.clone(), Arc::new(MockSink::new()));

    let restart_at = t0() + ChronoDuration::hours(1) + ChronoDuration::seconds(10);
    let report = executor.recover(restart_at).unwrap();
    assert_eq!(report.released_leases, 1);

    let outcomes = executor.tick(restart_at).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(resolver.revert_calls(), 1);
    assert!(executor.status(&SubjectId::new("u1")).unwrap().is_none());
}

#[tokio::test]
async fn test_unavailable_sink_keeps_sanction() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let resolver = Arc::new(MockResolver::new());
    resolver.add_subject("u1");
    let sink = Arc::new(MockSink::new());
    *sink.unavailable.lock().unwrap() = true;
    let executor = make_executor(store.clone(), resolver, sink);

    let outcome = executor
        .impose(ImposeRequest::new("u1", "mod", "2h", "spam"), t0())
        .await
        .unwrap();

    assert!(outcome.message().ends_with("This hasn't been logged as the audit sink is unavailable."));
    assert!(store.exists(&SubjectId::new("u1")).unwrap());
}
