use std::sync::Arc;
use std::time::{Duration, SystemTime};

use spikr_http::{OutcomeStatus, RequestOutcome, RequestSpec};
use spikr_metrics::MetricsCollector;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_records_are_all_counted() {
    let collector = Arc::new(MetricsCollector::default());
    let spec = RequestSpec::get("http://h/lb/courses");

    let mut tasks = Vec::new();
    for task_id in 0..8u64 {
        let collector = collector.clone();
        let spec = spec.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..1_000u64 {
                let status = if (task_id + i) % 10 == 0 { 500 } else { 200 };
                let outcome = RequestOutcome::new(
                    &spec,
                    OutcomeStatus::Http(status),
                    SystemTime::now(),
                    Duration::from_micros(100 + i),
                );
                collector.record(&outcome);
                if i % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    // Snapshots taken mid-flight must always be internally consistent.
    for _ in 0..20 {
        let s = collector.snapshot(Duration::from_secs(1));
        assert_eq!(s.requests, s.latency.count);
        assert_eq!(s.requests, s.status.s2xx + s.status.s5xx);
        assert_eq!(s.errors, s.status.s5xx);
        tokio::task::yield_now().await;
    }

    for t in tasks {
        t.await.unwrap_or_else(|e| panic!("task failed: {e}"));
    }

    let s = collector.snapshot(Duration::from_secs(1));
    assert_eq!(s.requests, 8_000);
    assert_eq!(s.errors, 800);
    assert_eq!(s.error_rate(), Some(0.1));
    assert!(s.latency.exact);
}

#[test]
fn snapshot_is_serializable() {
    let collector = MetricsCollector::default();
    let spec = RequestSpec::get("http://h/lb/courses").with_check("ok", 200);
    collector.record(&RequestOutcome::new(
        &spec,
        OutcomeStatus::Http(200),
        SystemTime::now(),
        Duration::from_millis(3),
    ));

    let json = serde_json::to_value(collector.snapshot(Duration::from_secs(1)))
        .unwrap_or_else(|e| panic!("serialize: {e}"));
    assert_eq!(json["requests"], 1);
    assert_eq!(json["status"]["2xx"], 1);
    assert_eq!(json["checks"][0]["name"], "ok");
}
