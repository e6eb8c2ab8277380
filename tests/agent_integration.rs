//! End-to-end tests for the monitor agent.
//!
//! Runs poll cycles against a procfs-like directory and delivers events to a
//! real HTTP collector on a random loopback port.

use std::path::Path;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use netmonitor::{
    CallSiteAttributor, CallSiteRegistry, CycleOutcome, HttpReporter, PollingScheduler,
    ProcNetDevSource, QueuedReporter, ReportError, ReportSink, SchedulerConfig, TransportKind,
    UsageSampler, enter,
};
use serde_json::Value;
use tokio::net::TcpListener;

// =============================================================================
// Test Helpers
// =============================================================================

type Received = Arc<Mutex<Vec<Value>>>;

/// Start a collector that records every POSTed body and return its URL.
async fn start_collector(status: StatusCode) -> (String, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));

    async fn add_event(
        State((received, status)): State<(Received, StatusCode)>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        received.lock().unwrap().push(body);
        status
    }

    let router = Router::new()
        .route("/addEvent", post(add_event))
        .with_state((Arc::clone(&received), status));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}/addEvent", addr), received)
}

/// Write a `net/dev` file with one wifi and one cellular interface.
fn write_net_dev(root: &Path, wlan: (u64, u64), rmnet: (u64, u64)) {
    let content = format!(
        "Inter-|   Receive                                                |  Transmit\n \
         face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n    \
         lo: 5000 50 0 0 0 0 0 0 5000 50 0 0 0 0 0 0\n  \
         wlan0: {} 10 0 0 0 0 0 0 {} 10 0 0 0 0 0 0\n \
         rmnet0: {} 10 0 0 0 0 0 0 {} 10 0 0 0 0 0 0\n",
        wlan.0, wlan.1, rmnet.0, rmnet.1
    );
    std::fs::create_dir_all(root.join("net")).unwrap();
    std::fs::write(root.join("net/dev"), content).unwrap();
    std::fs::write(root.join("status"), "Name:\tapp\nUid:\t10123\t10123\t10123\t10123\n").unwrap();
}

/// Keep a thread parked inside a tracked call site until the returned sender drops.
fn park_in_call_site(unit: &'static str, entry: &'static str, line: u32) -> mpsc::Sender<()> {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (ready_tx, ready_rx) = mpsc::channel::<()>();
    std::thread::spawn(move || {
        let _outer = enter("okhttp3.RealCall", "execute", 88);
        let _site = enter(unit, entry, line);
        let _ = ready_tx.send(());
        let _ = release_rx.recv();
    });
    ready_rx.recv().unwrap();
    release_tx
}

fn scheduler(root: &Path, prefix: &str, sink: impl ReportSink) -> PollingScheduler {
    let sampler = UsageSampler::new(
        ProcNetDevSource::with_root(root),
        vec![TransportKind::Wifi, TransportKind::Cellular],
        Duration::from_secs(100),
    )
    .unwrap();
    let attributor = CallSiteAttributor::new(CallSiteRegistry::new(), [prefix]);
    let config = SchedulerConfig::default().with_handoff_timeout(Duration::from_millis(90));
    PollingScheduler::new(sampler, attributor, sink, config)
}

// =============================================================================
// HTTP Reporter Tests
// =============================================================================

#[tokio::test]
async fn test_http_reporter_posts_json_array() {
    let (endpoint, received) = start_collector(StatusCode::OK).await;
    let reporter = HttpReporter::new(&endpoint, Duration::from_secs(5)).unwrap();

    reporter.report(Vec::new()).await.unwrap();

    let bodies = received.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0], Value::Array(Vec::new()));
}

#[tokio::test]
async fn test_http_reporter_rejected_status() {
    let (endpoint, _received) = start_collector(StatusCode::SERVICE_UNAVAILABLE).await;
    let reporter = HttpReporter::new(&endpoint, Duration::from_secs(5)).unwrap();

    let result = reporter.report(Vec::new()).await;
    assert!(matches!(result, Err(ReportError::Status(503))));
}

// =============================================================================
// Poll Cycle Tests
// =============================================================================

#[tokio::test]
async fn test_cycle_reports_tracked_call_site() {
    let (endpoint, received) = start_collector(StatusCode::OK).await;
    let dir = tempfile::tempdir().unwrap();
    write_net_dev(dir.path(), (1_000, 500), (2_000, 0));

    let http = HttpReporter::new(&endpoint, Duration::from_secs(5)).unwrap();
    let queue = Arc::new(QueuedReporter::spawn(http, 8));
    let scheduler = scheduler(dir.path(), "it.report.feed", Arc::clone(&queue));

    let release = park_in_call_site("it.report.feed.FeedLoader", "refresh", 42);

    // Counters are cumulative: the first read only records baselines.
    let first = scheduler.run_cycle().await;
    assert_eq!(first.outcome, CycleOutcome::Empty);

    write_net_dev(dir.path(), (1_400, 600), (2_300, 0));
    let second = scheduler.run_cycle().await;
    assert_eq!(second.outcome, CycleOutcome::Reported { events: 1 });

    drop(release);
    drop(scheduler);
    let queue = Arc::try_unwrap(queue).expect("scheduler released the queue");
    queue.shutdown().await.unwrap();

    let bodies = received.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let events = bodies[0].as_array().unwrap();
    assert_eq!(events.len(), 1);

    let event = &events[0];
    assert_eq!(
        event["fullyQualifiedName"],
        "it.report.feed.FeedLoader.refresh"
    );
    assert_eq!(event["entryPoint"], "refresh");
    // 400 + 100 on wifi, 300 on cellular
    assert_eq!(event["totalBytes"], 800);
    assert!(event["windowStart"].is_i64());
    assert!(event["windowEnd"].as_i64() >= event["windowStart"].as_i64());

    let stack = event["callStackText"].as_str().unwrap();
    assert!(stack.contains("it.report.feed.FeedLoader.refresh:42"));
    assert!(stack.contains("okhttp3.RealCall.execute:88"));
}

#[tokio::test]
async fn test_cycle_without_usage_sends_nothing() {
    let (endpoint, received) = start_collector(StatusCode::OK).await;
    let dir = tempfile::tempdir().unwrap();
    write_net_dev(dir.path(), (1_000, 500), (2_000, 0));

    let http = HttpReporter::new(&endpoint, Duration::from_secs(5)).unwrap();
    let queue = Arc::new(QueuedReporter::spawn(http, 8));
    let scheduler = scheduler(dir.path(), "it.idle.feed", Arc::clone(&queue));

    let release = park_in_call_site("it.idle.feed.FeedLoader", "refresh", 7);

    for _ in 0..3 {
        let report = scheduler.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Empty);
        assert_eq!(report.next_delay, scheduler.config().empty_backoff);
    }

    drop(release);
    drop(scheduler);
    let queue = Arc::try_unwrap(queue).expect("scheduler released the queue");
    queue.shutdown().await.unwrap();

    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cycle_without_tracked_threads_sends_nothing() {
    let (endpoint, received) = start_collector(StatusCode::OK).await;
    let dir = tempfile::tempdir().unwrap();
    write_net_dev(dir.path(), (1_000, 500), (2_000, 0));

    let http = HttpReporter::new(&endpoint, Duration::from_secs(5)).unwrap();
    let queue = Arc::new(QueuedReporter::spawn(http, 8));
    let scheduler = scheduler(dir.path(), "it.untracked", Arc::clone(&queue));

    scheduler.run_cycle().await;
    write_net_dev(dir.path(), (5_000, 500), (2_000, 0));
    let report = scheduler.run_cycle().await;
    assert_eq!(report.outcome, CycleOutcome::NoAttribution);

    drop(scheduler);
    let queue = Arc::try_unwrap(queue).expect("scheduler released the queue");
    queue.shutdown().await.unwrap();

    assert!(received.lock().unwrap().is_empty());
}
