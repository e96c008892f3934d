// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use logs_pusher::{
    Batch, BatchLimits, CheckpointTracker, Converter, Dispatcher, LogsClient, LogsSender,
    PublishError, PusherConfig, PutLogEventsRequest, PutLogEventsResponse, Range, RateLimiter,
    RawLogEvent, Sender, Target, TargetManager,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type Outcome = Result<PutLogEventsResponse, PublishError>;

/// Remote service double: scripted publish outcomes, call counters and an
/// in-flight guard per stream.
#[derive(Default)]
struct MockService {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Option<PublishError>,
    delay: Duration,
    requests: Mutex<Vec<PutLogEventsRequest>>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: AtomicUsize,
    publish_calls: AtomicUsize,
    init_calls: AtomicUsize,
    retention_calls: AtomicUsize,
}

impl MockService {
    fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn scripted(script: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    fn failing(error: PublishError) -> Arc<Self> {
        Arc::new(Self {
            fallback: Some(error),
            ..Default::default()
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    fn delivered_messages(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .flat_map(|r| r.log_events.iter().map(|e| e.message.clone()))
            .collect()
    }
}

#[async_trait]
impl LogsClient for MockService {
    async fn put_log_events(&self, request: &PutLogEventsRequest) -> Outcome {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        let stream = request.log_stream_name.clone();
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let count = in_flight.entry(stream.clone()).or_default();
            *count += 1;
            self.max_in_flight.fetch_max(*count, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        *self.in_flight.lock().unwrap().entry(stream).or_default() -= 1;

        let scripted = self.script.lock().unwrap().pop_front();
        let outcome = scripted.unwrap_or_else(|| match &self.fallback {
            Some(error) => Err(error.clone()),
            None => Ok(PutLogEventsResponse::default()),
        });
        if outcome.is_ok() {
            self.requests.lock().unwrap().push(request.clone());
        }
        outcome
    }
}

#[async_trait]
impl TargetManager for MockService {
    async fn init_target(&self, _target: &Target) -> Result<(), PublishError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn put_retention_policy(&self, _target: &Target) -> Result<(), PublishError> {
        self.retention_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingTracker {
    ranges: Mutex<Vec<Range>>,
}

impl CheckpointTracker for RecordingTracker {
    fn id(&self) -> String {
        "/var/log/app.log".to_string()
    }

    fn enqueue(&self, range: Range) {
        self.ranges.lock().unwrap().push(range);
    }
}

fn test_config(dir: &TempDir) -> PusherConfig {
    let mut config = PusherConfig {
        flush_interval: Duration::from_secs(3600),
        ..Default::default()
    };
    config.retention.state_dir = dir.path().to_path_buf();
    config
}

fn counting_event(message: &str, calls: &Arc<AtomicUsize>) -> RawLogEvent {
    let calls = Arc::clone(calls);
    RawLogEvent::new(message).with_callback(move || {
        calls.fetch_add(1, Ordering::SeqCst);
    })
}

fn dispatcher(config: PusherConfig, service: &Arc<MockService>) -> Dispatcher {
    Dispatcher::new(config, service.clone(), service.clone())
        .expect("test configuration should be valid")
}

#[tokio::test]
async fn hello_event_is_built_and_acknowledged_once() {
    let target = Target::new("G", "S");
    let calls = Arc::new(AtomicUsize::new(0));

    let mut converter = Converter::from_config(target.clone(), &PusherConfig::default());
    let mut batch = Batch::new(target, BatchLimits::default());
    batch.append(converter.convert(counting_event("hello", &calls)));

    let request = batch.build();
    assert_eq!(request.log_group_name, "G");
    assert_eq!(request.log_stream_name, "S");
    assert_eq!(request.log_events.len(), 1);
    assert_eq!(request.log_events[0].message, "hello");
    assert!(request.log_events[0].timestamp > 0);

    let service = MockService::succeeding();
    let sender = LogsSender::new(
        service.clone(),
        service.clone(),
        Arc::new(RateLimiter::new(10.0, 10)),
        &PusherConfig::default(),
        CancellationToken::new(),
    );
    sender.send(batch).await;

    assert_eq!(service.publish_calls.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dispatcher_delivers_in_order_and_acknowledges() {
    let dir = TempDir::new().unwrap();
    let service = MockService::succeeding();
    let dispatcher = dispatcher(test_config(&dir), &service);
    let target = Target::new("/app/web", "i-123");
    let calls = Arc::new(AtomicUsize::new(0));

    let base = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    for i in 0..20u64 {
        let event = counting_event(&format!("line {i}"), &calls)
            .with_timestamp(base + Duration::from_millis(i));
        dispatcher.add_event(&target, event).await.unwrap();
    }
    dispatcher.flush_all().await;

    assert_eq!(calls.load(Ordering::SeqCst), 20);
    let expected: Vec<String> = (0..20).map(|i| format!("line {i}")).collect();
    assert_eq!(service.delivered_messages(), expected);
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn missing_destination_is_created_then_delivered() {
    let dir = TempDir::new().unwrap();
    let service = MockService::scripted(vec![Err(PublishError::ResourceNotFound(
        "The specified log stream does not exist.".to_string(),
    ))]);
    let dispatcher = dispatcher(test_config(&dir), &service);
    let calls = Arc::new(AtomicUsize::new(0));

    dispatcher
        .add_event(&Target::new("G", "S"), counting_event("hello", &calls))
        .await
        .unwrap();
    dispatcher.flush_all().await;

    assert_eq!(service.init_calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.publish_calls.load(Ordering::SeqCst), 2);
    assert_eq!(service.delivered_messages(), vec!["hello".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    dispatcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transient_failures_exhaust_budget_and_acknowledge_once() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.retry_duration = Duration::from_secs(20);
    let service = MockService::failing(PublishError::ServiceUnavailable("503".to_string()));
    let dispatcher = dispatcher(config, &service);
    let calls = Arc::new(AtomicUsize::new(0));

    for i in 0..3 {
        dispatcher
            .add_event(&Target::new("G", "S"), counting_event(&format!("{i}"), &calls))
            .await
            .unwrap();
    }
    dispatcher.flush_all().await;

    assert!(service.publish_calls.load(Ordering::SeqCst) > 1);
    assert!(service.delivered_messages().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    dispatcher.shutdown().await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn one_publish_in_flight_per_target() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.batch.max_events = 2;
    let service = MockService::slow(Duration::from_millis(50));
    let dispatcher = Arc::new(dispatcher(config, &service));

    let producers: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|stream| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                let target = Target::new("G", stream);
                for i in 0..10 {
                    dispatcher
                        .add_event(&target, RawLogEvent::new(format!("{stream}{i}")))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }
    dispatcher.shutdown().await;

    assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(service.delivered_messages().len(), 20);
}

#[tokio::test]
async fn shutdown_aborts_backoff_and_acknowledges() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.retry_duration = Duration::from_secs(24 * 3600);
    let service = MockService::failing(PublishError::Throttling("Rate exceeded".to_string()));
    let dispatcher = dispatcher(config, &service);
    let calls = Arc::new(AtomicUsize::new(0));

    dispatcher
        .add_event(&Target::new("G", "S"), counting_event("pending", &calls))
        .await
        .unwrap();
    let start = Instant::now();
    dispatcher.shutdown().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.publish_calls.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn checkpoints_advance_after_delivery() {
    let dir = TempDir::new().unwrap();
    let service = MockService::succeeding();
    let dispatcher = dispatcher(test_config(&dir), &service);
    let tracker = Arc::new(RecordingTracker::default());
    let target = Target::new("G", "S");

    for (start, end) in [(0, 100), (100, 180), (180, 300)] {
        let event = RawLogEvent::new("line")
            .with_timestamp(SystemTime::now())
            .with_checkpoint(Range::new(start, end), tracker.clone());
        dispatcher.add_event(&target, event).await.unwrap();
    }
    assert!(tracker.ranges.lock().unwrap().is_empty());

    dispatcher.flush_all().await;
    assert_eq!(*tracker.ranges.lock().unwrap(), vec![Range::new(0, 300)]);
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn retention_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let target = Target::new("/app/web", "i-1").with_retention(14);

    let service = MockService::succeeding();
    let first = dispatcher(test_config(&dir), &service);
    first.add_event(&target, RawLogEvent::new("a")).await.unwrap();
    first.shutdown().await;
    assert_eq!(service.retention_calls.load(Ordering::SeqCst), 1);

    let restarted = MockService::succeeding();
    let second = dispatcher(test_config(&dir), &restarted);
    second.retention_cache().loaded().await;
    assert!(second.retention_cache().is_recently_set("/app/web"));
    second
        .add_event(&Target::new("/app/web", "i-2").with_retention(14), RawLogEvent::new("b"))
        .await
        .unwrap();
    second.shutdown().await;
    assert_eq!(restarted.retention_calls.load(Ordering::SeqCst), 0);
    assert_eq!(restarted.delivered_messages(), vec!["b".to_string()]);
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    let service = MockService::succeeding();
    let config = PusherConfig {
        queue_capacity: 0,
        ..Default::default()
    };
    assert!(Dispatcher::new(config, service.clone(), service).is_err());
}
