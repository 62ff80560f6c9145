use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use chrono::Utc;
use futures_util::FutureExt;
use group_buy_engine::{
    db_types::{NewNotificationTask, NotificationTask, NotificationTaskStatus, NotifyType},
    events::{EventHandler, NotificationMessage},
    notifications::{HttpNotifier, MqNotifier, NotificationTransport, NotifierRouter, RetryPolicy, TransportError},
    DeliveryOutcome,
    InsertTaskResult,
    NotificationApi,
    NotificationTaskManagement,
    SqliteDatabase,
};
use log::*;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

mod support;
use support::{setup, tear_down};

/// A minimal HTTP endpoint. It answers each request with the next queued status (200 once the queue is empty) and
/// remembers the request bodies.
#[derive(Clone, Default)]
struct StubReceiver {
    statuses: Arc<Mutex<VecDeque<u16>>>,
    bodies: Arc<Mutex<Vec<String>>>,
}

impl StubReceiver {
    async fn start(statuses: &[u16]) -> (Self, String) {
        let stub = Self { statuses: Arc::new(Mutex::new(statuses.iter().copied().collect())), ..Default::default() };
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Could not bind stub receiver");
        let url = format!("http://{}/notify", listener.local_addr().unwrap());
        let server = stub.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let server = server.clone();
                tokio::spawn(async move {
                    let body = read_request(&mut socket).await;
                    server.bodies.lock().unwrap().push(body);
                    let status = server.statuses.lock().unwrap().pop_front().unwrap_or(200);
                    let response = format!("HTTP/1.1 {status} Stub\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (stub, url)
    }

    fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return text[header_end + 4..].to_string();
            }
        }
    }
    String::new()
}

/// Counts attempts and fails every one of them.
#[derive(Clone, Default)]
struct BrokenTransport {
    attempts: Arc<AtomicUsize>,
}

impl NotificationTransport for BrokenTransport {
    async fn deliver(&self, _task: &NotificationTask) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Status(503))
    }
}

/// Counts attempts and succeeds slowly, so that concurrent sweeps overlap.
#[derive(Clone, Default)]
struct SlowTransport {
    attempts: Arc<AtomicUsize>,
}

impl NotificationTransport for SlowTransport {
    async fn deliver(&self, _task: &NotificationTask) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}

fn immediate_retries(max_attempts: i64) -> RetryPolicy {
    RetryPolicy { base_delay: Duration::ZERO, max_delay: Duration::ZERO, max_attempts }
}

async fn queue_task(db: &SqliteDatabase, n: usize, notify_type: NotifyType, target: &str, max_retries: i64) -> String {
    let task_id = format!("NOTIFY-TRD{n:04}");
    let task = NewNotificationTask {
        task_id: task_id.clone(),
        trade_order_id: format!("TRD{n:04}").into(),
        order_id: "ORD0001".into(),
        notify_type,
        notify_target: target.into(),
        payload: serde_json::json!({ "taskId": task_id, "tradeOrderId": format!("TRD{n:04}"), "status": "SETTLED" }),
        max_retry_count: max_retries,
    };
    match db.save_task(task).await.expect("Error saving task") {
        InsertTaskResult::Inserted(t) => t.task_id,
        InsertTaskResult::AlreadyExists(t) => panic!("Task {} already exists", t.task_id),
    }
}

#[tokio::test]
async fn http_delivery_succeeds_after_a_retry() {
    let db = setup().await;
    let (stub, url) = StubReceiver::start(&[500]).await;
    let task_id = queue_task(&db, 1, NotifyType::Http, &url, 3).await;
    let transport = HttpNotifier::new(Duration::from_secs(2)).unwrap();
    let api = NotificationApi::new(db.clone(), transport, immediate_retries(3));

    let outcome = api.execute(&task_id).await.unwrap();
    let DeliveryOutcome::Retrying(task) = outcome else { panic!("Expected a retry, got {outcome:?}") };
    assert_eq!(task.retry_count, 1);
    assert_eq!(task.status, NotificationTaskStatus::Pending);
    assert!(task.last_error.as_deref().is_some_and(|e| e.contains("500")));

    let outcome = api.execute(&task_id).await.unwrap();
    let DeliveryOutcome::Delivered(task) = outcome else { panic!("Expected delivery, got {outcome:?}") };
    assert_eq!(task.status, NotificationTaskStatus::Success);
    let bodies = stub.bodies();
    assert_eq!(bodies.len(), 2);
    let body: serde_json::Value = serde_json::from_str(&bodies[1]).unwrap();
    assert_eq!(body["taskId"], task_id.as_str());
    // Delivered tasks are never claimed again
    assert!(matches!(api.execute(&task_id).await.unwrap(), DeliveryOutcome::NotClaimed));
    tear_down(db).await;
}

#[tokio::test]
async fn exhausted_task_fails_and_stays_failed() {
    let db = setup().await;
    let task_id = queue_task(&db, 1, NotifyType::Http, "http://127.0.0.1:1/nowhere", 3).await;
    let transport = BrokenTransport::default();
    let api = NotificationApi::new(db.clone(), transport.clone(), immediate_retries(3));
    for attempt in 1..=2 {
        let outcome = api.execute(&task_id).await.unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Retrying(ref t) if t.retry_count == attempt));
    }
    let outcome = api.execute(&task_id).await.unwrap();
    let DeliveryOutcome::Failed(task) = outcome else { panic!("Expected failure, got {outcome:?}") };
    assert_eq!(task.status, NotificationTaskStatus::Failed);
    assert_eq!(task.retry_count, 3);

    assert!(matches!(api.execute(&task_id).await.unwrap(), DeliveryOutcome::NotClaimed));
    let summary = api.run_sweep(10).await.unwrap();
    assert_eq!(summary.delivered + summary.retrying + summary.failed, 0);
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);

    let requeued = api.retry_failed_task(&task_id).await.unwrap().expect("Task was not re-queued");
    assert_eq!(requeued.status, NotificationTaskStatus::Pending);
    assert_eq!(requeued.retry_count, 0);
    assert!(api.retry_failed_task(&task_id).await.unwrap().is_none());
    tear_down(db).await;
}

#[tokio::test]
async fn backoff_delays_the_next_attempt() {
    let db = setup().await;
    let task_id = queue_task(&db, 1, NotifyType::Http, "http://127.0.0.1:1/nowhere", 3).await;
    let api = NotificationApi::new(db.clone(), BrokenTransport::default(), RetryPolicy::default());
    let before = Utc::now();
    let DeliveryOutcome::Retrying(task) = api.execute(&task_id).await.unwrap() else { panic!("Expected a retry") };
    assert!(task.next_attempt_at >= before + chrono::Duration::seconds(29));
    assert!(db.find_pending_tasks(10).await.unwrap().is_empty());
    assert!(matches!(api.execute(&task_id).await.unwrap(), DeliveryOutcome::NotClaimed));
    tear_down(db).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sweeps_deliver_each_task_once() {
    let db = setup().await;
    for n in 0..10 {
        queue_task(&db, n, NotifyType::Http, "http://127.0.0.1:1/unused", 3).await;
    }
    let transport = SlowTransport::default();
    let sweeps = (0..3).map(|_| {
        let api = NotificationApi::new(db.clone(), transport.clone(), immediate_retries(3)).with_concurrency(4);
        tokio::spawn(async move { api.run_sweep(100).await.unwrap() })
    });
    let summaries = futures_util::future::join_all(sweeps).await;
    let delivered = summaries.into_iter().map(|s| s.unwrap().delivered).sum::<usize>();
    assert_eq!(delivered, 10);
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 10);
    tear_down(db).await;
}

#[tokio::test]
async fn stale_claims_are_recovered() {
    let db = setup().await;
    let task_id = queue_task(&db, 1, NotifyType::Http, "http://127.0.0.1:1/unused", 3).await;
    let claimed = db.claim_task(&task_id).await.unwrap().expect("Task was not claimed");
    assert_eq!(claimed.status, NotificationTaskStatus::Processing);
    assert!(db.claim_task(&task_id).await.unwrap().is_none());

    let api = NotificationApi::new(db.clone(), SlowTransport::default(), immediate_retries(3));
    assert_eq!(api.recover_stale_tasks(Duration::from_secs(300)).await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(api.recover_stale_tasks(Duration::ZERO).await.unwrap(), 1);
    let task = api.fetch_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, NotificationTaskStatus::Pending);
    assert!(matches!(api.execute(&task_id).await.unwrap(), DeliveryOutcome::Delivered(_)));
    tear_down(db).await;
}

#[tokio::test]
async fn pending_tasks_are_paged_oldest_first() {
    let db = setup().await;
    for n in 0..5 {
        queue_task(&db, n, NotifyType::Mq, "group-buy.settled", 3).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let api = NotificationApi::new(db.clone(), SlowTransport::default(), immediate_retries(3));
    let first = api.pending_tasks(0, 2).await.unwrap();
    let second = api.pending_tasks(1, 2).await.unwrap();
    let third = api.pending_tasks(2, 2).await.unwrap();
    let ids = first.iter().chain(&second).chain(&third).map(|t| t.task_id.clone()).collect::<Vec<_>>();
    assert_eq!(ids, (0..5).map(|n| format!("NOTIFY-TRD{n:04}")).collect::<Vec<_>>());
    assert_eq!(api.tasks_for_trade_order(&"TRD0003".into()).await.unwrap().len(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn mq_tasks_are_published_on_the_event_channel() {
    let db = setup().await;
    let task_id = queue_task(&db, 1, NotifyType::Mq, "group-buy.settled", 3).await;
    let received = Arc::new(Mutex::new(Vec::<NotificationMessage>::new()));
    let sink = received.clone();
    let handler = EventHandler::new(
        4,
        Arc::new(move |msg: NotificationMessage| {
            let sink = sink.clone();
            async move {
                info!("🚀️ MQ message for {}", msg.topic);
                sink.lock().unwrap().push(msg);
            }
            .boxed()
        }),
    );
    let mq = MqNotifier::new(vec![handler.subscribe()]);
    let router = NotifierRouter::new(HttpNotifier::new(Duration::from_secs(1)).unwrap(), mq);
    let api = NotificationApi::new(db.clone(), router, immediate_retries(3));
    let worker = tokio::spawn(handler.start_handler());

    assert!(matches!(api.execute(&task_id).await.unwrap(), DeliveryOutcome::Delivered(_)));
    drop(api);
    worker.await.unwrap();
    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].task_id, task_id);
    assert_eq!(received[0].topic, "group-buy.settled");
    drop(received);
    tear_down(db).await;
}

#[tokio::test]
async fn mq_without_subscribers_is_a_failed_attempt() {
    let db = setup().await;
    let task_id = queue_task(&db, 1, NotifyType::Mq, "group-buy.settled", 1).await;
    let api = NotificationApi::new(db.clone(), MqNotifier::default(), immediate_retries(1));
    let outcome = api.execute(&task_id).await.unwrap();
    let DeliveryOutcome::Failed(task) = outcome else { panic!("Expected failure, got {outcome:?}") };
    assert!(task.last_error.is_some());
    tear_down(db).await;
}
