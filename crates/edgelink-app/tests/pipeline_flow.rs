//! 텔레메트리 파이프라인 통합 테스트.
//!
//! 등록 → 게시 → 오프라인 버퍼링 → 연결 복구 후 드레인까지
//! 프로토콜 클라이언트, 디스패처, 버퍼, 연결 감시기를 함께 검증한다.

use async_trait::async_trait;
use edgelink_core::config::{BufferConfig, EvictionPolicy};
use edgelink_core::error::CoreError;
use edgelink_core::models::envelope::Envelope;
use edgelink_core::models::metric::Metric;
use edgelink_core::models::resource::PropertyMap;
use edgelink_core::ports::buffer::OfflineBuffer;
use edgelink_core::ports::connectivity::Connectivity;
use edgelink_core::ports::resource_store::ResourceStore;
use edgelink_core::ports::transport::Transport;
use edgelink_network::connectivity::ConnectivityMonitor;
use edgelink_network::dispatcher::Dispatcher;
use edgelink_network::line_sink::LineSink;
use edgelink_network::protocol::{ProtocolClient, ProtocolSettings};
use edgelink_storage::{JsonResourceStore, MemoryBuffer, SqliteBuffer};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// 정상 동작하는 DCC 흉내 — 요청에는 즉시 응답하고 텔레메트리는 기록만 한다
struct FakeDcc {
    sent: Mutex<Vec<String>>,
    /// 이 메시지를 한 번만 전송 실패시킴
    fail_once: Mutex<Option<String>>,
    failures: AtomicUsize,
    replies_tx: mpsc::UnboundedSender<String>,
    replies_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl FakeDcc {
    fn new() -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            sent: Mutex::new(Vec::new()),
            fail_once: Mutex::new(None),
            failures: AtomicUsize::new(0),
            replies_tx,
            replies_rx: tokio::sync::Mutex::new(replies_rx),
        }
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    fn fail_once_for(&self, message: &str) {
        *self.fail_once.lock() = Some(message.to_string());
    }

    fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// 받은 add_stats 봉투의 (메트릭 이름, 값 목록)
    fn stats(&self) -> Vec<(String, Vec<f64>)> {
        self.sent()
            .iter()
            .filter_map(|raw| Envelope::parse(raw).ok())
            .filter(|env| env.message_type == "add_stats")
            .map(|env| {
                let name = env.body["name"].as_str().unwrap_or_default().to_string();
                let values = env.body["stats"]
                    .as_array()
                    .map(|stats| stats.iter().filter_map(|s| s[1].as_f64()).collect())
                    .unwrap_or_default();
                (name, values)
            })
            .collect()
    }

    fn reply_to(&self, request: &Envelope) {
        let body = match request.message_type.as_str() {
            "create_or_find_resource_request" => {
                json!({"uuid": format!("uuid-{}", request.body["name"].as_str().unwrap_or(""))})
            }
            _ => json!({"result": "succeeded"}),
        };
        let reply = json!({
            "transactionID": request.transaction_id,
            "version": request.version,
            "type": request.message_type.replace("_request", "_response"),
            "body": body,
        });
        let _ = self.replies_tx.send(reply.to_string());
    }
}

#[async_trait]
impl Transport for FakeDcc {
    fn name(&self) -> &str {
        "FakeDcc"
    }

    async fn send(&self, message: &str) -> Result<(), CoreError> {
        {
            let mut fail_once = self.fail_once.lock();
            if fail_once.as_deref() == Some(message) {
                *fail_once = None;
                self.failures.fetch_add(1, Ordering::SeqCst);
                return Err(CoreError::Network("연결 재설정 (테스트)".to_string()));
            }
        }
        self.sent.lock().push(message.to_string());
        if let Ok(envelope) = Envelope::parse(message) {
            if envelope.transaction_id.is_some() {
                self.reply_to(&envelope);
            }
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Option<String>, CoreError> {
        Ok(self.replies_rx.lock().await.recv().await)
    }
}

fn fast_buffer_config() -> BufferConfig {
    BufferConfig {
        capacity: 100,
        eviction: EvictionPolicy::DropOldest,
        drain_batch_size: 10,
        drain_interval_ms: 5,
        ..BufferConfig::default()
    }
}

async fn wait_until_empty(buffer: &dyn OfflineBuffer) {
    for _ in 0..500 {
        if buffer.len().await.unwrap() == 0 && !buffer.is_draining() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("버퍼가 비워지지 않음");
}

#[tokio::test]
async fn register_publish_buffer_and_recover() {
    let dir = tempfile::tempdir().unwrap();
    let dcc = Arc::new(FakeDcc::new());
    let monitor = Arc::new(ConnectivityMonitor::new(1));
    let connectivity: Arc<dyn Connectivity> = monitor.clone();

    let buffer = Arc::new(
        MemoryBuffer::new(&fast_buffer_config(), dcc.clone(), Arc::clone(&connectivity)).unwrap(),
    );
    let dispatcher = Dispatcher::new(dcc.clone()).with_resilience(connectivity, buffer.clone());
    let store = Arc::new(JsonResourceStore::new(dir.path().join("resources")).await.unwrap());
    let client = Arc::new(ProtocolClient::new(
        dispatcher,
        store.clone(),
        ProtocolSettings {
            version: 1,
            response_timeout: Duration::from_secs(2),
        },
    ));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    client.connect(shutdown_rx);

    // 등록
    let gateway = client
        .register_resource("gateway", "gw-1", None, PropertyMap::new())
        .await
        .unwrap();
    assert_eq!(gateway.id, "uuid-gw-1");
    assert!(store.load("uuid-gw-1").await.unwrap().is_some());

    let reading = Arc::new(Mutex::new(20.0));
    let source = reading.clone();
    let metric = Metric::new("temp", "C", 1, 1, move || *source.lock()).unwrap();
    let mut handle = client
        .register_metric(metric, Some(&gateway), PropertyMap::new())
        .await
        .unwrap();
    assert_eq!(handle.resource_id(), Some("uuid-temp"));
    assert!(store.load("uuid-temp").await.unwrap().is_some());

    // 온라인 게시
    handle.collect();
    handle.publish().await.unwrap();
    handle.reset();
    assert_eq!(dcc.stats(), vec![("temp".to_string(), vec![20.0])]);

    // 오프라인 → 버퍼링
    monitor.record_failure();
    for value in [21.0, 22.0] {
        *reading.lock() = value;
        handle.collect();
        handle.publish().await.unwrap();
        handle.reset();
    }
    assert_eq!(dcc.stats().len(), 1);
    assert_eq!(buffer.size(), 2);

    // 복구 → 새 페이로드 전송 + 버퍼 드레인
    monitor.record_success();
    *reading.lock() = 23.0;
    handle.collect();
    handle.publish().await.unwrap();
    wait_until_empty(buffer.as_ref()).await;

    let mut values: Vec<f64> = dcc.stats().into_iter().flat_map(|(_, v)| v).collect();
    values.sort_by(f64::total_cmp);
    assert_eq!(values, vec![20.0, 21.0, 22.0, 23.0]);

    // 버퍼에 있던 두 건은 원래 순서대로 드레인
    let buffered: Vec<f64> = dcc
        .stats()
        .into_iter()
        .flat_map(|(_, v)| v)
        .filter(|v| *v == 21.0 || *v == 22.0)
        .collect();
    assert_eq!(buffered, vec![21.0, 22.0]);

    client.shutdown();
    assert!(matches!(
        client.get_properties(&gateway).await,
        Err(CoreError::ClientAborted)
    ));
}

#[tokio::test]
async fn failed_drain_is_retried_on_next_publish() {
    let dcc = Arc::new(FakeDcc::new());
    let monitor = Arc::new(ConnectivityMonitor::new(1));
    let connectivity: Arc<dyn Connectivity> = monitor.clone();
    let buffer = Arc::new(
        MemoryBuffer::new(&fast_buffer_config(), dcc.clone(), Arc::clone(&connectivity)).unwrap(),
    );
    let dispatcher = Dispatcher::new(dcc.clone()).with_resilience(connectivity, buffer.clone());

    monitor.record_failure();
    dispatcher.publish("a".to_string()).await.unwrap();
    assert_eq!(buffer.size(), 1);

    // 복구 직후 드레인은 "a" 전송에 실패하고 다시 보관
    dcc.fail_once_for("a");
    monitor.record_success();
    dispatcher.publish("b".to_string()).await.unwrap();
    for _ in 0..500 {
        if dcc.failures() == 1 && !buffer.is_draining() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(dcc.failures(), 1);
    assert_eq!(buffer.snapshot(), vec!["a"]);
    assert!(!dispatcher.is_buffering());

    // 다음 게시가 남은 메시지를 다시 드레인
    dispatcher.publish("c".to_string()).await.unwrap();
    wait_until_empty(buffer.as_ref()).await;

    let sent = dcc.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.contains(&"a".to_string()));
    assert_eq!(buffer.stats().sent, 1);
}

#[tokio::test]
async fn durable_buffer_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("buffer.db");
    let monitor = Arc::new(ConnectivityMonitor::new(1));
    monitor.record_failure();

    // 1차 실행: 오프라인 동안 라인 텔레메트리를 디스크에 보관
    {
        let dcc = Arc::new(FakeDcc::new());
        let connectivity: Arc<dyn Connectivity> = monitor.clone();
        let buffer = Arc::new(
            SqliteBuffer::open(
                &db_path,
                "LineSink",
                &fast_buffer_config(),
                dcc.clone(),
                Arc::clone(&connectivity),
            )
            .unwrap(),
        );
        let dispatcher = Dispatcher::new(dcc.clone()).with_resilience(connectivity, buffer.clone());
        let sink = Arc::new(LineSink::new(dispatcher));

        let mut handle = sink.register(Metric::new("fan.rpm", "rpm", 1, 1, || 900.0).unwrap(), None);
        for _ in 0..2 {
            handle.collect();
            handle.publish().await.unwrap();
            handle.reset();
        }

        assert!(dcc.sent().is_empty());
        assert_eq!(buffer.len().await.unwrap(), 2);
    }

    // 2차 실행: 연결 복구 후 남은 메시지를 순서대로 드레인
    monitor.record_success();
    let dcc = Arc::new(FakeDcc::new());
    let buffer = SqliteBuffer::open(
        &db_path,
        "LineSink",
        &fast_buffer_config(),
        dcc.clone(),
        monitor.clone(),
    )
    .unwrap();
    assert_eq!(buffer.len().await.unwrap(), 2);

    assert_eq!(buffer.drain().await.unwrap(), 2);
    assert_eq!(buffer.len().await.unwrap(), 0);

    let sent = dcc.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|line| line.starts_with("fan.rpm 900 ")));
}
