//! 네트워크 테스트용 대역 (전송, 연결 상태, 버퍼, 리소스 저장소).

use async_trait::async_trait;
use edgelink_core::error::CoreError;
use edgelink_core::models::envelope::Envelope;
use edgelink_core::models::resource::ResourceRecord;
use edgelink_core::ports::buffer::OfflineBuffer;
use edgelink_core::ports::connectivity::Connectivity;
use edgelink_core::ports::resource_store::ResourceStore;
use edgelink_core::ports::transport::Transport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

type Responder = Box<dyn Fn(&Envelope) -> Vec<String> + Send + Sync>;

/// 보낸 메시지를 기록하고, 요청에 대해 응답을 만들어 수신 큐에 넣는 전송
pub(crate) struct ScriptedTransport {
    sent: Mutex<Vec<String>>,
    fail_sends: AtomicBool,
    inbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    responder: Mutex<Option<Responder>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            responder: Mutex::new(None),
        }
    }

    /// 요청 봉투마다 호출되어 수신할 원시 메시지를 돌려주는 응답기
    pub(crate) fn respond_with(
        &self,
        responder: impl Fn(&Envelope) -> Vec<String> + Send + Sync + 'static,
    ) {
        *self.responder.lock() = Some(Box::new(responder));
    }

    /// 수신 큐에 원시 메시지 주입
    pub(crate) fn push_inbound(&self, raw: impl Into<String>) {
        let _ = self.inbound_tx.send(raw.into());
    }

    pub(crate) fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// 보낸 메시지를 봉투로 파싱 (파싱 불가한 메시지는 건너뜀)
    pub(crate) fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent()
            .iter()
            .filter_map(|raw| Envelope::parse(raw).ok())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "ScriptedTransport"
    }

    async fn send(&self, message: &str) -> Result<(), CoreError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(CoreError::Network("전송 실패 (테스트)".to_string()));
        }
        self.sent.lock().push(message.to_string());

        let replies = match (Envelope::parse(message), self.responder.lock().as_ref()) {
            (Ok(envelope), Some(responder)) => responder(&envelope),
            _ => Vec::new(),
        };
        for reply in replies {
            let _ = self.inbound_tx.send(reply);
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Option<String>, CoreError> {
        Ok(self.inbound_rx.lock().await.recv().await)
    }
}

/// 테스트에서 직접 켜고 끄는 연결 상태
pub(crate) struct ToggleConnectivity {
    reachable: AtomicBool,
}

impl ToggleConnectivity {
    pub(crate) fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub(crate) fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

impl Connectivity for ToggleConnectivity {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// 추가된 메시지와 드레인 시작 횟수를 기록하는 버퍼
///
/// 드레인을 시작하면 즉시 비워진 것으로 친다. `stall_drains(true)`이면
/// 드레인이 실패한 것처럼 남은 메시지 수를 유지한다.
#[derive(Default)]
pub(crate) struct RecordingBuffer {
    added: Mutex<Vec<String>>,
    pending: AtomicUsize,
    drains_started: AtomicUsize,
    stall: AtomicBool,
}

impl RecordingBuffer {
    pub(crate) fn added(&self) -> Vec<String> {
        self.added.lock().clone()
    }

    pub(crate) fn drains_started(&self) -> usize {
        self.drains_started.load(Ordering::SeqCst)
    }

    pub(crate) fn stall_drains(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }
}

#[async_trait]
impl OfflineBuffer for RecordingBuffer {
    async fn add(&self, message: String) -> Result<(), CoreError> {
        self.added.lock().push(message);
        self.pending.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn drain(&self) -> Result<usize, CoreError> {
        Ok(0)
    }

    fn start_drain(self: Arc<Self>) {
        self.drains_started.fetch_add(1, Ordering::SeqCst);
        if !self.stall.load(Ordering::SeqCst) {
            self.pending.store(0, Ordering::SeqCst);
        }
    }

    fn is_draining(&self) -> bool {
        false
    }

    async fn len(&self) -> Result<usize, CoreError> {
        Ok(self.pending.load(Ordering::SeqCst))
    }
}

/// 메모리 리소스 저장소 (파일 저장소와 같은 병합 규칙)
#[derive(Default)]
pub(crate) struct MemoryResourceStore {
    records: Mutex<std::collections::HashMap<String, ResourceRecord>>,
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn load(&self, resource_id: &str) -> Result<Option<ResourceRecord>, CoreError> {
        Ok(self.records.lock().get(resource_id).cloned())
    }

    async fn persist(
        &self,
        resource_id: &str,
        record: ResourceRecord,
    ) -> Result<ResourceRecord, CoreError> {
        let mut records = self.records.lock();
        let record = match records.remove(resource_id) {
            Some(previous) if previous.same_identity(&record) => record.merged_onto(previous),
            _ => record,
        };
        records.insert(resource_id.to_string(), record.clone());
        Ok(record)
    }

    async fn remove(&self, resource_id: &str) -> Result<bool, CoreError> {
        Ok(self.records.lock().remove(resource_id).is_some())
    }
}
