//! 상관 프로토콜 클라이언트.
//!
//! 제어 요청마다 짝수 트랜잭션 ID를 붙여 보내고, 수신 태스크가 받은 응답을
//! ID로 찾아 해당 요청의 전용 채널에 배달한다. 호출자는 응답 타임아웃까지
//! 기다린다.
//!
//! 텔레메트리(`add_stats`)는 응답이 없으므로 [`Dispatcher`]로 보낸다.
//! 버전이 다른 응답을 받으면 클라이언트 전체가 중단되고 이후 모든 호출은
//! [`CoreError::ClientAborted`]로 실패한다.

use async_trait::async_trait;
use edgelink_core::config::AgentConfig;
use edgelink_core::error::CoreError;
use edgelink_core::models::envelope::{Envelope, RequestKind, RESULT_FAILED, RESULT_SUCCEEDED};
use edgelink_core::models::metric::{Metric, MetricHandle};
use edgelink_core::models::resource::{PropertyMap, ResourceRecord, ResourceRef};
use edgelink_core::ports::resource_store::ResourceStore;
use edgelink_core::ports::sink::TelemetrySink;
use edgelink_core::ports::transport::Transport;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::transaction::{PendingRequests, TransactionIdGenerator};
use crate::dispatcher::Dispatcher;

/// 싱크 유형 이름
pub const SINK_NAME: &str = "ProtocolClient";

/// 메트릭 엔티티 종류
const METRIC_KIND: &str = "metric";

/// 수신 에러 후 재시도 전 대기
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// 프로토콜 설정
#[derive(Debug, Clone, Copy)]
pub struct ProtocolSettings {
    /// 프로토콜 버전 (응답 버전과 일치해야 함)
    pub version: u32,
    /// 제어 요청 응답 타임아웃
    pub response_timeout: Duration,
}

impl ProtocolSettings {
    /// 에이전트 설정에서 추출
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            version: config.server.protocol_version,
            response_timeout: config.response_timeout(),
        }
    }
}

/// DCC 프로토콜 클라이언트
pub struct ProtocolClient {
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    store: Arc<dyn ResourceStore>,
    settings: ProtocolSettings,
    ids: TransactionIdGenerator,
    pending: PendingRequests,
    aborted: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ProtocolClient {
    /// 새 클라이언트 생성
    ///
    /// 요청/응답은 디스패처의 전송 계층을 그대로 사용한다.
    pub fn new(
        dispatcher: Dispatcher,
        store: Arc<dyn ResourceStore>,
        settings: ProtocolSettings,
    ) -> Self {
        Self {
            transport: Arc::clone(dispatcher.transport()),
            dispatcher,
            store,
            settings,
            ids: TransactionIdGenerator::new(),
            pending: PendingRequests::new(),
            aborted: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// 트랜잭션 카운터 시작값 지정
    pub fn with_transaction_counter(mut self, counter: u32) -> Self {
        self.ids = TransactionIdGenerator::starting_at(counter);
        self
    }

    /// 수신/배달 태스크 시작
    pub fn connect(self: &Arc<Self>, shutdown_rx: watch::Receiver<bool>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let receive = tokio::spawn(Self::receive_loop(
            Arc::clone(&self.transport),
            inbound_tx,
            shutdown_rx.clone(),
        ));
        let dispatch = tokio::spawn(Self::dispatch_loop(
            Arc::clone(self),
            inbound_rx,
            shutdown_rx,
        ));

        self.tasks.lock().extend([receive, dispatch]);
        info!(
            "프로토콜 클라이언트 시작 (전송 {}, 버전 {})",
            self.transport.name(),
            self.settings.version
        );
    }

    /// 태스크 중단, 이후 모든 호출은 실패
    pub fn shutdown(&self) {
        self.aborted.store(true, Ordering::Release);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("프로토콜 클라이언트 종료");
    }

    /// 클라이언트가 중단되었는지 (버전 불일치 또는 종료)
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// 응답 대기 중인 요청 수
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// 디스패처
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// 전송 → 수신 큐
    async fn receive_loop(
        transport: Arc<dyn Transport>,
        inbound_tx: mpsc::UnboundedSender<String>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                received = transport.receive() => match received {
                    Ok(Some(raw)) => {
                        if inbound_tx.send(raw).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("전송 연결 종료 — 수신 중단");
                        break;
                    }
                    Err(e) => {
                        warn!("수신 실패: {e}");
                        tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                    }
                },
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("수신 태스크 종료");
    }

    /// 수신 큐 → 대기 중인 요청
    async fn dispatch_loop(
        client: Arc<Self>,
        mut inbound_rx: mpsc::UnboundedReceiver<String>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                raw = inbound_rx.recv() => match raw {
                    Some(raw) => client.route(&raw),
                    None => break,
                },
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("배달 태스크 종료");
    }

    /// 수신 메시지 1건 배달
    fn route(&self, raw: &str) {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("파싱 불가 메시지 폐기: {e}");
                return;
            }
        };

        match envelope.transaction_id {
            Some(id) => {
                if !self.pending.deliver(id, envelope) {
                    debug!("대기 중인 요청 없음 (트랜잭션 {id}) — 폐기");
                }
            }
            None => debug!("트랜잭션 없는 메시지 폐기: {}", envelope.message_type),
        }
    }

    fn ensure_active(&self) -> Result<(), CoreError> {
        if self.is_aborted() {
            return Err(CoreError::ClientAborted);
        }
        Ok(())
    }

    /// 제어 요청 전송 후 응답 대기
    ///
    /// 대기 항목은 어떤 경로로 끝나든 반환 시 제거된다.
    async fn request(&self, kind: RequestKind, body: Value) -> Result<Envelope, CoreError> {
        self.ensure_active()?;

        let id = self.ids.next_id();
        let mut waiter = self.pending.register(id);
        let envelope = Envelope::request(id, self.settings.version, kind, body);
        let message = serde_json::to_string(&envelope)?;

        debug!("요청 전송: {kind} (트랜잭션 {id})");
        self.transport.send(&message).await?;

        let timeout = self.settings.response_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let response = match tokio::time::timeout_at(deadline, waiter.recv()).await {
                Ok(Some(response)) => response,
                Ok(None) | Err(_) => {
                    warn!("응답 타임아웃: {kind} (트랜잭션 {id})");
                    return Err(CoreError::RequestTimeout {
                        transaction_id: id,
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            };

            if response.version != Some(self.settings.version) {
                self.aborted.store(true, Ordering::Release);
                error!(
                    "프로토콜 버전 불일치 (기대 {}, 수신 {:?}) — 클라이언트 중단",
                    self.settings.version, response.version
                );
                return Err(CoreError::VersionMismatch {
                    expected: self.settings.version,
                    actual: response.version,
                });
            }

            if !kind.accepts(&response.message_type) {
                warn!(
                    "예상치 못한 응답 유형 무시: {} (트랜잭션 {id})",
                    response.message_type
                );
                continue;
            }

            debug!("응답 수신: {kind} (트랜잭션 {id})");
            return Ok(response);
        }
    }

    /// `body.result` 확인
    fn check_result(kind: RequestKind, response: &Envelope) -> Result<(), CoreError> {
        match response.result() {
            Some(RESULT_SUCCEEDED) => Ok(()),
            Some(RESULT_FAILED) => Err(CoreError::OperationFailed {
                operation: kind.as_str().to_string(),
                reason: response.reason().unwrap_or(RESULT_FAILED).to_string(),
            }),
            other => Err(CoreError::OperationFailed {
                operation: kind.as_str().to_string(),
                reason: format!("알 수 없는 결과: {other:?}"),
            }),
        }
    }

    /// 로컬 레코드 저장 (실패는 로그만)
    async fn persist(&self, resource: &ResourceRef, properties: PropertyMap) {
        let record = ResourceRecord::from_resource(resource, properties);
        if let Err(e) = self.store.persist(&resource.id, record).await {
            warn!("리소스 레코드 저장 실패 ({}): {e}", resource.id);
        }
    }

    async fn register_with_body(
        &self,
        kind: &str,
        name: &str,
        device_type: Option<&str>,
        mut body: serde_json::Map<String, Value>,
        properties: PropertyMap,
    ) -> Result<ResourceRef, CoreError> {
        body.insert("kind".to_string(), json!(kind));
        body.insert("name".to_string(), json!(name));
        if let Some(device_type) = device_type {
            body.insert("deviceType".to_string(), json!(device_type));
        }
        if !properties.is_empty() {
            body.insert("properties".to_string(), Value::Object(properties.clone()));
        }

        let response = self
            .request(RequestKind::CreateOrFindResource, Value::Object(body))
            .await?;

        let registration_failed = |reason: String| CoreError::RegistrationFailed {
            kind: kind.to_string(),
            name: name.to_string(),
            reason,
        };

        if response.result() == Some(RESULT_FAILED) {
            return Err(registration_failed(
                response.reason().unwrap_or(RESULT_FAILED).to_string(),
            ));
        }
        let id = response
            .resource_id()
            .ok_or_else(|| registration_failed("응답에 리소스 ID 없음".to_string()))?;

        let resource = ResourceRef {
            kind: kind.to_string(),
            id,
            name: name.to_string(),
            device_type: device_type.map(str::to_string),
        };
        self.persist(&resource, properties).await;
        info!("리소스 등록: {kind} '{name}' → {}", resource.id);

        Ok(resource)
    }

    /// 리소스 등록 (없으면 생성, 있으면 기존 ID 반환)
    pub async fn register_resource(
        &self,
        kind: &str,
        name: &str,
        device_type: Option<&str>,
        properties: PropertyMap,
    ) -> Result<ResourceRef, CoreError> {
        self.register_with_body(kind, name, device_type, serde_json::Map::new(), properties)
            .await
    }

    /// 리소스 등록 해제 (성공 시 로컬 레코드 삭제)
    pub async fn unregister(&self, resource: &ResourceRef) -> Result<(), CoreError> {
        let kind = RequestKind::RemoveResource;
        let response = self
            .request(kind, json!({"kind": resource.kind, "id": resource.id}))
            .await?;
        Self::check_result(kind, &response)?;

        if let Err(e) = self.store.remove(&resource.id).await {
            warn!("리소스 레코드 삭제 실패 ({}): {e}", resource.id);
        }
        info!("리소스 등록 해제: {}", resource.id);
        Ok(())
    }

    /// 속성 설정 (성공 시 로컬 레코드에 병합)
    pub async fn set_properties(
        &self,
        resource: &ResourceRef,
        properties: PropertyMap,
    ) -> Result<(), CoreError> {
        let kind = RequestKind::AddProperties;
        let response = self
            .request(
                kind,
                json!({
                    "kind": resource.kind,
                    "id": resource.id,
                    "propertyList": properties,
                }),
            )
            .await?;
        Self::check_result(kind, &response)?;

        self.persist(resource, properties).await;
        Ok(())
    }

    /// 속성 조회
    pub async fn get_properties(&self, resource: &ResourceRef) -> Result<PropertyMap, CoreError> {
        let kind = RequestKind::GetProperties;
        let response = self
            .request(kind, json!({"kind": resource.kind, "id": resource.id}))
            .await?;

        match response.body.get("propertyList") {
            Some(Value::Object(properties)) => Ok(properties.clone()),
            _ => Err(CoreError::OperationFailed {
                operation: kind.as_str().to_string(),
                reason: response
                    .reason()
                    .unwrap_or("응답에 propertyList 없음")
                    .to_string(),
            }),
        }
    }

    /// 부모/자식 관계 선언
    pub async fn create_relationship(
        &self,
        parent: &ResourceRef,
        child: &ResourceRef,
    ) -> Result<(), CoreError> {
        let kind = RequestKind::CreateRelationship;
        let response = self
            .request(
                kind,
                json!({
                    "kind": parent.kind,
                    "id": parent.id,
                    "childKind": child.kind,
                    "childID": child.id,
                }),
            )
            .await?;
        Self::check_result(kind, &response)?;
        debug!("관계 선언: {} → {}", parent.id, child.id);
        Ok(())
    }

    /// 메트릭 등록 후 이 클라이언트로 게시하는 핸들 반환
    ///
    /// 부모가 주어지면 관계도 함께 선언한다. 핸들은 시작되지 않은 상태다.
    pub async fn register_metric(
        self: &Arc<Self>,
        metric: Metric,
        parent: Option<&ResourceRef>,
        properties: PropertyMap,
    ) -> Result<MetricHandle, CoreError> {
        let mut body = serde_json::Map::new();
        body.insert("unit".to_string(), json!(metric.unit()));
        body.insert("interval".to_string(), json!(metric.interval_secs()));

        let resource = self
            .register_with_body(METRIC_KIND, metric.name(), None, body, properties)
            .await?;

        if let Some(parent) = parent {
            self.create_relationship(parent, &resource).await?;
        }

        let sink: Arc<dyn TelemetrySink> = Arc::clone(self) as Arc<dyn TelemetrySink>;
        Ok(MetricHandle::new(
            metric,
            sink,
            parent.cloned(),
            Some(resource.id),
        ))
    }
}

#[async_trait]
impl TelemetrySink for ProtocolClient {
    fn name(&self) -> &str {
        SINK_NAME
    }

    fn format_data(&self, handle: &MetricHandle) -> Result<Option<String>, CoreError> {
        if handle.pending_samples() == 0 {
            return Ok(None);
        }
        let resource_id = handle.resource_id().ok_or_else(|| CoreError::Validation {
            field: "resource_id".to_string(),
            message: format!("'{}': 등록되지 않은 메트릭", handle.metric().name()),
        })?;

        let stats: Vec<Value> = handle
            .samples()
            .map(|s| json!([s.timestamp.timestamp_millis(), s.value]))
            .collect();

        let envelope = Envelope::stats(
            self.settings.version,
            json!({
                "kind": METRIC_KIND,
                "id": resource_id,
                "name": handle.metric().name(),
                "unit": handle.metric().unit(),
                "stats": stats,
            }),
        );
        Ok(Some(serde_json::to_string(&envelope)?))
    }

    async fn publish(&self, handle: &MetricHandle) -> Result<(), CoreError> {
        self.ensure_active()?;
        match self.format_data(handle)? {
            Some(payload) => self.dispatcher.publish(payload).await,
            None => Ok(()),
        }
    }
}
