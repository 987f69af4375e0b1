//! 라인 싱크.
//!
//! 샘플마다 `"<name> <value> <epoch-seconds>\n"` 한 줄을 만들어 보낸다.
//! 리소스 등록이나 응답 대기 없이 디스패처로 바로 게시한다.

use async_trait::async_trait;
use edgelink_core::error::CoreError;
use edgelink_core::models::metric::{Metric, MetricHandle};
use edgelink_core::models::resource::ResourceRef;
use edgelink_core::ports::sink::TelemetrySink;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use crate::dispatcher::Dispatcher;

/// 싱크 유형 이름
pub const SINK_NAME: &str = "LineSink";

/// plaintext 라인 싱크
pub struct LineSink {
    dispatcher: Dispatcher,
}

impl LineSink {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// 메트릭을 이 싱크에 연결한 핸들 반환 (시작되지 않은 상태)
    pub fn register(self: &Arc<Self>, metric: Metric, parent: Option<&ResourceRef>) -> MetricHandle {
        debug!("라인 싱크 메트릭 등록: {}", metric.name());
        let sink: Arc<dyn TelemetrySink> = Arc::clone(self) as Arc<dyn TelemetrySink>;
        MetricHandle::new(metric, sink, parent.cloned(), None)
    }

    /// 디스패처
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

#[async_trait]
impl TelemetrySink for LineSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    fn format_data(&self, handle: &MetricHandle) -> Result<Option<String>, CoreError> {
        if handle.pending_samples() == 0 {
            return Ok(None);
        }

        let name = handle.metric().name();
        let mut payload = String::new();
        for sample in handle.samples() {
            let _ = writeln!(
                payload,
                "{name} {} {}",
                sample.value,
                sample.timestamp.timestamp()
            );
        }
        Ok(Some(payload))
    }

    async fn publish(&self, handle: &MetricHandle) -> Result<(), CoreError> {
        match self.format_data(handle)? {
            Some(payload) => self.dispatcher.publish(payload).await,
            None => Ok(()),
        }
    }
}
