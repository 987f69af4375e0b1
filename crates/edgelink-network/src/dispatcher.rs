//! 전송 디스패처.
//!
//! 싱크가 만든 페이로드를 연결 상태에 따라 바로 보내거나 오프라인 버퍼에 넣는다.
//! 연결이 복구되면 버퍼 드레인을 시작하고 다시 직접 전송으로 돌아간다.
//! 드레인이 실패해 메시지가 남아 있으면 다음 게시 때 드레인을 다시 시작한다.

use edgelink_core::error::CoreError;
use edgelink_core::ports::buffer::OfflineBuffer;
use edgelink_core::ports::connectivity::Connectivity;
use edgelink_core::ports::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 오프라인 내성 구성 (연결 감시 + 버퍼 백엔드)
struct Resilience {
    connectivity: Arc<dyn Connectivity>,
    buffer: Arc<dyn OfflineBuffer>,
}

/// 전송 디스패처
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    resilience: Option<Resilience>,
    /// 직전 게시가 버퍼로 갔는지
    buffering: AtomicBool,
}

impl Dispatcher {
    /// 직접 전송만 하는 디스패처
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            resilience: None,
            buffering: AtomicBool::new(false),
        }
    }

    /// 오프라인 버퍼 사용
    pub fn with_resilience(
        mut self,
        connectivity: Arc<dyn Connectivity>,
        buffer: Arc<dyn OfflineBuffer>,
    ) -> Self {
        self.resilience = Some(Resilience {
            connectivity,
            buffer,
        });
        self
    }

    /// 전송 계층
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// 버퍼링 중인지
    pub fn is_buffering(&self) -> bool {
        self.buffering.load(Ordering::Acquire)
    }

    /// 오프라인 버퍼 사용 여부
    pub fn is_resilient(&self) -> bool {
        self.resilience.is_some()
    }

    /// 페이로드 게시
    ///
    /// 버퍼가 구성되어 있으면 데이터 경로의 실패는 버퍼로 흡수된다.
    pub async fn publish(&self, payload: String) -> Result<(), CoreError> {
        let Some(resilience) = &self.resilience else {
            return self.transport.send(&payload).await;
        };

        if !resilience.connectivity.is_reachable() {
            if !self.buffering.swap(true, Ordering::AcqRel) {
                info!("연결 끊김 — 텔레메트리 버퍼링 시작");
            }
            debug!("페이로드 버퍼에 저장");
            return resilience.buffer.add(payload).await;
        }

        if self.buffering.swap(false, Ordering::AcqRel) {
            info!("연결 복구 — 버퍼 드레인 시작");
            Arc::clone(&resilience.buffer).start_drain();
        } else if !resilience.buffer.is_draining() {
            // 실패한 드레인이 남긴 메시지
            match resilience.buffer.len().await {
                Ok(0) => {}
                Ok(left) => {
                    info!("버퍼에 남은 메시지 {left}건 — 드레인 재시작");
                    Arc::clone(&resilience.buffer).start_drain();
                }
                Err(e) => warn!("버퍼 크기 확인 실패: {e}"),
            }
        }

        if let Err(e) = self.transport.send(&payload).await {
            warn!("직접 전송 실패, 버퍼에 저장: {e}");
            self.buffering.store(true, Ordering::Release);
            return resilience.buffer.add(payload).await;
        }
        Ok(())
    }
}
