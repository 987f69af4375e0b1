//! 인메모리 오프라인 버퍼.
//!
//! 용량 제한 FIFO. 가득 찼을 때는 설정된 정책에 따라
//! 가장 오래된 메시지를 버리거나 새 메시지를 버린다 (데이터 손실은 로그로 남김).
//! 연결이 돌아오면 배치 단위로 쉬어 가며 삽입 순서대로 전송한다.

use async_trait::async_trait;
use edgelink_core::config::{BufferConfig, EvictionPolicy};
use edgelink_core::error::CoreError;
use edgelink_core::ports::buffer::OfflineBuffer;
use edgelink_core::ports::connectivity::Connectivity;
use edgelink_core::ports::transport::Transport;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::drain::{shutdown_requested, DrainFlag, DrainPacing};

/// 인메모리 FIFO 버퍼
pub struct MemoryBuffer {
    queue: Mutex<VecDeque<String>>,
    /// 최대 보관 수 (None = 무제한)
    capacity: Option<usize>,
    eviction: EvictionPolicy,
    pacing: DrainPacing,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    /// 드레인 배타 잠금
    drain_lock: tokio::sync::Mutex<()>,
    draining: AtomicBool,
    appended: AtomicU64,
    dropped: AtomicU64,
    sent: AtomicU64,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl MemoryBuffer {
    /// 새 인메모리 버퍼 생성
    ///
    /// 용량 0, 드레인 배치 크기 0은 설정 에러.
    pub fn new(
        config: &BufferConfig,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let capacity = config.bounded_capacity();
        info!(
            "인메모리 버퍼 생성: 용량={}, 정책={}, 드레인 배치={}",
            capacity.map_or_else(|| "무제한".to_string(), |c| c.to_string()),
            config.eviction,
            config.drain_batch_size
        );

        Ok(Self {
            queue: Mutex::new(VecDeque::new()),
            capacity,
            eviction: config.eviction,
            pacing: DrainPacing {
                batch_size: config.drain_batch_size,
                interval: config.drain_interval(),
            },
            transport,
            connectivity,
            drain_lock: tokio::sync::Mutex::new(()),
            draining: AtomicBool::new(false),
            appended: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            shutdown_rx: None,
        })
    }

    /// 종료 신호 설정 — 드레인이 반복 경계에서 멈춘다
    pub fn with_shutdown(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// 메시지 추가
    ///
    /// 실제로 추가되었으면 true. drop-newest 정책으로 버려지면 false.
    pub fn append(&self, message: String) -> bool {
        let mut queue = self.queue.lock();

        if let Some(capacity) = self.capacity {
            if queue.len() >= capacity {
                match self.eviction {
                    EvictionPolicy::DropOldest => {
                        queue.pop_front();
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!("버퍼 가득 참 ({capacity}) — 가장 오래된 메시지 폐기");
                    }
                    EvictionPolicy::DropNewest => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!("버퍼 가득 참 ({capacity}) — 새 메시지 폐기");
                        return false;
                    }
                }
            }
        }

        queue.push_back(message);
        self.appended.fetch_add(1, Ordering::Relaxed);
        debug!("버퍼 추가, 현재 크기: {}", queue.len());
        true
    }

    /// 전송 실패한 메시지를 맨 앞으로 되돌림
    ///
    /// 그 사이 버퍼가 가득 찼으면 정책대로 한 건을 버린다.
    fn requeue_front(&self, message: String) {
        let mut queue = self.queue.lock();

        if let Some(capacity) = self.capacity {
            if queue.len() >= capacity {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                match self.eviction {
                    // 되돌리는 메시지가 가장 오래된 것
                    EvictionPolicy::DropOldest => {
                        warn!("버퍼 가득 참 — 전송 실패 메시지 폐기");
                        return;
                    }
                    EvictionPolicy::DropNewest => {
                        queue.pop_back();
                        warn!("버퍼 가득 참 — 가장 최근 메시지 폐기 후 재큐잉");
                    }
                }
            }
        }

        queue.push_front(message);
    }

    /// 드레인 — 연결이 유지되는 동안 앞에서부터 전송
    pub async fn drain(&self) -> Result<usize, CoreError> {
        let Ok(_lock) = self.drain_lock.try_lock() else {
            debug!("인메모리 버퍼 드레인 이미 진행 중 — 건너뜀");
            return Ok(0);
        };
        let _flag = DrainFlag::raise(&self.draining);

        let mut sent = 0usize;
        loop {
            if shutdown_requested(&self.shutdown_rx) {
                debug!("종료 신호 — 드레인 중단");
                break;
            }
            if !self.connectivity.is_reachable() {
                debug!("연결 끊김 — 드레인 중단, 남은 메시지 보관");
                break;
            }

            let next = self.queue.lock().pop_front();
            let Some(message) = next else {
                break;
            };

            if let Err(e) = self.transport.send(&message).await {
                warn!("드레인 전송 실패: {e}");
                self.requeue_front(message);
                return Err(e);
            }

            sent += 1;
            self.sent.fetch_add(1, Ordering::Relaxed);

            let remaining = self.size();
            if remaining > 0 && self.pacing.should_pause(sent) {
                tokio::time::sleep(self.pacing.interval).await;
            }
        }

        if sent > 0 {
            info!("인메모리 버퍼 드레인: {sent}개 전송");
        }
        Ok(sent)
    }

    /// 현재 크기
    pub fn size(&self) -> usize {
        self.queue.lock().len()
    }

    /// 보관 중인 메시지 복제본 (삽입 순서)
    pub fn snapshot(&self) -> Vec<String> {
        self.queue.lock().iter().cloned().collect()
    }

    /// 버퍼 통계
    pub fn stats(&self) -> MemoryBufferStats {
        MemoryBufferStats {
            size: self.size(),
            capacity: self.capacity,
            appended: self.appended.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            draining: self.draining.load(Ordering::Acquire),
        }
    }
}

#[async_trait]
impl OfflineBuffer for MemoryBuffer {
    async fn add(&self, message: String) -> Result<(), CoreError> {
        self.append(message);
        Ok(())
    }

    async fn drain(&self) -> Result<usize, CoreError> {
        MemoryBuffer::drain(self).await
    }

    fn start_drain(self: Arc<Self>) {
        if self.is_draining() {
            debug!("인메모리 버퍼 드레인 이미 진행 중");
            return;
        }
        tokio::spawn(async move {
            if let Err(e) = MemoryBuffer::drain(&self).await {
                warn!("인메모리 버퍼 드레인 중단: {e}");
            }
        });
    }

    fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    async fn len(&self) -> Result<usize, CoreError> {
        Ok(self.size())
    }
}

/// 인메모리 버퍼 통계
#[derive(Debug, Clone)]
pub struct MemoryBufferStats {
    /// 현재 크기
    pub size: usize,
    /// 최대 용량 (None = 무제한)
    pub capacity: Option<usize>,
    /// 추가된 메시지 수
    pub appended: u64,
    /// 정책에 따라 버려진 메시지 수
    pub dropped: u64,
    /// 드레인으로 전송된 메시지 수
    pub sent: u64,
    /// 드레인 진행 중 여부
    pub draining: bool,
}
