//! 연결 상태 감시.
//!
//! 백그라운드 루프가 주기적으로 기준 호스트를 프로브하고 결과를 저장한다.
//! `is_reachable()`은 저장된 값만 읽으므로 절대 블로킹하지 않는다.
//! 연속 실패가 임계값에 도달하면 오프라인으로 전환한다.

use async_trait::async_trait;
use chrono::Utc;
use edgelink_core::config::ConnectivityConfig;
use edgelink_core::ports::connectivity::Connectivity;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// 도달 가능
    Connected,
    /// 도달 불가
    Disconnected,
    /// 실패했지만 임계값 미만
    Reconnecting,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

/// 도달 가능성 프로브
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// 기준 호스트에 도달 가능한지 (실패는 false)
    async fn probe(&self) -> bool;
}

/// TCP 연결 프로브
///
/// ICMP는 raw 소켓 권한이 필요하므로 TCP 연결 성공 여부로 판단한다.
pub struct TcpProbe {
    target: String,
    timeout: Duration,
}

impl TcpProbe {
    /// `host:port`로 연결을 시도하는 프로브
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            target: format!("{host}:{port}"),
            timeout,
        }
    }

    /// 설정으로부터 생성
    pub fn from_config(config: &ConnectivityConfig) -> Self {
        Self::new(
            &config.target_host,
            config.target_port,
            Duration::from_millis(config.probe_timeout_ms),
        )
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("프로브 실패 ({}): {e}", self.target);
                false
            }
            Err(_) => {
                debug!("프로브 타임아웃 ({})", self.target);
                false
            }
        }
    }
}

/// 연결 상태 감시기
pub struct ConnectivityMonitor {
    is_online: AtomicBool,
    /// 마지막 성공 프로브 시각 (epoch 밀리초, 0 = 없음)
    last_success: AtomicI64,
    failure_count: AtomicU64,
    status_tx: watch::Sender<ConnectionStatus>,
    status_rx: watch::Receiver<ConnectionStatus>,
    offline_threshold: u64,
    force_offline: AtomicBool,
}

impl ConnectivityMonitor {
    /// 새 감시기 생성 (첫 프로브 전까지 도달 가능으로 간주)
    ///
    /// `offline_threshold`: 이 횟수만큼 연속 실패하면 오프라인 전환 (최소 1)
    pub fn new(offline_threshold: u64) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);
        Self {
            is_online: AtomicBool::new(true),
            last_success: AtomicI64::new(0),
            failure_count: AtomicU64::new(0),
            status_tx,
            status_rx,
            offline_threshold: offline_threshold.max(1),
            force_offline: AtomicBool::new(false),
        }
    }

    /// 설정으로부터 생성
    pub fn from_config(config: &ConnectivityConfig) -> Self {
        Self::new(config.offline_threshold)
    }

    /// 강제 오프라인 모드 설정
    pub fn set_force_offline(&self, force: bool) {
        self.force_offline.store(force, Ordering::Relaxed);
        if force {
            self.is_online.store(false, Ordering::Relaxed);
            let _ = self.status_tx.send(ConnectionStatus::Disconnected);
            info!("강제 오프라인 모드 활성화");
        } else {
            info!("강제 오프라인 모드 해제 — 다음 프로브부터 반영");
        }
    }

    /// 강제 오프라인 모드 여부
    pub fn is_force_offline(&self) -> bool {
        self.force_offline.load(Ordering::Relaxed)
    }

    /// 현재 온라인 여부
    pub fn is_online(&self) -> bool {
        !self.is_force_offline() && self.is_online.load(Ordering::Relaxed)
    }

    /// 현재 연결 상태
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// 상태 변경 수신기
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// 프로브 성공 기록
    pub fn record_success(&self) {
        if self.is_force_offline() {
            return;
        }

        let was_offline = !self.is_online.swap(true, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.last_success
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);

        if was_offline {
            info!("기준 호스트 도달 가능 — 온라인");
            let _ = self.status_tx.send(ConnectionStatus::Connected);
        } else if self.status() != ConnectionStatus::Connected {
            let _ = self.status_tx.send(ConnectionStatus::Connected);
        }
    }

    /// 프로브 실패 기록
    pub fn record_failure(&self) {
        if self.is_force_offline() {
            return;
        }

        let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("프로브 실패 (연속 {count}회)");

        if count >= self.offline_threshold {
            if self.is_online.swap(false, Ordering::Relaxed) {
                warn!("연속 {count}회 프로브 실패 — 오프라인 전환 (텔레메트리 버퍼링)");
                let _ = self.status_tx.send(ConnectionStatus::Disconnected);
            }
        } else {
            let _ = self.status_tx.send(ConnectionStatus::Reconnecting);
        }
    }

    /// 연속 실패 횟수
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// 마지막 성공 프로브 이후 경과 시간 (성공한 적 없으면 None)
    pub fn time_since_last_success(&self) -> Option<Duration> {
        let last = self.last_success.load(Ordering::Relaxed);
        if last == 0 {
            return None;
        }
        let elapsed = Utc::now().timestamp_millis().saturating_sub(last).max(0);
        Some(Duration::from_millis(elapsed as u64))
    }

    /// 연결 상태 통계
    pub fn stats(&self) -> ConnectivityStats {
        ConnectivityStats {
            is_online: self.is_online(),
            status: self.status(),
            failure_count: self.failure_count(),
            time_since_last_success: self.time_since_last_success(),
            force_offline: self.is_force_offline(),
        }
    }

    /// 프로브 1회 실행 후 결과 기록
    pub async fn probe_once(&self, probe: &dyn ReachabilityProbe) -> bool {
        let reachable = probe.probe().await;
        if reachable {
            self.record_success();
        } else {
            self.record_failure();
        }
        reachable
    }

    /// 프로브 루프 시작
    ///
    /// 즉시 한 번 프로브한 뒤 `interval`마다 반복한다. 종료 신호에 멈춘다.
    pub fn spawn(
        self: &Arc<Self>,
        probe: Arc<dyn ReachabilityProbe>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            info!("연결 감시 시작 (간격 {}초)", interval.as_secs_f64());
            monitor.probe_once(probe.as_ref()).await;

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        monitor.probe_once(probe.as_ref()).await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("연결 감시 종료");
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Connectivity for ConnectivityMonitor {
    fn is_reachable(&self) -> bool {
        self.is_online()
    }
}

/// 연결 상태 통계
#[derive(Debug, Clone)]
pub struct ConnectivityStats {
    /// 현재 온라인 여부
    pub is_online: bool,
    /// 현재 연결 상태
    pub status: ConnectionStatus,
    /// 연속 실패 횟수
    pub failure_count: u64,
    /// 마지막 성공 이후 경과 시간
    pub time_since_last_success: Option<Duration>,
    /// 강제 오프라인 모드
    pub force_offline: bool,
}
