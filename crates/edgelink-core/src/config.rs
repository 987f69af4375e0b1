//! 에이전트 설정 구조체.
//!
//! DCC 서버 연결, 오프라인 버퍼, 연결 감시, 로컬 저장소, 스케줄러 설정을 정의한다.
//! [`crate::config_manager::ConfigManager`]를 통해 JSON 파일에서 로드.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 에이전트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// DCC 서버 연결 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 오프라인 버퍼 설정
    #[serde(default)]
    pub buffer: BufferConfig,
    /// 연결 감시 설정
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    /// 로컬 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 스케줄러 설정
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

// ============================================================
// 서버 설정
// ============================================================

/// 전송 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// JSON 봉투 기반 상관 프로토콜 (WebSocket)
    #[default]
    WebSocket,
    /// 한 줄 한 샘플 텔레메트리 전용 (TCP)
    TcpLine,
}

/// DCC 서버 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 서버 주소 (WebSocket: "ws://host:port/path", TCP: "host:port")
    #[serde(default = "default_server_url")]
    pub url: String,
    /// 프로토콜 버전 (응답 버전과 다르면 클라이언트 중단)
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
    /// 제어 요청 응답 타임아웃 (초)
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
    /// 전송 방식
    #[serde(default)]
    pub transport: TransportKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            protocol_version: default_protocol_version(),
            response_timeout_secs: default_response_timeout_secs(),
            transport: TransportKind::default(),
        }
    }
}

fn default_server_url() -> String {
    "ws://localhost:8765/dcc".to_string()
}

fn default_protocol_version() -> u32 {
    1
}

fn default_response_timeout_secs() -> u64 {
    10
}

// ============================================================
// 오프라인 버퍼 설정
// ============================================================

/// 오프라인 버퍼 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
    /// 버퍼 없음 — 항상 즉시 전송
    None,
    /// 용량 제한 인메모리 FIFO
    #[default]
    Memory,
    /// SQLite 기반 영속 FIFO
    Durable,
}

/// 용량 초과 시 제거 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// 가장 오래된 메시지를 버리고 새 메시지 추가
    #[default]
    DropOldest,
    /// 새 메시지를 버림 (버퍼 불변)
    DropNewest,
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionPolicy::DropOldest => write!(f, "drop-oldest"),
            EvictionPolicy::DropNewest => write!(f, "drop-newest"),
        }
    }
}

/// 오프라인 버퍼 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// 버퍼 종류
    #[serde(default)]
    pub kind: BufferKind,
    /// 용량 (양수 = 제한, 음수 = 무제한, 0 = 설정 오류)
    #[serde(default = "default_capacity")]
    pub capacity: i64,
    /// 용량 초과 시 제거 정책
    #[serde(default)]
    pub eviction: EvictionPolicy,
    /// 드레인 시 이 개수만큼 전송할 때마다 쉬어감
    #[serde(default = "default_drain_batch_size")]
    pub drain_batch_size: usize,
    /// 드레인 배치 사이 대기 시간 (밀리초)
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    /// 영속 버퍼 DB 경로 (None이면 데이터 디렉토리 사용)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            kind: BufferKind::default(),
            capacity: default_capacity(),
            eviction: EvictionPolicy::default(),
            drain_batch_size: default_drain_batch_size(),
            drain_interval_ms: default_drain_interval_ms(),
            db_path: None,
        }
    }
}

impl BufferConfig {
    /// 제한 용량 (무제한이면 None)
    pub fn bounded_capacity(&self) -> Option<usize> {
        if self.capacity < 0 {
            None
        } else {
            Some(self.capacity as usize)
        }
    }

    /// 드레인 배치 간 대기 시간
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// 버퍼 설정 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.capacity == 0 {
            return Err(CoreError::Validation {
                field: "buffer.capacity".to_string(),
                message: "0은 허용되지 않음 (양수 = 제한, 음수 = 무제한)".to_string(),
            });
        }
        if self.drain_batch_size == 0 {
            return Err(CoreError::Validation {
                field: "buffer.drain_batch_size".to_string(),
                message: "1 이상이어야 함".to_string(),
            });
        }
        Ok(())
    }
}

fn default_capacity() -> i64 {
    1_000
}

fn default_drain_batch_size() -> usize {
    50
}

fn default_drain_interval_ms() -> u64 {
    1_000
}

// ============================================================
// 연결 감시 설정
// ============================================================

/// 연결 감시 설정 — 기준 호스트 도달 가능성 주기적 확인
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// 프로브 간격 (초)
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    /// 기준 호스트
    #[serde(default = "default_target_host")]
    pub target_host: String,
    /// 기준 포트 (TCP 연결 프로브)
    #[serde(default = "default_target_port")]
    pub target_port: u16,
    /// 프로브 1회 타임아웃 (밀리초)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// 오프라인 전환까지 연속 실패 횟수
    #[serde(default = "default_offline_threshold")]
    pub offline_threshold: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            target_host: default_target_host(),
            target_port: default_target_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
            offline_threshold: default_offline_threshold(),
        }
    }
}

fn default_probe_interval_secs() -> u64 {
    10
}

fn default_target_host() -> String {
    "8.8.8.8".to_string()
}

fn default_target_port() -> u16 {
    53
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_offline_threshold() -> u64 {
    1
}

// ============================================================
// 로컬 저장소 / 스케줄러 설정
// ============================================================

/// 로컬 저장소 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 리소스 레코드(JSON) 디렉토리 (None이면 데이터 디렉토리 사용)
    #[serde(default)]
    pub resource_dir: Option<PathBuf>,
}

/// 스케줄러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 스케줄러 틱 간격 (밀리초)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

fn default_tick_ms() -> u64 {
    1_000
}

impl AgentConfig {
    /// 기본 설정 생성
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            buffer: BufferConfig::default(),
            connectivity: ConnectivityConfig::default(),
            storage: StorageConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }

    /// 설정 검증 — 잘못된 값은 생성 시점에 즉시 실패
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.server.url.trim().is_empty() {
            return Err(CoreError::Validation {
                field: "server.url".to_string(),
                message: "비어 있음".to_string(),
            });
        }
        if self.server.response_timeout_secs == 0 {
            return Err(CoreError::Validation {
                field: "server.response_timeout_secs".to_string(),
                message: "1 이상이어야 함".to_string(),
            });
        }
        if self.connectivity.probe_interval_secs == 0 {
            return Err(CoreError::Validation {
                field: "connectivity.probe_interval_secs".to_string(),
                message: "1 이상이어야 함".to_string(),
            });
        }
        if self.connectivity.offline_threshold == 0 {
            return Err(CoreError::Validation {
                field: "connectivity.offline_threshold".to_string(),
                message: "1 이상이어야 함".to_string(),
            });
        }
        if self.scheduler.tick_ms == 0 {
            return Err(CoreError::Validation {
                field: "scheduler.tick_ms".to_string(),
                message: "1 이상이어야 함".to_string(),
            });
        }
        self.buffer.validate()
    }

    /// 응답 타임아웃을 Duration으로 반환
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.server.response_timeout_secs)
    }

    /// 연결 프로브 간격을 Duration으로 반환
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity.probe_interval_secs)
    }

    /// 연결 프로브 타임아웃을 Duration으로 반환
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.connectivity.probe_timeout_ms)
    }

    /// 스케줄러 틱 간격을 Duration으로 반환
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::default_config()
    }
}
