//! edgelink 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 라이브러리 에러(rusqlite, tungstenite 등)를
//! `map_err`로 `CoreError`에 매핑한다.

use thiserror::Error;

/// 코어 레이어 에러.
///
/// 제어 평면(등록/속성/관계) 실패는 호출자에게 동기적으로 전달되고,
/// 데이터 평면(텔레메트리) 실패는 오프라인 버퍼가 흡수한 뒤 로그만 남긴다.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류 (생성 시점에 즉시 실패)
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 — {field}: {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 네트워크 에러 (연결 실패, 송수신 실패)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 로컬 저장소 에러 (SQLite, 리소스 파일)
    #[error("저장소 에러: {0}")]
    Storage(String),

    /// 리소스 등록 실패 (식별자 없음 또는 실패 응답)
    #[error("{kind} '{name}' 등록 실패: {reason}")]
    RegistrationFailed {
        /// 엔티티 종류 (예: "metric", "device")
        kind: String,
        /// 엔티티 이름
        name: String,
        /// 실패 사유
        reason: String,
    },

    /// 제어 작업이 실패 응답으로 완료됨
    #[error("{operation} 실패: {reason}")]
    OperationFailed {
        /// 요청 유형 (예: "add_properties_request")
        operation: String,
        /// 실패 사유
        reason: String,
    },

    /// 응답 대기 타임아웃 (해당 요청에만 영향)
    #[error("트랜잭션 {transaction_id} 응답 타임아웃: {timeout_ms}ms 초과")]
    RequestTimeout {
        /// 요청 트랜잭션 ID
        transaction_id: u32,
        /// 초과된 타임아웃 시간 (밀리초)
        timeout_ms: u64,
    },

    /// 프로토콜 버전 불일치 (클라이언트 전체 중단)
    #[error("프로토콜 버전 불일치: expected={expected}, actual={actual:?}")]
    VersionMismatch {
        /// 클라이언트 버전
        expected: u32,
        /// 응답에 실린 버전 (없거나 정수가 아니면 None)
        actual: Option<u32>,
    },

    /// 버전 불일치 이후 중단된 클라이언트에 대한 호출
    #[error("클라이언트가 중단됨 — 더 이상 요청할 수 없음")]
    ClientAborted,

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}
