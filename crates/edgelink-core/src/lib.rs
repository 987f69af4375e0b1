//! # edgelink-core
//!
//! edgelink 도메인 모델, 포트(trait) 정의, 에러 타입.
//! 모든 크레이트가 공유하는 핵심 타입과 인터페이스를 제공한다.
//!
//! ## 구조
//!
//! - [`models`] — 메트릭/샘플/핸들, 프로토콜 봉투, 리소스 레코드
//! - [`ports`] — 전송, 연결 상태, 오프라인 버퍼, 싱크, 리소스 저장소 포트 (async_trait)
//! - [`error`] — 핵심 에러 타입 (thiserror)
//! - [`config`] — 에이전트 설정 구조체
//! - [`config_manager`] — 설정 파일 관리 (로드/저장)

pub mod config;
pub mod config_manager;
pub mod error;
pub mod models;
pub mod ports;
