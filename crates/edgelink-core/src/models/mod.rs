//! 도메인 모델.
//!
//! - [`metric`] — 메트릭 정의, 샘플, 스케줄링 가능한 메트릭 핸들
//! - [`envelope`] — DCC 제어/텔레메트리 JSON 봉투
//! - [`resource`] — DCC가 할당한 리소스 식별자와 로컬 레코드

pub mod envelope;
pub mod metric;
pub mod resource;
