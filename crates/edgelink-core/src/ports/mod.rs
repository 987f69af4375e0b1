//! 포트 인터페이스 (trait).
//!
//! Hexagonal Architecture의 포트 레이어.
//! 어댑터 crate(`edgelink-network`, `edgelink-storage`)가 이 trait들을 구현하며,
//! `edgelink-app`에서 `Arc<dyn T>`로 와이어링한다.
//!
//! 모든 async trait은 `async_trait` 매크로로 object safety를 보장한다.

pub mod buffer;
pub mod connectivity;
pub mod resource_store;
pub mod sink;
pub mod transport;
