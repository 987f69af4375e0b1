//! # edgelink-storage
//!
//! 로컬 저장소 어댑터.
//! 연결이 끊긴 동안 텔레메트리 페이로드를 보관하는 오프라인 버퍼 두 가지와
//! DCC 리소스 레코드 파일 저장소를 제공한다.
//!
//! ## 모듈
//! - `memory_buffer`: 용량 제한 인메모리 FIFO (`OfflineBuffer` 구현)
//! - `sqlite_buffer`: SQLite 영속 FIFO (`OfflineBuffer` 구현)
//! - `resource_store`: 리소스 ID별 JSON 레코드 (`ResourceStore` 구현)

mod drain;
pub mod memory_buffer;
pub mod resource_store;
pub mod sqlite_buffer;

pub use memory_buffer::MemoryBuffer;
pub use resource_store::JsonResourceStore;
pub use sqlite_buffer::SqliteBuffer;

#[cfg(test)]
mod test_support;
