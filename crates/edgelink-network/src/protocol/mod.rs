//! DCC 요청/응답 프로토콜.
//!
//! - `transaction`: 짝수 트랜잭션 ID 발급, 대기 중인 요청 테이블
//! - `client`: 제어 작업(등록, 해제, 속성, 관계)과 텔레메트리 싱크

pub mod client;
pub mod transaction;

pub use client::{ProtocolClient, ProtocolSettings};
pub use transaction::{PendingRequests, TransactionIdGenerator};
