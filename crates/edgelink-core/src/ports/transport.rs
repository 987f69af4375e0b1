//! 전송 포트.
//!
//! 구현: `edgelink-network` crate (WebSocket, TCP 라인)

use async_trait::async_trait;

use crate::error::CoreError;

/// DCC와의 양방향 연결
///
/// 암호화/재연결 등 전송 세부 사항은 구현체가 책임진다.
#[async_trait]
pub trait Transport: Send + Sync {
    /// 전송 유형 이름 (영속 버퍼 테이블 이름에 사용)
    fn name(&self) -> &str;

    /// 메시지 1건 전송
    async fn send(&self, message: &str) -> Result<(), CoreError>;

    /// 메시지 1건 수신 (블로킹)
    ///
    /// 연결이 정상 종료되면 `Ok(None)`.
    async fn receive(&self) -> Result<Option<String>, CoreError>;

    /// 연결 종료 (기본: 아무것도 하지 않음)
    async fn close(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
