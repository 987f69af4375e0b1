//! 오프라인 버퍼 포트.
//!
//! 구현: `edgelink-storage` crate (인메모리 FIFO, SQLite FIFO)

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::CoreError;

/// 연결이 끊긴 동안 직렬화된 페이로드를 보관하는 FIFO
///
/// 드레인은 버퍼마다 동시에 하나만 실행된다.
#[async_trait]
pub trait OfflineBuffer: Send + Sync {
    /// 메시지 보관
    async fn add(&self, message: String) -> Result<(), CoreError>;

    /// 연결이 유지되는 동안 보관된 메시지를 삽입 순서대로 전송
    ///
    /// 전송한 메시지 수를 반환한다. 이미 드레인 중이면 아무것도 하지 않는다.
    async fn drain(&self) -> Result<usize, CoreError>;

    /// 백그라운드 태스크에서 드레인 시작 (반복 호출 안전)
    fn start_drain(self: Arc<Self>);

    /// 드레인 진행 중인지
    fn is_draining(&self) -> bool;

    /// 보관 중인 메시지 수
    async fn len(&self) -> Result<usize, CoreError>;
}
