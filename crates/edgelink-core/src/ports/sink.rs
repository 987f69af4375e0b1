//! 텔레메트리 싱크 포트.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::metric::MetricHandle;

/// 메트릭 핸들의 배치를 받아 DCC로 보내는 싱크
///
/// 싱크마다 `format_data`로 전송 형식을 정하고, 보낼지/버퍼링할지는
/// 디스패처가 결정한다.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// 싱크 유형 이름 (영속 버퍼 테이블 이름에 사용)
    fn name(&self) -> &str;

    /// 핸들의 대기 샘플을 전송 페이로드로 변환 (샘플이 없으면 None)
    fn format_data(&self, handle: &MetricHandle) -> Result<Option<String>, CoreError>;

    /// 핸들의 현재 배치 게시
    async fn publish(&self, handle: &MetricHandle) -> Result<(), CoreError>;
}
