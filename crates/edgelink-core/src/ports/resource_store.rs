//! 리소스 레코드 저장소 포트.
//!
//! 구현: `edgelink-storage::resource_store::JsonResourceStore`

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::resource::ResourceRecord;

/// DCC가 할당한 리소스 ID별 로컬 레코드
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// 레코드 조회
    async fn load(&self, resource_id: &str) -> Result<Option<ResourceRecord>, CoreError>;

    /// 레코드 저장
    ///
    /// 같은 (종류, 이름, 장치 유형)의 기존 레코드가 있으면 속성을 병합하고,
    /// 다르면 교체한다. 실제로 저장된 레코드를 반환한다.
    async fn persist(
        &self,
        resource_id: &str,
        record: ResourceRecord,
    ) -> Result<ResourceRecord, CoreError>;

    /// 레코드 삭제 (있었으면 true)
    async fn remove(&self, resource_id: &str) -> Result<bool, CoreError>;
}
