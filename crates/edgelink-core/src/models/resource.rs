//! 리소스 모델.
//!
//! DCC에 등록된 엔티티의 식별자와, 재시작 후에도 유지되는 로컬 레코드.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 속성 목록 (DCC `propertyList`)
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

/// DCC에 등록된 리소스 참조
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    /// 엔티티 종류 (예: "metric", "device", "gateway")
    pub kind: String,
    /// DCC가 할당한 리소스 ID (uuid)
    pub id: String,
    /// 엔티티 이름
    pub name: String,
    /// 장치 유형 (장치가 아니면 None)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

/// 로컬에 저장되는 리소스 레코드 (리소스 ID별 JSON 파일)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    /// 엔티티 종류
    pub entity_type: String,
    /// 엔티티 이름
    pub name: String,
    /// 장치 유형
    #[serde(default)]
    pub device_type: Option<String>,
    /// 병합된 속성
    #[serde(default)]
    pub properties: PropertyMap,
    /// 마지막으로 확인된 시각
    pub last_seen: DateTime<Utc>,
}

impl ResourceRecord {
    /// 리소스 참조로부터 레코드 생성
    pub fn from_resource(resource: &ResourceRef, properties: PropertyMap) -> Self {
        Self {
            entity_type: resource.kind.clone(),
            name: resource.name.clone(),
            device_type: resource.device_type.clone(),
            properties,
            last_seen: Utc::now(),
        }
    }

    /// 같은 엔티티인지 (종류, 이름, 장치 유형 모두 일치)
    pub fn same_identity(&self, other: &ResourceRecord) -> bool {
        self.entity_type == other.entity_type
            && self.name == other.name
            && self.device_type == other.device_type
    }

    /// 기존 레코드와 병합 — 새 속성이 우선, last_seen은 새 값
    pub fn merged_onto(self, previous: ResourceRecord) -> ResourceRecord {
        let mut properties = previous.properties;
        properties.extend(self.properties);
        ResourceRecord {
            properties,
            ..self
        }
    }
}
