//! DCC 프로토콜 봉투.
//!
//! `{transactionID, version, type, body}` 형태의 JSON 메시지.
//! 제어 요청은 짝수 트랜잭션 ID로 응답과 짝지어지고,
//! 텔레메트리(`add_stats`)는 트랜잭션 ID 없이 전송된다.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 텔레메트리 메시지 유형 (응답 없음)
pub const ADD_STATS: &str = "add_stats";

/// 성공 결과 문자열
pub const RESULT_SUCCEEDED: &str = "succeeded";

/// 실패 결과 문자열
pub const RESULT_FAILED: &str = "failed";

/// 프로토콜 봉투
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// 트랜잭션 ID (텔레메트리는 None)
    #[serde(
        rename = "transactionID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transaction_id: Option<u32>,
    /// 프로토콜 버전 (없거나 정수가 아니면 None)
    #[serde(default, deserialize_with = "integer_version")]
    pub version: Option<u32>,
    /// 메시지 유형 (예: "create_or_find_resource_request")
    #[serde(rename = "type", default)]
    pub message_type: String,
    /// 작업별 본문
    #[serde(default)]
    pub body: Value,
}

/// 버전 필드는 타입이 틀려도 파싱을 실패시키지 않는다 — 응답을 트랜잭션으로
/// 배달한 뒤 요청자가 불일치로 판단한다.
fn integer_version<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok()))
}

impl Envelope {
    /// 제어 요청 봉투 생성
    pub fn request(transaction_id: u32, version: u32, kind: RequestKind, body: Value) -> Self {
        Self {
            transaction_id: Some(transaction_id),
            version: Some(version),
            message_type: kind.request_type().to_string(),
            body,
        }
    }

    /// 텔레메트리 봉투 생성 (트랜잭션 ID 없음)
    pub fn stats(version: u32, body: Value) -> Self {
        Self {
            transaction_id: None,
            version: Some(version),
            message_type: ADD_STATS.to_string(),
            body,
        }
    }

    /// 원시 메시지 파싱
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// `body.result` 값
    pub fn result(&self) -> Option<&str> {
        self.body.get("result").and_then(Value::as_str)
    }

    /// `body.reason` 값 (실패 사유, 없을 수 있음)
    pub fn reason(&self) -> Option<&str> {
        self.body.get("reason").and_then(Value::as_str)
    }

    /// 등록 응답의 리소스 ID (`body.uuid` 우선, 없으면 `body.id`)
    ///
    /// 숫자 ID는 문자열로 변환한다.
    pub fn resource_id(&self) -> Option<String> {
        ["uuid", "id"]
            .iter()
            .filter_map(|key| self.body.get(*key))
            .find_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// 트랜잭션으로 짝지어지는 제어 작업 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// 리소스 등록 (없으면 생성, 있으면 조회)
    CreateOrFindResource,
    /// 리소스 등록 해제
    RemoveResource,
    /// 속성 설정
    AddProperties,
    /// 속성 조회
    GetProperties,
    /// 부모/자식 관계 선언
    CreateRelationship,
}

impl RequestKind {
    /// 작업 이름 (요청/응답 유형의 공통 접두사)
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::CreateOrFindResource => "create_or_find_resource",
            RequestKind::RemoveResource => "remove_resource",
            RequestKind::AddProperties => "add_properties",
            RequestKind::GetProperties => "get_properties",
            RequestKind::CreateRelationship => "create_relationship",
        }
    }

    /// 요청 메시지 유형
    pub fn request_type(&self) -> &'static str {
        match self {
            RequestKind::CreateOrFindResource => "create_or_find_resource_request",
            RequestKind::RemoveResource => "remove_resource_request",
            RequestKind::AddProperties => "add_properties_request",
            RequestKind::GetProperties => "get_properties_request",
            RequestKind::CreateRelationship => "create_relationship_request",
        }
    }

    /// 응답 메시지 유형
    pub fn response_type(&self) -> &'static str {
        match self {
            RequestKind::CreateOrFindResource => "create_or_find_resource_response",
            RequestKind::RemoveResource => "remove_resource_response",
            RequestKind::AddProperties => "add_properties_response",
            RequestKind::GetProperties => "get_properties_response",
            RequestKind::CreateRelationship => "create_relationship_response",
        }
    }

    /// 이 요청에 대한 응답으로 받아들일 수 있는 유형인지
    ///
    /// 유형이 비어 있는 응답은 트랜잭션 ID만으로 판단한다.
    pub fn accepts(&self, message_type: &str) -> bool {
        message_type.is_empty() || message_type == self.response_type()
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.request_type())
    }
}
