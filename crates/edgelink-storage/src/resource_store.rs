//! 리소스 레코드 파일 저장소.
//!
//! DCC가 할당한 리소스 ID마다 `<dir>/<id>.json` 파일 하나.
//! 쓰기는 하나의 잠금으로 직렬화된다.

use async_trait::async_trait;
use edgelink_core::error::CoreError;
use edgelink_core::models::resource::ResourceRecord;
use edgelink_core::ports::resource_store::ResourceStore;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// JSON 파일 기반 리소스 저장소
pub struct JsonResourceStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonResourceStore {
    /// 새 저장소 생성 (디렉토리가 없으면 생성)
    pub async fn new(dir: PathBuf) -> Result<Self, CoreError> {
        fs::create_dir_all(&dir).await.map_err(|e| {
            CoreError::Storage(format!("리소스 디렉토리 생성 실패: {}: {e}", dir.display()))
        })?;
        info!("리소스 저장소: {}", dir.display());

        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// 저장 디렉토리
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 리소스 ID → 파일 경로 (경로 구분자 등은 `_`로 치환)
    fn record_path(&self, resource_id: &str) -> PathBuf {
        let file_stem: String = resource_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_stem}.json"))
    }

    async fn read_record(&self, path: &Path) -> Result<Option<ResourceRecord>, CoreError> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Storage(format!(
                "리소스 레코드 읽기 실패: {}: {e}",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl ResourceStore for JsonResourceStore {
    async fn load(&self, resource_id: &str) -> Result<Option<ResourceRecord>, CoreError> {
        self.read_record(&self.record_path(resource_id)).await
    }

    async fn persist(
        &self,
        resource_id: &str,
        record: ResourceRecord,
    ) -> Result<ResourceRecord, CoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.record_path(resource_id);

        let record = match self.read_record(&path).await? {
            Some(previous) if previous.same_identity(&record) => record.merged_onto(previous),
            Some(_) => {
                debug!("리소스 {resource_id}: 다른 엔티티 레코드 교체");
                record
            }
            None => record,
        };

        let content = serde_json::to_string_pretty(&record)?;
        fs::write(&path, content).await.map_err(|e| {
            CoreError::Storage(format!("리소스 레코드 저장 실패: {}: {e}", path.display()))
        })?;
        debug!("리소스 레코드 저장: {resource_id}");

        Ok(record)
    }

    async fn remove(&self, resource_id: &str) -> Result<bool, CoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.record_path(resource_id);

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("리소스 레코드 삭제: {resource_id}");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CoreError::Storage(format!(
                "리소스 레코드 삭제 실패: {}: {e}",
                path.display()
            ))),
        }
    }
}
