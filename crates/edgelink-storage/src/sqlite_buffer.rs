//! SQLite 영속 오프라인 버퍼.
//!
//! 싱크/전송 조합마다 테이블 하나 (`<sink>_<transport>`).
//! 각 행은 직렬화된 메시지 하나이고 rowid 순서가 곧 삽입 순서다.
//! 연결은 호출마다 새로 열고 닫는다 — 프로세스가 죽어도 커밋된 행은 남는다.
//!
//! 드레인은 한 행씩 조회 → 전송 → 삭제한다. 전송이 성공한 행만 지워지므로
//! 중간에 실패하거나 연결이 끊기면 남은 행은 다음 드레인에서 다시 시도된다.

use async_trait::async_trait;
use edgelink_core::config::BufferConfig;
use edgelink_core::error::CoreError;
use edgelink_core::ports::buffer::OfflineBuffer;
use edgelink_core::ports::connectivity::Connectivity;
use edgelink_core::ports::transport::Transport;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::drain::{shutdown_requested, DrainFlag, DrainPacing};

/// 테이블 이름 생성 — 영숫자와 `_` 외 문자는 `_`로 치환
pub fn table_name_for(sink_name: &str, transport_name: &str) -> String {
    format!("{sink_name}_{transport_name}")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// SQLite 영속 FIFO
pub struct SqliteBuffer {
    db_path: PathBuf,
    table: String,
    pacing: DrainPacing,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    drain_lock: tokio::sync::Mutex<()>,
    draining: AtomicBool,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl SqliteBuffer {
    /// 새 영속 버퍼 생성
    ///
    /// 테이블이 없으면 만든다. 기존 행은 그대로 유지된다 (재시작 후 드레인 대상).
    pub fn open(
        db_path: &Path,
        sink_name: &str,
        config: &BufferConfig,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CoreError::Storage(format!(
                        "버퍼 디렉토리 생성 실패: {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let buffer = Self {
            db_path: db_path.to_path_buf(),
            table: table_name_for(sink_name, transport.name()),
            pacing: DrainPacing {
                batch_size: config.drain_batch_size,
                interval: config.drain_interval(),
            },
            transport,
            connectivity,
            drain_lock: tokio::sync::Mutex::new(()),
            draining: AtomicBool::new(false),
            shutdown_rx: None,
        };

        let conn = buffer.open_connection()?;
        let pending = buffer.count(&conn)?;
        info!(
            "SQLite 버퍼 초기화: {} (테이블 {}, 대기 {}건)",
            buffer.db_path.display(),
            buffer.table,
            pending
        );

        Ok(buffer)
    }

    /// 종료 신호 설정 — 드레인이 반복 경계에서 멈춘다
    pub fn with_shutdown(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// 테이블 이름
    pub fn table(&self) -> &str {
        &self.table
    }

    /// DB 파일 경로
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open_connection(&self) -> Result<Connection, CoreError> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| CoreError::Storage(format!("SQLite 열기 실패: {e}")))?;

        conn.execute_batch(&format!(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS {} (message TEXT NOT NULL);
            ",
            self.table
        ))
        .map_err(|e| CoreError::Storage(format!("버퍼 테이블 준비 실패: {e}")))?;

        Ok(conn)
    }

    fn count(&self, conn: &Connection) -> Result<usize, CoreError> {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
                row.get(0)
            })
            .map_err(|e| CoreError::Storage(format!("버퍼 크기 조회 실패: {e}")))?;
        Ok(count.max(0) as usize)
    }

    /// 가장 오래된 행 (rowid, message)
    fn oldest(&self, conn: &Connection) -> Result<Option<(i64, String)>, CoreError> {
        conn.query_row(
            &format!(
                "SELECT rowid, message FROM {} ORDER BY rowid LIMIT 1",
                self.table
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| CoreError::Storage(format!("버퍼 조회 실패: {e}")))
    }

    fn delete(&self, conn: &Connection, rowid: i64) -> Result<(), CoreError> {
        conn.execute(
            &format!("DELETE FROM {} WHERE rowid = ?1", self.table),
            params![rowid],
        )
        .map_err(|e| CoreError::Storage(format!("버퍼 행 삭제 실패: {e}")))?;
        Ok(())
    }

    /// 메시지 1건 저장 (연결을 열고 삽입 후 닫음)
    pub fn insert(&self, message: &str) -> Result<(), CoreError> {
        let conn = self.open_connection()?;
        conn.execute(
            &format!("INSERT INTO {} (message) VALUES (?1)", self.table),
            params![message],
        )
        .map_err(|e| CoreError::Storage(format!("버퍼 저장 실패: {e}")))?;
        debug!("SQLite 버퍼 저장: {}", self.table);
        Ok(())
    }

    /// 보관 중인 메시지 (삽입 순서)
    pub fn pending_messages(&self) -> Result<Vec<String>, CoreError> {
        let conn = self.open_connection()?;
        let mut stmt = conn
            .prepare(&format!("SELECT message FROM {} ORDER BY rowid", self.table))
            .map_err(|e| CoreError::Storage(format!("버퍼 조회 실패: {e}")))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| CoreError::Storage(format!("버퍼 조회 실패: {e}")))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(|e| CoreError::Storage(format!("행 읽기 실패: {e}")))?);
        }
        Ok(messages)
    }

    /// 드레인 — 연결이 유지되는 동안 가장 오래된 행부터 전송 후 삭제
    pub async fn drain(&self) -> Result<usize, CoreError> {
        let Ok(_lock) = self.drain_lock.try_lock() else {
            debug!("SQLite 버퍼 드레인 이미 진행 중 — 건너뜀");
            return Ok(0);
        };
        let _flag = DrainFlag::raise(&self.draining);

        let conn = self.open_connection()?;
        let mut sent = 0usize;

        loop {
            if shutdown_requested(&self.shutdown_rx) {
                debug!("종료 신호 — 드레인 중단");
                break;
            }
            if !self.connectivity.is_reachable() {
                debug!("연결 끊김 — 드레인 중단, 남은 행 보관");
                break;
            }

            let Some((rowid, message)) = self.oldest(&conn)? else {
                break;
            };

            if let Err(e) = self.transport.send(&message).await {
                warn!("드레인 전송 실패 (행 {rowid} 유지): {e}");
                return Err(e);
            }
            self.delete(&conn, rowid)?;
            sent += 1;

            if self.pacing.should_pause(sent) {
                tokio::time::sleep(self.pacing.interval).await;
            }
        }

        if sent > 0 {
            info!("SQLite 버퍼 드레인: {sent}개 전송 ({})", self.table);
        }
        Ok(sent)
    }
}

#[async_trait]
impl OfflineBuffer for SqliteBuffer {
    async fn add(&self, message: String) -> Result<(), CoreError> {
        self.insert(&message)
    }

    async fn drain(&self) -> Result<usize, CoreError> {
        SqliteBuffer::drain(self).await
    }

    fn start_drain(self: Arc<Self>) {
        if self.is_draining() {
            debug!("SQLite 버퍼 드레인 이미 진행 중");
            return;
        }
        tokio::spawn(async move {
            if let Err(e) = SqliteBuffer::drain(&self).await {
                warn!("SQLite 버퍼 드레인 중단: {e}");
            }
        });
    }

    fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    async fn len(&self) -> Result<usize, CoreError> {
        let conn = self.open_connection()?;
        self.count(&conn)
    }
}
