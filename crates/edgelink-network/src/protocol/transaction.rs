//! 트랜잭션 ID 발급과 대기 중인 요청 테이블.

use edgelink_core::models::envelope::Envelope;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// 카운터 모듈러 (24비트)
const COUNTER_MODULUS: u32 = 1 << 24;

/// 트랜잭션 ID 발급기
///
/// `((counter + 1) mod 2^24) * 2` — 항상 짝수, 25비트 안에서 순환한다.
#[derive(Debug, Default)]
pub struct TransactionIdGenerator {
    counter: Mutex<u32>,
}

impl TransactionIdGenerator {
    /// 카운터 0에서 시작 (첫 ID는 2)
    pub fn new() -> Self {
        Self::default()
    }

    /// 지정된 카운터 값에서 시작
    pub fn starting_at(counter: u32) -> Self {
        Self {
            counter: Mutex::new(counter % COUNTER_MODULUS),
        }
    }

    /// 다음 ID 발급
    pub fn next_id(&self) -> u32 {
        let mut counter = self.counter.lock();
        *counter = (*counter + 1) % COUNTER_MODULUS;
        *counter * 2
    }
}

/// 요청당 응답 채널 용량
const RESPONSE_CHANNEL_CAPACITY: usize = 4;

/// 응답을 기다리는 요청 테이블
///
/// 요청마다 전용 채널을 만든다. 항목은 요청자가 기다림을 끝낼 때
/// ([`PendingResponse`] drop) 제거되므로, 그 뒤에 도착한 응답은 짝을 찾지 못하고
/// 버려진다.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<u32, mpsc::Sender<Envelope>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// 요청 등록 — 응답 대기 핸들 반환
    pub fn register(&self, transaction_id: u32) -> PendingResponse<'_> {
        let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        if self.entries.lock().insert(transaction_id, tx).is_some() {
            debug!("트랜잭션 {transaction_id}: 이전 대기 항목 교체");
        }
        PendingResponse {
            transaction_id,
            rx,
            table: self,
        }
    }

    /// 응답 배달. 대기자가 없으면 false.
    pub fn deliver(&self, transaction_id: u32, envelope: Envelope) -> bool {
        let Some(tx) = self.entries.lock().get(&transaction_id).cloned() else {
            return false;
        };
        tx.try_send(envelope).is_ok()
    }

    /// 항목 제거
    pub fn remove(&self, transaction_id: u32) -> bool {
        self.entries.lock().remove(&transaction_id).is_some()
    }

    /// 해당 트랜잭션이 대기 중인지
    pub fn contains(&self, transaction_id: u32) -> bool {
        self.entries.lock().contains_key(&transaction_id)
    }

    /// 대기 중인 요청 수
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// 요청 1건의 응답 대기 핸들 — drop 시 테이블에서 제거
pub struct PendingResponse<'a> {
    transaction_id: u32,
    rx: mpsc::Receiver<Envelope>,
    table: &'a PendingRequests,
}

impl PendingResponse<'_> {
    /// 트랜잭션 ID
    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    /// 다음 응답 수신
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

impl Drop for PendingResponse<'_> {
    fn drop(&mut self) {
        self.table.remove(self.transaction_id);
    }
}
