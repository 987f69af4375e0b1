//! 버퍼 테스트용 전송/연결 상태 대역.

use async_trait::async_trait;
use edgelink_core::error::CoreError;
use edgelink_core::ports::connectivity::Connectivity;
use edgelink_core::ports::transport::Transport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

type SendHook = Box<dyn Fn() + Send + Sync>;

/// 보낸 메시지를 기록하는 전송
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    fail_remaining: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    on_send: Mutex<Option<SendHook>>,
}

impl RecordingTransport {
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub(crate) fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// 다음 `n`번의 전송을 실패시킴
    pub(crate) fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// 전송 성공 직후 실행할 훅
    pub(crate) fn on_send(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_send.lock() = Some(Box::new(hook));
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "RecordingTransport"
    }

    async fn send(&self, message: &str) -> Result<(), CoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CoreError::Network("전송 실패 (테스트)".to_string()));
        }

        self.sent.lock().push(message.to_string());
        if let Some(hook) = self.on_send.lock().as_ref() {
            hook();
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Option<String>, CoreError> {
        Ok(None)
    }
}

/// 테스트에서 직접 켜고 끄는 연결 상태
pub(crate) struct ToggleConnectivity {
    reachable: AtomicBool,
}

impl ToggleConnectivity {
    pub(crate) fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub(crate) fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

impl Connectivity for ToggleConnectivity {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
