//! 드레인 공통 요소.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// 드레인 진행 플래그 — 스코프를 벗어나면 (에러 경로 포함) 내려간다
pub(crate) struct DrainFlag<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainFlag<'a> {
    pub(crate) fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self { flag }
    }
}

impl Drop for DrainFlag<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 드레인 속도 조절 설정
#[derive(Debug, Clone)]
pub(crate) struct DrainPacing {
    /// 이 개수만큼 전송할 때마다 쉬어감
    pub(crate) batch_size: usize,
    /// 배치 사이 대기 시간
    pub(crate) interval: Duration,
}

impl DrainPacing {
    /// `sent`건 전송 직후 쉬어야 하는지
    pub(crate) fn should_pause(&self, sent: usize) -> bool {
        sent > 0 && sent % self.batch_size == 0 && !self.interval.is_zero()
    }
}

/// 종료 신호가 발생했는지 (수신기가 없으면 false)
pub(crate) fn shutdown_requested(shutdown_rx: &Option<watch::Receiver<bool>>) -> bool {
    shutdown_rx.as_ref().is_some_and(|rx| *rx.borrow())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_drops_on_scope_exit() {
        let flag = AtomicBool::new(false);
        {
            let _guard = DrainFlag::raise(&flag);
            assert!(flag.load(Ordering::Acquire));
        }
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn pause_every_batch() {
        let pacing = DrainPacing {
            batch_size: 2,
            interval: Duration::from_millis(5),
        };
        assert!(!pacing.should_pause(1));
        assert!(pacing.should_pause(2));
        assert!(!pacing.should_pause(3));
        assert!(pacing.should_pause(4));
    }

    #[test]
    fn shutdown_signal_read() {
        let (tx, rx) = watch::channel(false);
        let rx = Some(rx);
        assert!(!shutdown_requested(&rx));
        tx.send(true).unwrap();
        assert!(shutdown_requested(&rx));
        assert!(!shutdown_requested(&None));
    }
}
