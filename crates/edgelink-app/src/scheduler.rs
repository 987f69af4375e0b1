//! 메트릭 스케줄러.
//!
//! 등록된 핸들을 다음 실행 시각 순으로 우선순위 큐에 두고, 틱마다 실행 시각이 된
//! 핸들을 꺼내 수집 → (집계 크기 도달 시) 게시 → 성공하면 초기화 → 다음 실행
//! 시각으로 이동한 뒤 다시 넣는다. 정지된 핸들은 꺼낼 때 버린다.

use edgelink_core::models::metric::{now_millis, MetricHandle};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 틱 1회 처리 결과
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// 수집한 핸들 수
    pub collected: usize,
    /// 게시에 성공한 핸들 수
    pub published: usize,
    /// 게시에 실패한 핸들 수 (샘플 유지)
    pub failed: usize,
    /// 정지되어 제거된 핸들 수
    pub removed: usize,
}

/// 협조적 메트릭 스케줄러
pub struct MetricScheduler {
    queue: BinaryHeap<Reverse<MetricHandle>>,
    tick: Duration,
}

impl MetricScheduler {
    /// 새 스케줄러 생성
    pub fn new(tick: Duration) -> Self {
        Self {
            queue: BinaryHeap::new(),
            tick,
        }
    }

    /// 핸들 추가 (지금 시각 기준으로 시작)
    pub fn add(&mut self, mut handle: MetricHandle) {
        handle.start();
        self.push_started(handle);
    }

    /// 이미 시작된 핸들 추가
    pub fn push_started(&mut self, handle: MetricHandle) {
        debug!(
            "스케줄 등록: {} (싱크 {}, 간격 {}초)",
            handle.metric().name(),
            handle.sink_name(),
            handle.metric().interval_secs()
        );
        self.queue.push(Reverse(handle));
    }

    /// 관리 중인 핸들 수
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// 가장 빠른 다음 실행 시각
    pub fn next_due(&self) -> Option<i64> {
        self.queue.peek().map(|Reverse(h)| h.next_run_time())
    }

    /// `now_ms` 시점에 실행 시각이 된 핸들 처리
    ///
    /// 핸들마다 틱당 최대 한 번 실행된다 (간격 0인 이벤트 기반 핸들 포함).
    pub async fn run_due(&mut self, now_ms: i64) -> TickReport {
        let mut report = TickReport::default();
        let mut due = Vec::new();

        while self.queue.peek().is_some_and(|Reverse(h)| h.is_due(now_ms)) {
            let Some(Reverse(handle)) = self.queue.pop() else {
                break;
            };
            if handle.is_alive() {
                due.push(handle);
            } else {
                debug!("정지된 핸들 제거: {}", handle.metric().name());
                report.removed += 1;
            }
        }

        for mut handle in due {
            handle.collect();
            report.collected += 1;

            if handle.is_ready_to_send() {
                match handle.publish().await {
                    Ok(()) => {
                        handle.reset();
                        report.published += 1;
                    }
                    Err(e) => {
                        warn!("게시 실패 ({}), 샘플 유지: {e}", handle.metric().name());
                        report.failed += 1;
                    }
                }
            }

            handle.advance_run_time();
            self.queue.push(Reverse(handle));
        }

        report
    }

    /// 종료 신호까지 틱 루프 실행
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "메트릭 스케줄러 시작: 핸들 {}개, 틱 {}ms",
            self.len(),
            self.tick.as_millis()
        );
        let mut interval = tokio::time::interval(self.tick);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.run_due(now_millis()).await;
                    if report.removed > 0 || report.failed > 0 {
                        debug!("스케줄러 틱: {report:?}");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        for Reverse(handle) in self.queue.drain() {
            handle.stop();
        }
        info!("메트릭 스케줄러 종료");
    }
}
