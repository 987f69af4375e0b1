//! 메트릭 모델과 스케줄링 계약.
//!
//! [`Metric`]은 생성 후 불변인 설정이고, [`MetricHandle`]은 싱크에 등록될 때마다
//! 하나씩 생기는 가변 상태(샘플 FIFO, 집계 카운트, 다음 실행 시각, 생존 플래그)다.
//!
//! 스케줄러는 외부에 있다. 핸들은 `next_run_time` 기준 전순서를 제공하므로
//! 외부 스케줄러가 우선순위 큐로 관리할 수 있다.
//! 샘플 FIFO와 집계 카운트는 게시 성공 후 호출자가 [`MetricHandle::reset`]을
//! 직접 호출할 때만 초기화된다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;
use crate::models::resource::ResourceRef;
use crate::ports::sink::TelemetrySink;

/// 단일 샘플
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// 측정 시각
    pub timestamp: DateTime<Utc>,
    /// 측정값
    pub value: f64,
}

/// 샘플링 함수 반환값
///
/// 여러 쌍, 단일 쌍, 시각 없는 값 세 가지를 모두 받는다.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutput {
    /// `(timestamp, value)` 목록
    Batch(Vec<(DateTime<Utc>, f64)>),
    /// 단일 `(timestamp, value)`
    Single(DateTime<Utc>, f64),
    /// 시각 없는 값 — 현재 시각으로 찍힌다
    Value(f64),
    /// 샘플 없음 (에러 아님)
    Empty,
}

impl From<f64> for SampleOutput {
    fn from(value: f64) -> Self {
        SampleOutput::Value(value)
    }
}

impl From<(DateTime<Utc>, f64)> for SampleOutput {
    fn from((timestamp, value): (DateTime<Utc>, f64)) -> Self {
        SampleOutput::Single(timestamp, value)
    }
}

impl From<Vec<(DateTime<Utc>, f64)>> for SampleOutput {
    fn from(pairs: Vec<(DateTime<Utc>, f64)>) -> Self {
        SampleOutput::Batch(pairs)
    }
}

impl<T: Into<SampleOutput>> From<Option<T>> for SampleOutput {
    fn from(value: Option<T>) -> Self {
        value.map_or(SampleOutput::Empty, Into::into)
    }
}

/// 샘플링 함수
pub type Sampler = Arc<dyn Fn() -> SampleOutput + Send + Sync>;

/// 메트릭 정의 (생성 후 불변)
#[derive(Clone)]
pub struct Metric {
    name: String,
    unit: String,
    interval_secs: u64,
    aggregation_size: usize,
    sampler: Sampler,
}

impl Metric {
    /// 새 메트릭 생성
    ///
    /// `interval_secs == 0`이면 이벤트 기반 — 집계 크기에 도달하는 즉시 게시.
    /// `aggregation_size`가 0이거나 이름이 비어 있으면 설정 에러.
    pub fn new<F, O>(
        name: impl Into<String>,
        unit: impl Into<String>,
        interval_secs: u64,
        aggregation_size: usize,
        sampler: F,
    ) -> Result<Self, CoreError>
    where
        F: Fn() -> O + Send + Sync + 'static,
        O: Into<SampleOutput>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::Validation {
                field: "metric.name".to_string(),
                message: "비어 있음".to_string(),
            });
        }
        if aggregation_size == 0 {
            return Err(CoreError::Validation {
                field: "metric.aggregation_size".to_string(),
                message: format!("'{name}': 1 이상이어야 함"),
            });
        }

        Ok(Self {
            name,
            unit: unit.into(),
            interval_secs,
            aggregation_size,
            sampler: Arc::new(move || sampler().into()),
        })
    }

    /// 메트릭 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 단위
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// 샘플링 간격 (초)
    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// 샘플링 간격
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// 집계 크기 (1 이상)
    pub fn aggregation_size(&self) -> usize {
        self.aggregation_size
    }

    /// 이벤트 기반 메트릭인지 (`interval == 0`)
    pub fn is_event_driven(&self) -> bool {
        self.interval_secs == 0
    }

    /// 샘플링 함수 호출
    pub fn sample(&self) -> SampleOutput {
        (self.sampler)()
    }
}

impl std::fmt::Debug for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metric")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("interval_secs", &self.interval_secs)
            .field("aggregation_size", &self.aggregation_size)
            .finish_non_exhaustive()
    }
}

/// 현재 시각 (epoch 밀리초)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 다른 태스크에서 핸들을 정지시키는 제어기
#[derive(Debug, Clone)]
pub struct HandleStopper {
    alive: Arc<AtomicBool>,
}

impl HandleStopper {
    /// 핸들 정지 (협조적 — 스케줄러가 다음 패스에서 제거)
    pub fn stop(&self) {
        self.alive.store(false, AtomicOrdering::Release);
    }

    /// 핸들이 아직 살아 있는지
    pub fn is_alive(&self) -> bool {
        self.alive.load(AtomicOrdering::Acquire)
    }
}

/// 등록된 메트릭 핸들 — 외부 스케줄러가 collect/publish를 구동한다
pub struct MetricHandle {
    metric: Metric,
    sink: Arc<dyn TelemetrySink>,
    parent: Option<ResourceRef>,
    resource_id: Option<String>,
    samples: VecDeque<Sample>,
    aggregation_count: usize,
    next_run_time: i64,
    alive: Arc<AtomicBool>,
}

impl MetricHandle {
    /// 새 핸들 생성 (싱크 등록 시 호출)
    pub fn new(
        metric: Metric,
        sink: Arc<dyn TelemetrySink>,
        parent: Option<ResourceRef>,
        resource_id: Option<String>,
    ) -> Self {
        Self {
            metric,
            sink,
            parent,
            resource_id,
            samples: VecDeque::new(),
            aggregation_count: 0,
            next_run_time: 0,
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 시작 — 생존 표시, `next_run_time = now + interval`
    pub fn start(&mut self) {
        self.start_at(now_millis());
    }

    /// 지정 시각 기준 시작
    pub fn start_at(&mut self, now_ms: i64) {
        self.alive.store(true, AtomicOrdering::Release);
        self.next_run_time = now_ms + self.interval_millis();
    }

    /// 정지 (협조적)
    pub fn stop(&self) {
        self.alive.store(false, AtomicOrdering::Release);
    }

    /// 다른 태스크용 정지 제어기
    pub fn stopper(&self) -> HandleStopper {
        HandleStopper {
            alive: Arc::clone(&self.alive),
        }
    }

    /// 생존 여부
    pub fn is_alive(&self) -> bool {
        self.alive.load(AtomicOrdering::Acquire)
    }

    /// 샘플 수집
    ///
    /// 추가된 샘플 수를 반환하고 그만큼 집계 카운트를 올린다.
    pub fn collect(&mut self) -> usize {
        let added: Vec<Sample> = match self.metric.sample() {
            SampleOutput::Batch(pairs) => pairs
                .into_iter()
                .map(|(timestamp, value)| Sample { timestamp, value })
                .collect(),
            SampleOutput::Single(timestamp, value) => vec![Sample { timestamp, value }],
            SampleOutput::Value(value) => vec![Sample {
                timestamp: Utc::now(),
                value,
            }],
            SampleOutput::Empty => Vec::new(),
        };

        let count = added.len();
        self.samples.extend(added);
        self.aggregation_count += count;
        count
    }

    /// 집계 크기에 도달했는지
    pub fn is_ready_to_send(&self) -> bool {
        self.aggregation_count >= self.metric.aggregation_size()
    }

    /// 고정 주기로 다음 실행 시각 이동 (now 기준으로 다시 계산하지 않음)
    pub fn advance_run_time(&mut self) {
        self.next_run_time += self.interval_millis();
    }

    /// 실행 시각이 되었는지
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.next_run_time <= now_ms
    }

    /// 다음 실행 시각 (epoch 밀리초)
    pub fn next_run_time(&self) -> i64 {
        self.next_run_time
    }

    /// 현재 배치를 싱크로 게시 (FIFO/카운트는 그대로)
    pub async fn publish(&self) -> Result<(), CoreError> {
        let sink = Arc::clone(&self.sink);
        sink.publish(self).await
    }

    /// 게시 후 호출자가 명시적으로 FIFO와 집계 카운트 초기화
    pub fn reset(&mut self) {
        self.samples.clear();
        self.aggregation_count = 0;
    }

    /// 대기 중인 샘플 (수집 순서)
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// 대기 중인 샘플 수
    pub fn pending_samples(&self) -> usize {
        self.samples.len()
    }

    /// 누적 집계 카운트
    pub fn aggregation_count(&self) -> usize {
        self.aggregation_count
    }

    /// 메트릭 정의
    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    /// 부모 리소스
    pub fn parent(&self) -> Option<&ResourceRef> {
        self.parent.as_ref()
    }

    /// 싱크가 할당한 리소스 ID
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// 게시 대상 싱크 이름
    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    fn interval_millis(&self) -> i64 {
        self.metric.interval_secs() as i64 * 1_000
    }
}

impl std::fmt::Debug for MetricHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricHandle")
            .field("metric", &self.metric)
            .field("sink", &self.sink.name())
            .field("resource_id", &self.resource_id)
            .field("aggregation_count", &self.aggregation_count)
            .field("next_run_time", &self.next_run_time)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl PartialEq for MetricHandle {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MetricHandle {}

impl PartialOrd for MetricHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetricHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        // 실행 시각이 빠른 것이 작다, 같으면 이름순
        self.next_run_time
            .cmp(&other.next_run_time)
            .then_with(|| self.metric.name().cmp(other.metric.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    /// 게시 횟수만 세는 싱크
    #[derive(Default)]
    struct CountingSink {
        published: AtomicUsize,
    }

    #[async_trait]
    impl TelemetrySink for CountingSink {
        fn name(&self) -> &str {
            "CountingSink"
        }

        fn format_data(&self, handle: &MetricHandle) -> Result<Option<String>, CoreError> {
            Ok((handle.pending_samples() > 0).then(|| "payload".to_string()))
        }

        async fn publish(&self, _handle: &MetricHandle) -> Result<(), CoreError> {
            self.published.fetch_add(1, AtomicOrdering::Relaxed);
            Ok(())
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn handle_for(metric: Metric) -> MetricHandle {
        MetricHandle::new(metric, Arc::new(CountingSink::default()), None, None)
    }

    #[test]
    fn zero_aggregation_size_rejected() {
        let result = Metric::new("cpu", "%", 5, 0, || 1.0);
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn ready_exactly_at_aggregation_size() {
        let metric = Metric::new("cpu", "%", 5, 3, || 42.0).unwrap();
        let mut handle = handle_for(metric);

        handle.collect();
        assert!(!handle.is_ready_to_send());
        handle.collect();
        assert!(!handle.is_ready_to_send());
        handle.collect();
        assert!(handle.is_ready_to_send());

        // 명시적으로 초기화하기 전까지 계속 true
        handle.collect();
        assert!(handle.is_ready_to_send());
        assert_eq!(handle.aggregation_count(), 4);

        handle.reset();
        assert!(!handle.is_ready_to_send());
        assert_eq!(handle.pending_samples(), 0);
    }

    #[test]
    fn batch_collect_preserves_order() {
        let metric = Metric::new("temp", "C", 5, 10, || {
            vec![(ts(1), 20.0), (ts(2), 21.0), (ts(3), 22.0)]
        })
        .unwrap();
        let mut handle = handle_for(metric);

        assert_eq!(handle.collect(), 3);
        assert_eq!(handle.aggregation_count(), 3);

        let values: Vec<f64> = handle.samples().map(|s| s.value).collect();
        assert_eq!(values, vec![20.0, 21.0, 22.0]);
        let stamps: Vec<i64> = handle.samples().map(|s| s.timestamp.timestamp()).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
    }

    #[test]
    fn single_pair_and_bare_value() {
        let pair = Metric::new("a", "", 1, 1, || (ts(100), 1.5)).unwrap();
        let mut handle = handle_for(pair);
        assert_eq!(handle.collect(), 1);
        assert_eq!(handle.samples().next().unwrap().timestamp, ts(100));

        let bare = Metric::new("b", "", 1, 1, || 7.0).unwrap();
        let mut handle = handle_for(bare);
        let before = Utc::now();
        handle.collect();
        let sample = handle.samples().next().unwrap();
        assert_eq!(sample.value, 7.0);
        assert!(sample.timestamp >= before);
    }

    #[test]
    fn empty_output_is_ignored() {
        let metric = Metric::new("none", "", 1, 1, || Option::<f64>::None).unwrap();
        let mut handle = handle_for(metric);

        assert_eq!(handle.collect(), 0);
        assert_eq!(handle.aggregation_count(), 0);
        assert!(!handle.is_ready_to_send());
    }

    #[test]
    fn start_and_fixed_rate_advance() {
        let metric = Metric::new("cpu", "%", 5, 1, || 1.0).unwrap();
        let mut handle = handle_for(metric);

        handle.start_at(1_000);
        assert!(handle.is_alive());
        assert_eq!(handle.next_run_time(), 6_000);
        assert!(!handle.is_due(5_999));
        assert!(handle.is_due(6_000));

        // 늦게 실행되어도 고정 주기로만 이동
        handle.advance_run_time();
        handle.advance_run_time();
        assert_eq!(handle.next_run_time(), 16_000);
    }

    #[test]
    fn stopper_stops_from_elsewhere() {
        let metric = Metric::new("cpu", "%", 5, 1, || 1.0).unwrap();
        let mut handle = handle_for(metric);
        handle.start_at(0);

        let stopper = handle.stopper();
        std::thread::spawn(move || stopper.stop()).join().unwrap();
        assert!(!handle.is_alive());
    }

    #[test]
    fn handles_order_by_next_run_time() {
        let mut early = handle_for(Metric::new("z", "", 1, 1, || 1.0).unwrap());
        let mut late = handle_for(Metric::new("a", "", 10, 1, || 1.0).unwrap());
        early.start_at(0);
        late.start_at(0);

        assert!(early < late);

        let mut heap = std::collections::BinaryHeap::new();
        heap.push(std::cmp::Reverse(late));
        heap.push(std::cmp::Reverse(early));
        let first = heap.pop().unwrap().0;
        assert_eq!(first.metric().name(), "z");
    }

    #[tokio::test]
    async fn publish_does_not_reset() {
        let sink = Arc::new(CountingSink::default());
        let metric = Metric::new("cpu", "%", 5, 1, || 1.0).unwrap();
        let mut handle = MetricHandle::new(metric, sink.clone(), None, Some("u-1".into()));

        handle.collect();
        handle.publish().await.unwrap();

        assert_eq!(sink.published.load(AtomicOrdering::Relaxed), 1);
        assert_eq!(handle.aggregation_count(), 1);
        assert_eq!(handle.pending_samples(), 1);
        assert_eq!(handle.resource_id(), Some("u-1"));
    }
}
