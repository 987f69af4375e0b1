//! 연결 상태 포트.

/// 마지막으로 관측된 도달 가능성
///
/// 구현체는 호출자를 블로킹하지 않는다. 값은 최대 프로브 간격만큼 늦을 수 있다.
pub trait Connectivity: Send + Sync {
    /// 기준 호스트에 도달 가능한지
    fn is_reachable(&self) -> bool;
}
