//! 파이프라인 통계 카운터
//!
//! 여러 태스크가 `Arc<PipelineStats>`를 공유하며 원자적으로 갱신합니다.
//! Prometheus 메트릭과 별도로, 헬스 체크와 테스트가 읽을 수 있는 값입니다.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 공유 통계 카운터
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// 캡처 소스가 전달한 이벤트 수
    pub captured: AtomicU64,
    /// 형식 오류로 버린 이벤트 수
    pub malformed: AtomicU64,
    /// 프로토콜/포트 필터로 버린 질의 수
    pub filtered: AtomicU64,
    /// 스코프 밖 질의 수
    pub out_of_scope: AtomicU64,
    /// 버퍼에 적재된 질의 수
    pub accepted: AtomicU64,
    /// flush 사이클 수
    pub flushes: AtomicU64,
    /// 전송 성공 배치 수
    pub batches_sent: AtomicU64,
    /// 전송 실패 배치 수
    pub batches_failed: AtomicU64,
    /// 전송 완료 질의 수
    pub queries_sent: AtomicU64,
    /// 실패 저장소에 보관된 질의 수
    pub queries_stored: AtomicU64,
    /// 유실된 질의 수
    pub queries_dropped: AtomicU64,
    /// 디스크에 대기 중인 실패 배치 수
    pub pending_batches: AtomicU64,
    /// 수신한 알림 수
    pub events_polled: AtomicU64,
    /// 폴링 실패 수
    pub poll_errors: AtomicU64,
}

/// 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub captured: u64,
    pub malformed: u64,
    pub filtered: u64,
    pub out_of_scope: u64,
    pub accepted: u64,
    pub flushes: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub queries_sent: u64,
    pub queries_stored: u64,
    pub queries_dropped: u64,
    pub pending_batches: u64,
    pub events_polled: u64,
    pub poll_errors: u64,
}

impl PipelineStats {
    /// 카운터를 1 증가시킵니다.
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 카운터를 `n`만큼 증가시킵니다.
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// 게이지 값을 설정합니다.
    pub(crate) fn set(gauge: &AtomicU64, n: usize) {
        gauge.store(n as u64, Ordering::Relaxed);
    }

    /// 현재 값을 읽어 스냅샷을 만듭니다.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            captured: load(&self.captured),
            malformed: load(&self.malformed),
            filtered: load(&self.filtered),
            out_of_scope: load(&self.out_of_scope),
            accepted: load(&self.accepted),
            flushes: load(&self.flushes),
            batches_sent: load(&self.batches_sent),
            batches_failed: load(&self.batches_failed),
            queries_sent: load(&self.queries_sent),
            queries_stored: load(&self.queries_stored),
            queries_dropped: load(&self.queries_dropped),
            pending_batches: load(&self.pending_batches),
            events_polled: load(&self.events_polled),
            poll_errors: load(&self.poll_errors),
        }
    }
}
