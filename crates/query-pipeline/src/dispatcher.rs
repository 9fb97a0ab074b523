//! 디스패처 -- 캡처 이벤트에 필터와 스코프를 적용하고 버퍼에 적재합니다.
//!
//! 처리 순서:
//! 1. 프로토콜/포트 필터 (`network.protocols`, `network.port`)
//! 2. 형식 검사 (IP, 도메인, 레코드 타입)
//! 3. 스코프 판정 ([`ScopeResolver::is_in_scope`])
//! 4. [`QueryBuffer::push`]
//!
//! 거부된 이벤트는 조용히 버리고 `trace` 레벨로만 기록합니다.
//! 디스패처가 블록될 수 있는 곳은 버퍼 뮤텍스뿐이며, 네트워크 전송은 기다리지 않습니다.

use std::sync::Arc;

use tokio::sync::mpsc;

use dnswatch_core::metrics as m;

use crate::buffer::{PushOutcome, QueryBuffer};
use crate::capture::CaptureEvent;
use crate::scope::ScopeResolver;
use crate::stats::PipelineStats;

/// 이벤트 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 버퍼에 적재됨
    Accepted,
    /// 프로토콜/포트 필터로 버림
    Filtered,
    /// 스코프 밖이라 버림
    OutOfScope,
    /// 형식 오류로 버림
    Malformed,
}

/// 캡처 이벤트 디스패처
pub struct Dispatcher {
    resolver: Arc<ScopeResolver>,
    buffer: Arc<QueryBuffer>,
    protocols: Vec<String>,
    port: u16,
    stats: Arc<PipelineStats>,
}

impl Dispatcher {
    /// 새 디스패처를 생성합니다.
    ///
    /// `protocols`는 소문자로 정규화된 목록이어야 합니다.
    pub fn new(
        resolver: Arc<ScopeResolver>,
        buffer: Arc<QueryBuffer>,
        protocols: Vec<String>,
        port: u16,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            resolver,
            buffer,
            protocols,
            port,
            stats,
        }
    }

    fn passes_filter(&self, event: &CaptureEvent) -> bool {
        if let Some(protocol) = &event.protocol {
            let accepted = self
                .protocols
                .iter()
                .any(|p| p.eq_ignore_ascii_case(protocol));
            if !accepted {
                return false;
            }
        }
        event.port.is_none_or(|port| port == self.port)
    }

    /// 이벤트 하나를 처리합니다.
    pub fn dispatch(&self, event: CaptureEvent) -> DispatchOutcome {
        if !self.passes_filter(&event) {
            tracing::trace!(
                protocol = ?event.protocol,
                port = ?event.port,
                "query filtered by protocol/port"
            );
            PipelineStats::incr(&self.stats.filtered);
            metrics::counter!(m::QUERIES_FILTERED_TOTAL).increment(1);
            return DispatchOutcome::Filtered;
        }

        let raw_ip = event.source_ip.clone();
        let Some(query) = event.into_query() else {
            tracing::trace!(source_ip = %raw_ip, "discarding malformed capture event");
            PipelineStats::incr(&self.stats.malformed);
            metrics::counter!(m::CAPTURE_MALFORMED_TOTAL).increment(1);
            return DispatchOutcome::Malformed;
        };

        if !self.resolver.is_in_scope(query.source_ip(), query.fqdn()) {
            tracing::trace!(
                source_ip = %query.source_ip(),
                fqdn = query.fqdn(),
                "query out of scope"
            );
            PipelineStats::incr(&self.stats.out_of_scope);
            metrics::counter!(m::QUERIES_OUT_OF_SCOPE_TOTAL).increment(1);
            return DispatchOutcome::OutOfScope;
        }

        if self.buffer.push(query) == PushOutcome::Full {
            tracing::debug!(capacity = self.buffer.capacity(), "query buffer reached capacity");
        }
        PipelineStats::incr(&self.stats.accepted);
        metrics::counter!(m::QUERIES_ACCEPTED_TOTAL).increment(1);
        metrics::gauge!(m::QUERIES_BUFFERED).increment(1.0);
        DispatchOutcome::Accepted
    }

    /// 채널이 닫힐 때까지 이벤트를 처리합니다.
    ///
    /// 모든 캡처 소스가 종료되면 채널이 닫히고 루프가 끝납니다.
    pub async fn run(self, mut rx: mpsc::Receiver<CaptureEvent>) {
        tracing::debug!("dispatcher started");
        let mut processed = 0u64;
        while let Some(event) = rx.recv().await {
            self.dispatch(event);
            processed += 1;
        }
        tracing::debug!(processed, "dispatcher stopped");
    }
}
