//! dnswatch 질의 파이프라인
//!
//! DNS 질의를 모니터링 스코프로 거르고, 배치로 모아 원격 스코어링 서비스에
//! 전송하며, 실패한 배치는 디스크에 보관했다가 다시 보냅니다.
//! 별도 타이머로 같은 서비스에서 알림을 가져와 출력합니다.
//!
//! # 모듈 구성
//!
//! - [`scope`]: 스코프 판정 엔진과 YAML 로더
//! - [`capture`]: 캡처 소스 (파일 재생, UDP 피드)
//! - [`dispatcher`]: 필터/스코프 적용 후 버퍼 적재
//! - [`buffer`]: 스왑 가능한 공유 질의 버퍼
//! - [`flusher`]: 배치 전송, 실패 보관, 재전송
//! - [`store`]: 실패 배치 저장소 (추가 전용 바이너리 로그)
//! - [`poller`]: 알림 폴링과 커서 관리
//! - [`sink`]: 알림 출력 대상
//! - [`pipeline`]: 전체 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정에서 파생)
//! - [`stats`]: 공유 통계 카운터
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Replay/Feed -> Dispatcher -> QueryBuffer -> Flusher -> ScoringClient
//!                    |                          |
//!              ScopeResolver            FailedQueryStore
//!
//! EventPoller -> ScoringClient -> EventSink
//! ```

pub mod buffer;
pub mod capture;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod flusher;
pub mod pipeline;
pub mod poller;
pub mod scope;
pub mod sink;
pub mod stats;
pub mod store;

#[cfg(test)]
mod testing;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{QueryPipeline, QueryPipelineBuilder};

// 설정
pub use config::PipelineConfig;

// 에러
pub use error::QueryPipelineError;

// 스코프
pub use scope::{DomainPattern, Group, IpNetwork, ScopeLoader, ScopeResolver};

// 캡처
pub use capture::{CaptureEvent, CaptureExit};

// 버퍼 / 전송
pub use buffer::QueryBuffer;
pub use flusher::{FlushTrigger, Flusher};
pub use store::{FailedBatch, FailedQueryStore};

// 알림
pub use poller::EventPoller;
pub use sink::EventSink;

// 통계
pub use stats::{PipelineStats, StatsSnapshot};
