//! dnswatch 공통 크레이트
//!
//! 에이전트의 모든 크레이트가 공유하는 타입, trait, 에러, 설정을 제공합니다.
//!
//! - [`types`]: `Query`, `QueryBatch`, `Cursor`, `ScoredEvent`
//! - [`client`]: 원격 스코어링 서비스 추상화 [`ScoringClient`]
//! - [`pipeline`]: 모듈 생명주기 trait [`Pipeline`] / [`DynPipeline`]
//! - [`config`]: `dnswatch.toml` 설정 [`DnswatchConfig`]
//! - [`error`]: 에러 계층 [`DnswatchError`]
//! - [`metrics`]: Prometheus 메트릭 이름 상수

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ClientError, ConfigError, DnswatchError, PipelineError, StorageError};

// 설정
pub use config::DnswatchConfig;

// 클라이언트 trait
pub use client::ScoringClient;

// 파이프라인 trait
pub use pipeline::{DynPipeline, HealthStatus, Pipeline};

// 도메인 타입
pub use types::{Cursor, EventPage, Query, QueryBatch, ScoredEvent};
