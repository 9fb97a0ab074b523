//! 파이프라인 오케스트레이션 -- 캡처/디스패치/flush/폴링 태스크의 생명주기를 관리합니다.
//!
//! [`QueryPipeline`]은 core의 [`Pipeline`] trait을 구현하여
//! `dnswatch-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! CaptureSources -> mpsc -> Dispatcher -> QueryBuffer -> Flusher -> ScoringClient
//!                                                           |  ^
//!                                                           v  |
//!                                                    FailedQueryStore
//! EventPoller (독립 타이머) -> ScoringClient -> EventSink
//! ```
//!
//! # 종료 순서
//! 1. 캡처 취소: 소스가 멈추고 채널이 닫히면 디스패처가 남은 이벤트를 비운 뒤 종료
//! 2. 전달 취소: flusher는 마지막 flush를, 폴러는 진행 중 요청을 정리
//!
//! 캡처를 먼저 멈추므로 마지막 flush 이후 버퍼에 들어오는 질의는 없습니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dnswatch_core::client::ScoringClient;
use dnswatch_core::error::{DnswatchError, PipelineError};
use dnswatch_core::pipeline::{HealthStatus, Pipeline};

use crate::buffer::QueryBuffer;
use crate::capture::{CaptureExit, CaptureSource, FeedSource, ReplaySource, spawn_sources};
use crate::config::PipelineConfig;
use crate::dispatcher::Dispatcher;
use crate::error::QueryPipelineError;
use crate::flusher::Flusher;
use crate::poller::EventPoller;
use crate::scope::{ScopeLoader, ScopeResolver};
use crate::sink::EventSink;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::store::FailedQueryStore;

/// 캡처 태스크 종료 대기 한도
const CAPTURE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// 버퍼 사용률 경고 임계값
const BUFFER_DEGRADED_RATIO: f64 = 0.9;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 질의 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use dnswatch_query_pipeline::QueryPipelineBuilder;
///
/// let (mut pipeline, exit_rx) = QueryPipelineBuilder::new(client)
///     .config(config)
///     .scope(resolver)
///     .build()?;
///
/// pipeline.start().await?;
/// ```
pub struct QueryPipeline<C> {
    config: PipelineConfig,
    state: PipelineState,
    client: Arc<C>,
    resolver: Arc<ScopeResolver>,
    buffer: Arc<QueryBuffer>,
    stats: Arc<PipelineStats>,
    exit_tx: Option<mpsc::Sender<CaptureExit>>,
    capture_cancel: CancellationToken,
    delivery_cancel: CancellationToken,
    capture_tasks: Vec<JoinHandle<()>>,
    delivery_tasks: Vec<JoinHandle<()>>,
}

impl<C: ScoringClient> QueryPipeline<C> {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 통계 스냅샷을 반환합니다.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 버퍼 사용률을 반환합니다.
    pub fn buffer_utilization(&self) -> f64 {
        self.buffer.utilization()
    }

    /// 스코프 판정기
    pub fn scope(&self) -> &ScopeResolver {
        &self.resolver
    }

    /// 파이프라인 설정
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn build_sources(&self) -> Result<Vec<CaptureSource>, QueryPipelineError> {
        let mut sources = Vec::new();
        if self.config.live {
            let feed = FeedSource::bind(
                &self.config.interface,
                &self.config.feed_bind,
                &self.config.sysfs_net,
            )
            .await?;
            sources.push(CaptureSource::Feed(feed));
        }
        if !self.config.replay_files.is_empty() {
            sources.push(CaptureSource::Replay(ReplaySource::new(
                self.config.replay_files.clone(),
            )));
        }
        Ok(sources)
    }

    async fn open_store(&self) -> Result<FailedQueryStore, QueryPipelineError> {
        match &self.config.failed_file {
            Some(path) => Ok(FailedQueryStore::open(path).await?),
            None => {
                tracing::warn!("no failed query store configured, undelivered batches will be dropped");
                Ok(FailedQueryStore::disabled())
            }
        }
    }
}

async fn join_all(tasks: Vec<JoinHandle<()>>, limit: Duration, group: &str) {
    for mut task in tasks {
        match tokio::time::timeout(limit, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(group, error = %e, "task terminated abnormally"),
            Err(_) => {
                tracing::warn!(group, limit_secs = limit.as_secs(), "task did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

impl<C: ScoringClient> Pipeline for QueryPipeline<C> {
    async fn start(&mut self) -> Result<(), DnswatchError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        tracing::info!(
            groups = self.resolver.len(),
            buffer_size = self.config.buffer_size,
            "starting query pipeline"
        );

        // 1. 실패 가능한 준비 작업 (저장소, 소켓 바인드)
        let store = self.open_store().await?;
        let sources = self.build_sources().await?;

        self.capture_cancel = CancellationToken::new();
        self.delivery_cancel = CancellationToken::new();

        // 2. 디스패처 + 캡처 소스
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.resolver),
            Arc::clone(&self.buffer),
            self.config.protocols.clone(),
            self.config.port,
            Arc::clone(&self.stats),
        );
        self.capture_tasks.push(tokio::spawn(dispatcher.run(rx)));
        self.capture_tasks.push(spawn_sources(
            sources,
            tx,
            Arc::clone(&self.stats),
            self.capture_cancel.clone(),
            self.exit_tx.clone(),
        ));

        // 3. flusher
        let flusher = Flusher::new(
            Arc::clone(&self.client),
            Arc::clone(&self.buffer),
            store,
            &self.config,
            Arc::clone(&self.stats),
        );
        self.delivery_tasks
            .push(tokio::spawn(flusher.run(self.delivery_cancel.clone())));

        // 4. 알림 폴러
        if let Some(target) = &self.config.events_target {
            let poller = EventPoller::new(
                Arc::clone(&self.client),
                EventSink::from_target(target),
                self.config.poll_interval,
                self.config.cursor_file.clone(),
                Arc::clone(&self.stats),
            )
            .await;
            self.delivery_tasks
                .push(tokio::spawn(poller.run(self.delivery_cancel.clone())));
        } else {
            tracing::info!("event polling disabled");
        }

        self.state = PipelineState::Running;
        tracing::info!("query pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DnswatchError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping query pipeline");

        // 1. 캡처 중단, 디스패처가 채널을 비울 때까지 대기
        self.capture_cancel.cancel();
        join_all(
            std::mem::take(&mut self.capture_tasks),
            CAPTURE_STOP_TIMEOUT,
            "capture",
        )
        .await;

        // 2. 마지막 flush 및 폴러 정리
        // flusher는 취소 시점부터 shutdown_grace 안에 끝나며, 남는 시간은 디스크 쓰기 몫
        self.delivery_cancel.cancel();
        let limit = self.config.shutdown_grace + self.config.send_timeout;
        join_all(std::mem::take(&mut self.delivery_tasks), limit, "delivery").await;

        self.state = PipelineState::Stopped;
        let stats = self.stats.snapshot();
        tracing::info!(
            accepted = stats.accepted,
            sent = stats.queries_sent,
            stored = stats.queries_stored,
            dropped = stats.queries_dropped,
            "query pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let utilization = self.buffer.utilization();
                let pending = self.stats.snapshot().pending_batches;
                if utilization > BUFFER_DEGRADED_RATIO {
                    HealthStatus::Degraded(format!(
                        "buffer utilization high: {:.1}%",
                        utilization * 100.0
                    ))
                } else if pending > 0 {
                    HealthStatus::Degraded(format!("{pending} failed batches pending resend"))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 질의 파이프라인 빌더
pub struct QueryPipelineBuilder<C> {
    client: Arc<C>,
    config: PipelineConfig,
    scope: Option<ScopeResolver>,
    exit_tx: Option<mpsc::Sender<CaptureExit>>,
}

impl<C: ScoringClient> QueryPipelineBuilder<C> {
    /// 새 빌더를 생성합니다.
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            config: PipelineConfig::default(),
            scope: None,
            exit_tx: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 스코프를 지정합니다. 지정하지 않으면 내장 기본 스코프를 사용합니다.
    pub fn scope(mut self, scope: ScopeResolver) -> Self {
        self.scope = Some(scope);
        self
    }

    /// 외부 캡처 종료 보고 채널을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 새 채널을 생성합니다.
    pub fn capture_exit_sender(mut self, tx: mpsc::Sender<CaptureExit>) -> Self {
        self.exit_tx = Some(tx);
        self
    }

    /// 파이프라인을 빌드합니다.
    ///
    /// # Returns
    /// - `QueryPipeline`: 파이프라인 인스턴스
    /// - `Option<mpsc::Receiver<CaptureExit>>`: 캡처 종료 보고 수신 채널
    ///   (외부 sender를 설정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(QueryPipeline<C>, Option<mpsc::Receiver<CaptureExit>>), QueryPipelineError> {
        self.config.validate()?;

        let resolver = match self.scope {
            Some(scope) => scope,
            None => ScopeLoader::default_scope()?,
        };

        let (exit_tx, exit_rx) = match self.exit_tx {
            Some(tx) => (tx, None),
            None => {
                let (tx, rx) = mpsc::channel(1);
                (tx, Some(rx))
            }
        };

        let pipeline = QueryPipeline {
            buffer: Arc::new(QueryBuffer::new(self.config.buffer_size)),
            config: self.config,
            state: PipelineState::Initialized,
            client: self.client,
            resolver: Arc::new(resolver),
            stats: Arc::new(PipelineStats::default()),
            exit_tx: Some(exit_tx),
            capture_cancel: CancellationToken::new(),
            delivery_cancel: CancellationToken::new(),
            capture_tasks: Vec::new(),
            delivery_tasks: Vec::new(),
        };

        Ok((pipeline, exit_rx))
    }
}
