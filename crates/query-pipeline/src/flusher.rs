//! Flusher -- 버퍼를 비워 원격 서비스로 전송하고, 실패한 배치를 보관/재전송합니다.
//!
//! # flush 사이클
//! 1. 활성 버퍼를 스왑하여 새 배치를 얻음
//! 2. 실패 저장소의 배치를 오래된 순서대로 재전송 (성공한 배치만 제거)
//! 3. 새 배치 전송, 실패하면 저장소에 추가
//!
//! # 트리거
//! 버퍼 용량 도달 신호와 `flush_interval` 타이머 중 먼저 발생한 쪽이 flush를
//! 실행하며, flush가 끝나면 타이머는 다시 시작됩니다.
//!
//! # 종료
//! 진행 중인 전송은 취소 즉시 중단되고, 보내지 못한 새 배치는 마지막 flush로
//! 넘어갑니다. 마지막 flush는 취소 시점부터 `shutdown_grace` 안에서 끝나며,
//! 남은 질의를 먼저 저장소에 추가한 뒤 오래된 순서대로 재전송합니다.
//! 따라서 태스크가 도중에 중단되어도 질의는 디스크에 남습니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use dnswatch_core::client::ScoringClient;
use dnswatch_core::error::ClientError;
use dnswatch_core::metrics as m;
use dnswatch_core::types::QueryBatch;

use crate::buffer::QueryBuffer;
use crate::config::PipelineConfig;
use crate::stats::PipelineStats;
use crate::store::{FailedBatch, FailedQueryStore};

/// flush 트리거
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// 버퍼 용량 도달
    Size,
    /// 타이머 만료
    Timer,
    /// 종료 시 마지막 flush
    Shutdown,
}

impl FlushTrigger {
    /// 메트릭 레이블 값
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Timer => "timer",
            Self::Shutdown => "shutdown",
        }
    }
}

/// 전송 대상 배치 종류 (메트릭 레이블)
const KIND_NEW: &str = "new";
const KIND_STORED: &str = "stored";

/// 버퍼를 비워 전송하는 배경 태스크
pub struct Flusher<C> {
    client: Arc<C>,
    buffer: Arc<QueryBuffer>,
    store: FailedQueryStore,
    flush_interval: Duration,
    send_timeout: Duration,
    shutdown_grace: Duration,
    stats: Arc<PipelineStats>,
}

impl<C: ScoringClient> Flusher<C> {
    /// 새 flusher를 생성합니다.
    pub fn new(
        client: Arc<C>,
        buffer: Arc<QueryBuffer>,
        store: FailedQueryStore,
        config: &PipelineConfig,
        stats: Arc<PipelineStats>,
    ) -> Self {
        PipelineStats::set(&stats.pending_batches, store.pending_batches());
        metrics::gauge!(m::STORE_PENDING_BATCHES).set(store.pending_batches() as f64);
        Self {
            client,
            buffer,
            store,
            flush_interval: config.flush_interval,
            send_timeout: config.send_timeout,
            shutdown_grace: config.shutdown_grace,
            stats,
        }
    }

    /// 실패 저장소
    pub fn store(&self) -> &FailedQueryStore {
        &self.store
    }

    /// 취소되지 않는 한 배치를 전송합니다. 취소되면 `None`입니다.
    async fn send_unless_cancelled(
        &self,
        batch: &QueryBatch,
        kind: &'static str,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Option<Result<(), ClientError>> {
        match cancel {
            Some(cancel) => tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = self.send(batch, kind, timeout) => Some(result),
            },
            None => Some(self.send(batch, kind, timeout).await),
        }
    }

    /// 배치 하나를 제한 시간 안에 전송합니다.
    async fn send(
        &self,
        batch: &QueryBatch,
        kind: &'static str,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, self.client.send_queries(batch)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout {
                secs: timeout.as_secs(),
            }),
        };
        metrics::histogram!(m::SEND_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(m::BATCHES_SENT_TOTAL, m::LABEL_KIND => kind, m::LABEL_RESULT => outcome)
            .increment(1);

        match &result {
            Ok(()) => {
                PipelineStats::incr(&self.stats.batches_sent);
                PipelineStats::add(&self.stats.queries_sent, batch.len());
                metrics::counter!(m::QUERIES_SENT_TOTAL).increment(batch.len() as u64);
            }
            Err(_) => PipelineStats::incr(&self.stats.batches_failed),
        }
        result
    }

    fn update_pending(&self) {
        let pending = self.store.pending_batches();
        PipelineStats::set(&self.stats.pending_batches, pending);
        metrics::gauge!(m::STORE_PENDING_BATCHES).set(pending as f64);
    }

    /// 저장소의 배치를 오래된 순서대로 재전송합니다.
    ///
    /// 실패한 배치와 시도하지 못한 배치는 남고, 하나라도 성공하면 저장소를
    /// 남은 배치로 다시 씁니다. 취소되면 진행 중인 전송을 버리고 멈춥니다.
    /// 재전송에 성공한 배치 수를 반환합니다.
    async fn retry_stored(
        &mut self,
        deadline: Option<Instant>,
        cancel: Option<&CancellationToken>,
    ) -> usize {
        if !self.store.is_enabled() || self.store.pending_batches() == 0 {
            return 0;
        }

        let stored = match self.store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(error = %e, "failed to load stored batches");
                return 0;
            }
        };

        let total = stored.len();
        let mut remaining: Vec<FailedBatch> = Vec::new();
        let mut resent = 0usize;
        let mut iter = stored.into_iter();

        while let Some(failed) = iter.next() {
            let timeout = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    left.min(self.send_timeout)
                }
                None => self.send_timeout,
            };
            if timeout.is_zero() {
                remaining.push(failed);
                remaining.extend(iter);
                break;
            }

            match self
                .send_unless_cancelled(&failed.batch, KIND_STORED, timeout, cancel)
                .await
            {
                Some(Ok(())) => {
                    tracing::debug!(seq = failed.seq, queries = failed.batch.len(), "resent stored batch");
                    resent += 1;
                }
                Some(Err(e)) => {
                    tracing::warn!(seq = failed.seq, error = %e, "stored batch resend failed");
                    remaining.push(failed);
                }
                None => {
                    remaining.push(failed);
                    remaining.extend(iter);
                    break;
                }
            }
        }

        if resent > 0 {
            if let Err(e) = self.store.replace(&remaining).await {
                // 재전송된 배치가 파일에 남아 다음 사이클에 중복 전송됨
                tracing::error!(error = %e, "failed to rewrite failed query store");
            }
            self.update_pending();
            tracing::info!(
                total,
                resent,
                pending = self.store.pending_batches(),
                "retried stored batches"
            );
        } else {
            tracing::debug!(total, "no stored batches resent");
        }
        resent
    }

    /// 전송에 실패한 배치를 저장소에 보관합니다.
    ///
    /// 저장소가 비활성이거나 쓰기에 실패하면 배치는 유실됩니다.
    async fn persist(&mut self, batch: &QueryBatch) {
        match self.store.append(batch).await {
            Ok(seq) => {
                tracing::info!(seq, queries = batch.len(), "stored failed batch for resend");
                PipelineStats::add(&self.stats.queries_stored, batch.len());
                metrics::counter!(m::QUERIES_STORED_TOTAL).increment(batch.len() as u64);
                self.update_pending();
            }
            Err(e) => {
                tracing::error!(error = %e, queries = batch.len(), "dropping undelivered batch");
                PipelineStats::add(&self.stats.queries_dropped, batch.len());
                metrics::counter!(m::QUERIES_DROPPED_TOTAL).increment(batch.len() as u64);
            }
        }
    }

    fn drain(&self, trigger: FlushTrigger) -> QueryBatch {
        let batch = self.buffer.swap_and_drain();
        metrics::gauge!(m::QUERIES_BUFFERED).set(self.buffer.len() as f64);
        metrics::counter!(m::FLUSHES_TOTAL, m::LABEL_TRIGGER => trigger.as_str()).increment(1);
        PipelineStats::incr(&self.stats.flushes);
        tracing::debug!(trigger = trigger.as_str(), queries = batch.len(), "flushing query buffer");
        batch
    }

    /// flush 사이클 하나를 실행합니다.
    ///
    /// 새 배치가 비어 있어도 저장된 배치의 재전송은 수행합니다.
    /// 사이클 도중 취소되면 보내지 못한 새 배치를 반환하며,
    /// 호출자는 이를 [`Flusher::final_flush`] 경로로 넘겨야 합니다.
    pub async fn flush(
        &mut self,
        trigger: FlushTrigger,
        cancel: &CancellationToken,
    ) -> Option<QueryBatch> {
        let batch = self.drain(trigger);
        self.retry_stored(None, Some(cancel)).await;

        if batch.is_empty() {
            return None;
        }
        match self
            .send_unless_cancelled(&batch, KIND_NEW, self.send_timeout, Some(cancel))
            .await
        {
            Some(Ok(())) => tracing::debug!(queries = batch.len(), "batch delivered"),
            Some(Err(e)) => {
                tracing::warn!(error = %e, queries = batch.len(), "batch delivery failed");
                self.persist(&batch).await;
            }
            None => {
                tracing::debug!(queries = batch.len(), "flush interrupted by shutdown");
                return Some(batch);
            }
        }
        None
    }

    /// 종료 시 마지막 flush를 `shutdown_grace` 안에서 수행합니다.
    pub async fn final_flush(&mut self) {
        self.shutdown_flush(None).await;
    }

    /// 마지막 flush. `carried`는 중단된 사이클에서 넘겨받은 배치입니다.
    ///
    /// 저장소가 활성이면 남은 질의를 먼저 저장소 끝에 추가한 뒤 저장소 전체를
    /// 오래된 순서대로 재전송하므로, 시간 안에 보내지 못한 배치는 그대로 남습니다.
    async fn shutdown_flush(&mut self, carried: Option<QueryBatch>) {
        let deadline = Instant::now() + self.shutdown_grace;

        let drained = self.drain(FlushTrigger::Shutdown);
        let mut batch = match carried {
            Some(carried) if !drained.is_empty() => {
                let mut queries = carried.into_queries();
                queries.extend(drained.into_queries());
                QueryBatch::new(queries)
            }
            Some(carried) => carried,
            None => drained,
        };

        if !batch.is_empty() && self.store.is_enabled() {
            match self.store.append(&batch).await {
                Ok(seq) => {
                    tracing::debug!(seq, queries = batch.len(), "staged final batch in store");
                    PipelineStats::add(&self.stats.queries_stored, batch.len());
                    metrics::counter!(m::QUERIES_STORED_TOTAL).increment(batch.len() as u64);
                    self.update_pending();
                    batch = QueryBatch::default();
                }
                Err(e) => {
                    tracing::warn!(error = %e, queries = batch.len(), "could not stage final batch, sending directly");
                }
            }
        }

        self.retry_stored(Some(deadline), None).await;

        if batch.is_empty() {
            if self.store.pending_batches() > 0 {
                tracing::warn!(
                    pending = self.store.pending_batches(),
                    "batches left in store for next start"
                );
            }
            return;
        }

        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            tracing::warn!(queries = batch.len(), "shutdown grace exhausted before final send");
            self.persist(&batch).await;
            return;
        }
        match self.send(&batch, KIND_NEW, left.min(self.send_timeout)).await {
            Ok(()) => tracing::info!(queries = batch.len(), "final batch delivered"),
            Err(e) => {
                tracing::warn!(error = %e, queries = batch.len(), "final batch delivery failed");
                self.persist(&batch).await;
            }
        }
    }

    /// 취소될 때까지 flush 트리거를 기다리며 실행합니다.
    pub async fn run(mut self, cancel: CancellationToken) {
        let buffer = Arc::clone(&self.buffer);
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(
            interval_secs = self.flush_interval.as_secs(),
            capacity = buffer.capacity(),
            "flusher started"
        );

        let mut carried = None;
        loop {
            let trigger = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = buffer.wait_full() => {
                    // 이전 flush가 이미 비운 뒤 남은 신호
                    if !buffer.is_full() {
                        continue;
                    }
                    FlushTrigger::Size
                }
                _ = ticker.tick() => FlushTrigger::Timer,
            };

            if let Some(batch) = self.flush(trigger, &cancel).await {
                carried = Some(batch);
                break;
            }
            ticker.reset();
        }

        self.shutdown_flush(carried).await;
        tracing::debug!("flusher stopped");
    }
}
