//! 알림 폴러 -- 원격 서비스에서 새 알림을 주기적으로 가져옵니다.
//!
//! 커서는 폴러만 소유합니다. 폴링과 출력이 모두 성공해야 커서가 전진하며,
//! 실패하면 다음 주기에 같은 위치에서 다시 요청합니다.
//! `cursor_file`이 설정되면 전진할 때마다 커서를 저장하고 기동 시 복원합니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use dnswatch_core::client::ScoringClient;
use dnswatch_core::metrics as m;
use dnswatch_core::types::Cursor;

use crate::error::QueryPipelineError;
use crate::sink::EventSink;
use crate::stats::PipelineStats;

/// 알림 폴러
pub struct EventPoller<C> {
    client: Arc<C>,
    sink: EventSink,
    cursor: Cursor,
    cursor_file: Option<PathBuf>,
    interval: Duration,
    stats: Arc<PipelineStats>,
}

impl<C: ScoringClient> EventPoller<C> {
    /// 새 폴러를 생성합니다. 저장된 커서가 있으면 복원합니다.
    pub async fn new(
        client: Arc<C>,
        sink: EventSink,
        interval: Duration,
        cursor_file: Option<PathBuf>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let cursor = match &cursor_file {
            Some(path) => restore_cursor(path).await,
            None => Cursor::start(),
        };
        Self {
            client,
            sink,
            cursor,
            cursor_file,
            interval,
            stats,
        }
    }

    /// 현재 커서
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// 폴링 한 번을 수행하고 기록한 알림 수를 반환합니다.
    ///
    /// 실패하면 커서는 변하지 않습니다.
    pub async fn poll_once(&mut self) -> Result<usize, QueryPipelineError> {
        let page = match self.client.poll_events(&self.cursor).await {
            Ok(page) => page,
            Err(e) => {
                PipelineStats::incr(&self.stats.poll_errors);
                metrics::counter!(m::EVENTS_POLL_ERRORS_TOTAL).increment(1);
                return Err(e.into());
            }
        };

        if let Err(e) = self.sink.write_events(&page.events).await {
            PipelineStats::incr(&self.stats.poll_errors);
            metrics::counter!(m::EVENTS_POLL_ERRORS_TOTAL).increment(1);
            return Err(e);
        }

        let count = page.events.len();
        PipelineStats::add(&self.stats.events_polled, count);
        metrics::counter!(m::EVENTS_POLLED_TOTAL).increment(count as u64);

        if page.cursor != self.cursor {
            self.cursor = page.cursor;
            if let Some(path) = &self.cursor_file {
                if let Err(e) = persist_cursor(path, &self.cursor).await {
                    tracing::warn!(path = %path.display(), error = %e, "failed to persist cursor");
                }
            }
        }

        tracing::debug!(events = count, cursor = %self.cursor, "polled scored events");
        Ok(count)
    }

    /// 취소될 때까지 주기적으로 폴링합니다. 첫 폴링은 즉시 실행됩니다.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(interval_secs = self.interval.as_secs(), "event poller started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                polled = self.poll_once() => polled,
            };
            if let Err(e) = polled {
                tracing::warn!(error = %e, cursor = %self.cursor, "event poll failed, will retry");
            }
        }

        tracing::debug!("event poller stopped");
    }
}

async fn restore_cursor(path: &Path) -> Cursor {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let cursor = Cursor::new(content.trim());
            tracing::info!(path = %path.display(), cursor = %cursor, "restored event cursor");
            cursor
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Cursor::start(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read cursor file, starting from the beginning");
            Cursor::start()
        }
    }
}

async fn persist_cursor(path: &Path, cursor: &Cursor) -> std::io::Result<()> {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    let tmp = path.with_file_name(name);

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(cursor.as_str().as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await
}
