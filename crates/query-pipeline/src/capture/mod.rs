//! 캡처 소스 -- DNS 질의 레코드를 생산하는 외부 협력자
//!
//! # 소스
//! - [`ReplaySource`]: 줄 단위 JSON 캡처 파일 재생 (유한)
//! - [`FeedSource`]: 외부 스니퍼가 보내는 UDP JSON 데이터그램 수신 (무한)
//!
//! # 아키텍처
//! 각 소스는 자체 tokio 태스크에서 실행되며, 디코딩한 [`CaptureEvent`]를
//! 하나의 bounded `mpsc` 채널로 디스패처에 전달합니다.
//! [`spawn_sources`]가 돌려준 감시 태스크는 소스 종료를 관찰하여
//! 복구 불가능한 실패나 (유한 소스의) 완료를 [`CaptureExit`]로 보고합니다.

pub mod feed;
pub mod replay;

pub use feed::FeedSource;
pub use replay::ReplaySource;

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use dnswatch_core::metrics as m;
use dnswatch_core::types::Query;

use crate::error::QueryPipelineError;
use crate::scope::domain::is_domain_name;
use crate::stats::PipelineStats;

/// 캡처 소스가 생산하는 질의 레코드
///
/// 재생 파일의 한 줄, 또는 피드 데이터그램 하나에 해당합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureEvent {
    /// 질의 시각 (없으면 수신 시각)
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// 출발지 IP (문자열 그대로 받아 디스패처에서 검증)
    pub source_ip: String,
    /// 레코드 타입
    pub record_type: String,
    /// 도메인 이름
    pub fqdn: String,
    /// 전송 프로토콜 (udp, tcp)
    #[serde(default)]
    pub protocol: Option<String>,
    /// 서버 포트
    #[serde(default)]
    pub port: Option<u16>,
}

impl CaptureEvent {
    /// 검증된 [`Query`]로 변환합니다.
    ///
    /// IP를 해석할 수 없거나, 도메인이 유효하지 않거나, 레코드 타입이
    /// 영숫자 1~16자가 아니면 `None`을 반환합니다.
    pub fn into_query(self) -> Option<Query> {
        let ip: IpAddr = self.source_ip.trim().parse().ok()?;
        let record_type = self.record_type.trim();
        if !is_record_type(record_type) || !is_domain_name(&self.fqdn) {
            return None;
        }
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        Some(Query::new(
            timestamp,
            ip,
            record_type.to_ascii_uppercase(),
            &self.fqdn,
        ))
    }
}

/// 레코드 타입 최대 길이 (`TYPE65535` 형식 포함)
const MAX_RECORD_TYPE_LEN: usize = 16;

fn is_record_type(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_RECORD_TYPE_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// 캡처 소스
#[derive(Debug)]
pub enum CaptureSource {
    /// 파일 재생
    Replay(ReplaySource),
    /// 라이브 피드
    Feed(FeedSource),
}

impl CaptureSource {
    /// 로그/메트릭용 소스 이름
    pub fn name(&self) -> String {
        match self {
            Self::Replay(source) => source.name(),
            Self::Feed(source) => source.name(),
        }
    }

    /// 유한 소스 여부
    pub fn is_finite(&self) -> bool {
        matches!(self, Self::Replay(_))
    }

    /// 소스를 끝까지 (또는 취소될 때까지) 실행합니다.
    ///
    /// 전달한 이벤트 수를 반환합니다.
    pub async fn run(
        self,
        tx: mpsc::Sender<CaptureEvent>,
        stats: Arc<PipelineStats>,
        cancel: CancellationToken,
    ) -> Result<u64, QueryPipelineError> {
        match self {
            Self::Replay(source) => source.run(tx, stats, cancel).await,
            Self::Feed(source) => source.run(tx, stats, cancel).await,
        }
    }
}

/// 캡처 종료 보고
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureExit {
    /// 모든 유한 소스가 정상 종료됨
    Completed,
    /// 소스가 복구 불가능하게 실패함
    Failed {
        /// 소스 이름
        source_name: String,
        /// 실패 사유
        reason: String,
    },
}

/// 원시 레코드 하나를 디코딩하고 통계를 갱신합니다.
///
/// 디코딩 실패는 형식 오류 이벤트로 집계하고 `None`을 반환합니다.
pub(crate) fn decode_event(
    raw: &[u8],
    source: &'static str,
    stats: &PipelineStats,
) -> Option<CaptureEvent> {
    PipelineStats::incr(&stats.captured);
    metrics::counter!(m::CAPTURE_EVENTS_TOTAL, m::LABEL_SOURCE => source).increment(1);

    match serde_json::from_slice::<CaptureEvent>(raw) {
        Ok(event) => Some(event),
        Err(e) => {
            PipelineStats::incr(&stats.malformed);
            metrics::counter!(m::CAPTURE_MALFORMED_TOTAL).increment(1);
            tracing::trace!(source, error = %e, "discarding undecodable capture record");
            None
        }
    }
}

/// 소스들을 스폰하고 감시 태스크를 반환합니다.
///
/// 원본 `tx`는 소비되므로, 모든 소스가 끝나면 채널이 닫혀 디스패처가 종료됩니다.
/// 감시 태스크는 취소되지 않은 상태에서 소스가 실패하면 즉시 [`CaptureExit::Failed`]를,
/// 모든 소스가 정상 종료하면 [`CaptureExit::Completed`]를 `exit_tx`로 보냅니다.
pub fn spawn_sources(
    sources: Vec<CaptureSource>,
    tx: mpsc::Sender<CaptureEvent>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
    exit_tx: Option<mpsc::Sender<CaptureExit>>,
) -> JoinHandle<()> {
    let mut set = JoinSet::new();
    for source in sources {
        let name = source.name();
        let fut = source.run(tx.clone(), Arc::clone(&stats), cancel.child_token());
        set.spawn(async move { (name, fut.await) });
    }
    drop(tx);

    tokio::spawn(async move {
        while let Some(joined) = set.join_next().await {
            let failure = match joined {
                Ok((name, Ok(count))) => {
                    tracing::info!(source = %name, events = count, "capture source finished");
                    None
                }
                Ok((name, Err(e))) => Some((name, e.to_string())),
                Err(e) => Some(("capture".to_owned(), format!("task failed: {e}"))),
            };

            if let Some((source_name, reason)) = failure {
                if cancel.is_cancelled() {
                    tracing::debug!(source = %source_name, %reason, "capture source ended during shutdown");
                    continue;
                }
                tracing::error!(source = %source_name, %reason, "capture source failed");
                if let Some(exit_tx) = &exit_tx {
                    let _ = exit_tx
                        .send(CaptureExit::Failed {
                            source_name,
                            reason,
                        })
                        .await;
                }
                return;
            }
        }

        if !cancel.is_cancelled() {
            tracing::info!("all capture sources completed");
            if let Some(exit_tx) = &exit_tx {
                let _ = exit_tx.send(CaptureExit::Completed).await;
            }
        }
    })
}
