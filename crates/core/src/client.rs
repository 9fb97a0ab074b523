//! 원격 스코어링 서비스 클라이언트 추상화
//!
//! 파이프라인은 [`ScoringClient`] trait만 알고 있으며, 실제 HTTP 전송,
//! 인증, 와이어 인코딩은 데몬의 어댑터가 담당합니다.
//!
//! # 계약
//! - 코어는 단일 호출을 재시도하지 않습니다. 실패한 배치는 저장소에
//!   보관되었다가 다음 flush 사이클에서 다시 전송됩니다.
//! - 구현체는 Flusher와 EventPoller에서 동시에 호출될 수 있어야 합니다.

use std::future::Future;

use crate::error::ClientError;
use crate::types::{Cursor, EventPage, QueryBatch};

/// 원격 스코어링 서비스 클라이언트
///
/// `Arc<C>`로 공유되어 여러 태스크에서 동시에 사용됩니다.
pub trait ScoringClient: Send + Sync + 'static {
    /// 질의 배치를 전송합니다.
    ///
    /// # Errors
    ///
    /// 전송 실패 시 [`ClientError`]를 반환합니다. 호출자는 배치를
    /// 실패 저장소에 보관할지만 결정합니다.
    fn send_queries(
        &self,
        batch: &QueryBatch,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// `cursor` 이후의 새 알림을 가져옵니다.
    ///
    /// 성공하면 알림 목록과 다음 커서를 반환합니다.
    fn poll_events(
        &self,
        cursor: &Cursor,
    ) -> impl Future<Output = Result<EventPage, ClientError>> + Send;
}
