//! 질의 버퍼 -- 스코프를 통과한 질의를 모아 두는 공유 버퍼
//!
//! [`QueryBuffer`]는 디스패처(push)와 flusher(swap)가 함께 사용합니다.
//! 두 연산은 같은 뮤텍스 아래에서 실행되므로 push는 정확히 하나의 배치에만
//! 들어가며, 스왑 중에 유실되거나 중복되지 않습니다.
//!
//! # flush 신호
//! push 후 길이가 용량에 도달하면 [`Notify`]로 flusher를 깨웁니다.
//! flusher가 전송 중이면 버퍼는 일시적으로 용량을 넘을 수 있으며,
//! 다음 사이클에서 한 번에 비워집니다.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use dnswatch_core::types::{Query, QueryBatch};

/// 스왑 후 새 버퍼의 초기 할당 상한
const MAX_PREALLOC: usize = 10_000;

/// push 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// 버퍼에 적재됨
    Buffered,
    /// 적재 후 용량에 도달하여 flush를 요청함
    Full,
}

/// 스레드 안전한 질의 버퍼
///
/// `Arc<QueryBuffer>`로 공유합니다.
pub struct QueryBuffer {
    /// 활성 버퍼
    active: Mutex<Vec<Query>>,
    /// 용량 (flush 임계값)
    capacity: usize,
    /// 용량 도달 신호
    full: Notify,
}

impl QueryBuffer {
    /// 새 버퍼를 생성합니다.
    pub fn new(capacity: usize) -> Self {
        Self {
            active: Mutex::new(Vec::with_capacity(capacity.min(MAX_PREALLOC))),
            capacity,
            full: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Query>> {
        // 패닉한 push는 Vec을 불완전한 상태로 남기지 않으므로 내용을 그대로 사용
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 질의를 적재합니다.
    ///
    /// 적재 후 길이가 용량 이상이면 flush를 요청하고 [`PushOutcome::Full`]을 반환합니다.
    pub fn push(&self, query: Query) -> PushOutcome {
        let len = {
            let mut active = self.lock();
            active.push(query);
            active.len()
        };

        if len >= self.capacity {
            self.full.notify_one();
            PushOutcome::Full
        } else {
            PushOutcome::Buffered
        }
    }

    /// 활성 버퍼를 빈 버퍼로 교체하고 기존 내용을 배치로 반환합니다.
    pub fn swap_and_drain(&self) -> QueryBatch {
        let fresh = Vec::with_capacity(self.capacity.min(MAX_PREALLOC));
        let drained = std::mem::replace(&mut *self.lock(), fresh);
        QueryBatch::new(drained)
    }

    /// 용량 도달 신호를 기다립니다.
    ///
    /// 대기자가 없을 때 보낸 신호는 하나까지 보관되어 다음 호출이 즉시 반환됩니다.
    pub async fn wait_full(&self) {
        self.full.notified().await;
    }

    /// 현재 적재된 질의 수
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// 버퍼가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 버퍼 용량
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 용량 도달 여부
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// 버퍼 사용률 (용량을 넘으면 1.0보다 클 수 있음)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        f64::from(u32::try_from(self.len()).unwrap_or(u32::MAX))
            / f64::from(u32::try_from(self.capacity).unwrap_or(u32::MAX))
    }
}
