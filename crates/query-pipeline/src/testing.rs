//! 단위 테스트용 모의 스코어링 클라이언트

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use dnswatch_core::client::ScoringClient;
use dnswatch_core::error::ClientError;
use dnswatch_core::types::{Cursor, EventPage, Query, QueryBatch, ScoredEvent};

/// 테스트용 질의 (10.0.0.0/8, `host{n}.example.com`)
pub fn query(n: u32) -> Query {
    Query::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + n)),
        "A",
        &format!("host{n}.example.com"),
    )
}

/// 테스트용 알림
pub fn scored_event(fqdn: &str) -> ScoredEvent {
    ScoredEvent {
        event_type: "alert".to_owned(),
        timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ip: "10.0.0.1".parse().unwrap(),
        record_type: "A".to_owned(),
        fqdn: fqdn.to_owned(),
        risk: 3,
        flags: vec!["c2".to_owned()],
        groups: vec!["default".to_owned()],
    }
}

/// 전송 기록과 실패 주입을 지원하는 모의 클라이언트
#[derive(Default)]
pub struct MockScoringClient {
    sent: Mutex<Vec<QueryBatch>>,
    send_failing: AtomicBool,
    send_delay: Mutex<Option<Duration>>,
    pages: Mutex<VecDeque<EventPage>>,
    poll_failing: AtomicBool,
    polled: Mutex<Vec<Cursor>>,
}

impl MockScoringClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_send_failing(&self, failing: bool) {
        self.send_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_poll_failing(&self, failing: bool) {
        self.poll_failing.store(failing, Ordering::SeqCst);
    }

    pub fn push_page(&self, page: EventPage) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub fn sent_batches(&self) -> Vec<QueryBatch> {
        self.sent.lock().unwrap().clone()
    }

    pub fn polled_cursors(&self) -> Vec<Cursor> {
        self.polled.lock().unwrap().clone()
    }
}

impl ScoringClient for MockScoringClient {
    async fn send_queries(&self, batch: &QueryBatch) -> Result<(), ClientError> {
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.send_failing.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".to_owned()));
        }
        self.sent.lock().unwrap().push(batch.clone());
        Ok(())
    }

    async fn poll_events(&self, cursor: &Cursor) -> Result<EventPage, ClientError> {
        self.polled.lock().unwrap().push(cursor.clone());
        if self.poll_failing.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                code: 503,
                message: "service unavailable".to_owned(),
            });
        }
        let page = self.pages.lock().unwrap().pop_front();
        Ok(page.unwrap_or_else(|| EventPage {
            events: Vec::new(),
            cursor: cursor.clone(),
        }))
    }
}
