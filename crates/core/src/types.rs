//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 캡처 경로(Query, QueryBatch)와 알림 폴링 경로(Cursor, ScoredEvent)가
//! 공유하는 데이터 구조를 정의합니다.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// DNS 질의 레코드
///
/// 생성 후 변경되지 않습니다. fqdn은 생성 시 소문자로 정규화되고
/// 끝의 점 하나가 제거됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    timestamp: DateTime<Utc>,
    source_ip: IpAddr,
    record_type: String,
    fqdn: String,
}

impl Query {
    /// 새 질의 레코드를 생성합니다.
    pub fn new(
        timestamp: DateTime<Utc>,
        source_ip: IpAddr,
        record_type: impl Into<String>,
        fqdn: &str,
    ) -> Self {
        Self {
            timestamp,
            source_ip,
            record_type: record_type.into(),
            fqdn: normalize_fqdn(fqdn),
        }
    }

    /// 질의 시각
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 질의를 보낸 호스트의 IP
    pub fn source_ip(&self) -> IpAddr {
        self.source_ip
    }

    /// 레코드 타입 (A, AAAA, MX ...)
    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    /// 정규화된 도메인 이름
    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.timestamp.to_rfc3339(),
            self.source_ip,
            self.record_type,
            self.fqdn,
        )
    }
}

/// fqdn을 소문자로 바꾸고 끝의 점 하나를 제거합니다.
pub fn normalize_fqdn(fqdn: &str) -> String {
    let trimmed = fqdn.strip_suffix('.').unwrap_or(fqdn);
    trimmed.to_ascii_lowercase()
}

/// 삽입 순서가 보존된 질의 배치
///
/// 버퍼 스왑 시점에 만들어지며 이후 변경되지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryBatch {
    queries: Vec<Query>,
}

impl QueryBatch {
    /// 질의 목록으로 배치를 생성합니다.
    pub fn new(queries: Vec<Query>) -> Self {
        Self { queries }
    }

    /// 배치에 담긴 질의 수
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// 배치가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// 삽입 순서대로 질의를 반환합니다.
    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// 질의 반복자
    pub fn iter(&self) -> std::slice::Iter<'_, Query> {
        self.queries.iter()
    }

    /// 내부 질의 목록의 소유권을 넘깁니다.
    pub fn into_queries(self) -> Vec<Query> {
        self.queries
    }
}

impl<'a> IntoIterator for &'a QueryBatch {
    type Item = &'a Query;
    type IntoIter = std::slice::Iter<'a, Query>;

    fn into_iter(self) -> Self::IntoIter {
        self.queries.iter()
    }
}

/// 알림 스트림 재개 위치
///
/// 원격 서비스가 발급하는 불투명 토큰입니다. 빈 값은 스트림의 시작을 뜻합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// 스트림 시작 위치
    pub fn start() -> Self {
        Self(String::new())
    }

    /// 원격 서비스가 돌려준 토큰으로 커서를 만듭니다.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// 토큰 문자열
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 스트림 시작 위치인지 확인합니다.
    pub fn is_start(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<start>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// 원격 스코어링 서비스가 생성한 알림
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvent {
    /// 알림 유형 (예: "alert")
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// 원본 질의 시각
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// 질의를 보낸 호스트의 IP
    pub ip: IpAddr,
    /// 레코드 타입
    #[serde(rename = "record_type", default)]
    pub record_type: String,
    /// 도메인 이름
    pub fqdn: String,
    /// 위험도 (0-5)
    #[serde(default)]
    pub risk: u8,
    /// 위협 플래그
    #[serde(default)]
    pub flags: Vec<String>,
    /// 매칭된 스코프 그룹
    #[serde(default)]
    pub groups: Vec<String>,
}

/// 한 번의 폴링 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPage {
    /// 새 알림 목록 (비어있을 수 있음)
    pub events: Vec<ScoredEvent>,
    /// 다음 폴링에 사용할 커서
    pub cursor: Cursor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn query_normalizes_fqdn() {
        let q = Query::new(
            Utc::now(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            "A",
            "WWW.Example.COM.",
        );
        assert_eq!(q.fqdn(), "www.example.com");
    }

    #[test]
    fn normalize_strips_only_one_trailing_dot() {
        assert_eq!(normalize_fqdn("a.b.."), "a.b.");
        assert_eq!(normalize_fqdn("a.b"), "a.b");
    }

    #[test]
    fn batch_preserves_order() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let batch = QueryBatch::new(vec![
            Query::new(Utc::now(), ip, "A", "one.com"),
            Query::new(Utc::now(), ip, "A", "two.com"),
        ]);
        let names: Vec<&str> = batch.iter().map(Query::fqdn).collect();
        assert_eq!(names, vec!["one.com", "two.com"]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn cursor_start_is_empty() {
        assert!(Cursor::start().is_start());
        assert!(!Cursor::new("abc").is_start());
        assert_eq!(Cursor::start().to_string(), "<start>");
    }

    #[test]
    fn scored_event_deserializes_with_defaults() {
        let json = r#"{"ts":"2017-01-01T00:00:00Z","ip":"10.0.0.5","fqdn":"bad.example"}"#;
        let event: ScoredEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.fqdn, "bad.example");
        assert_eq!(event.risk, 0);
        assert!(event.flags.is_empty());
    }
}
