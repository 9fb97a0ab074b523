//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `dnswatch_`
//! - 영역: `capture_`, `queries_`, `store_`, `events_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(dnswatch_core::metrics::QUERIES_ACCEPTED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// flush 트리거 레이블 키 (size, timer, shutdown)
pub const LABEL_TRIGGER: &str = "trigger";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 배치 종류 레이블 키 (new, stored)
pub const LABEL_KIND: &str = "kind";

/// 캡처 소스 레이블 키 (live, replay)
pub const LABEL_SOURCE: &str = "source";

// ─── Capture / Dispatcher 메트릭 ────────────────────────────────────

/// Capture: 수신한 캡처 이벤트 수 (counter, label: source)
pub const CAPTURE_EVENTS_TOTAL: &str = "dnswatch_capture_events_total";

/// Capture: 형식 오류로 버린 이벤트 수 (counter)
pub const CAPTURE_MALFORMED_TOTAL: &str = "dnswatch_capture_malformed_total";

/// Dispatcher: 프로토콜/포트 필터로 버린 질의 수 (counter)
pub const QUERIES_FILTERED_TOTAL: &str = "dnswatch_queries_filtered_total";

/// Dispatcher: 스코프 밖이라 버린 질의 수 (counter)
pub const QUERIES_OUT_OF_SCOPE_TOTAL: &str = "dnswatch_queries_out_of_scope_total";

/// Dispatcher: 버퍼에 적재된 질의 수 (counter)
pub const QUERIES_ACCEPTED_TOTAL: &str = "dnswatch_queries_accepted_total";

// ─── Buffer / Flusher 메트릭 ────────────────────────────────────────

/// Buffer: 현재 버퍼 내 질의 수 (gauge)
pub const QUERIES_BUFFERED: &str = "dnswatch_queries_buffered";

/// Flusher: flush 실행 수 (counter, label: trigger)
pub const FLUSHES_TOTAL: &str = "dnswatch_flushes_total";

/// Flusher: 배치 전송 시도 수 (counter, labels: kind, result)
pub const BATCHES_SENT_TOTAL: &str = "dnswatch_batches_sent_total";

/// Flusher: 원격으로 전송 완료된 질의 수 (counter)
pub const QUERIES_SENT_TOTAL: &str = "dnswatch_queries_sent_total";

/// Flusher: 실패 저장소에 보관된 질의 수 (counter)
pub const QUERIES_STORED_TOTAL: &str = "dnswatch_queries_stored_total";

/// Flusher: 저장하지 못해 유실된 질의 수 (counter)
pub const QUERIES_DROPPED_TOTAL: &str = "dnswatch_queries_dropped_total";

/// Flusher: 배치 전송 지연 시간 (histogram, 초)
pub const SEND_DURATION_SECONDS: &str = "dnswatch_send_duration_seconds";

/// Store: 디스크에 보관 중인 실패 배치 수 (gauge)
pub const STORE_PENDING_BATCHES: &str = "dnswatch_store_pending_batches";

// ─── EventPoller 메트릭 ─────────────────────────────────────────────

/// Events: 수신한 알림 수 (counter)
pub const EVENTS_POLLED_TOTAL: &str = "dnswatch_events_polled_total";

/// Events: 폴링 실패 수 (counter)
pub const EVENTS_POLL_ERRORS_TOTAL: &str = "dnswatch_events_poll_errors_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "dnswatch_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "dnswatch_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 배치 전송 지연 시간 히스토그램 버킷 (초)
///
/// 10ms ~ 60s 범위 (원격 전송은 타임아웃까지 걸릴 수 있음)
pub const SEND_DURATION_BUCKETS: [f64; 10] =
    [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 60.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `dnswatch-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Capture / Dispatcher
    describe_counter!(
        CAPTURE_EVENTS_TOTAL,
        "Total number of capture events received from all sources"
    );
    describe_counter!(
        CAPTURE_MALFORMED_TOTAL,
        "Total number of capture events discarded as malformed"
    );
    describe_counter!(
        QUERIES_FILTERED_TOTAL,
        "Total number of queries discarded by the protocol/port filter"
    );
    describe_counter!(
        QUERIES_OUT_OF_SCOPE_TOTAL,
        "Total number of queries outside the monitoring scope"
    );
    describe_counter!(
        QUERIES_ACCEPTED_TOTAL,
        "Total number of in-scope queries pushed into the buffer"
    );

    // Buffer / Flusher
    describe_gauge!(
        QUERIES_BUFFERED,
        "Current number of queries waiting in the buffer"
    );
    describe_counter!(FLUSHES_TOTAL, "Total number of flush cycles by trigger");
    describe_counter!(
        BATCHES_SENT_TOTAL,
        "Total number of batch delivery attempts by kind and result"
    );
    describe_counter!(
        QUERIES_SENT_TOTAL,
        "Total number of queries delivered to the scoring service"
    );
    describe_counter!(
        QUERIES_STORED_TOTAL,
        "Total number of queries persisted to the failed query store"
    );
    describe_counter!(
        QUERIES_DROPPED_TOTAL,
        "Total number of queries lost because they could not be stored"
    );
    describe_histogram!(
        SEND_DURATION_SECONDS,
        "Time to deliver a single batch in seconds"
    );
    describe_gauge!(
        STORE_PENDING_BATCHES,
        "Number of failed batches waiting on disk for resend"
    );

    // EventPoller
    describe_counter!(
        EVENTS_POLLED_TOTAL,
        "Total number of scored events received from the scoring service"
    );
    describe_counter!(EVENTS_POLL_ERRORS_TOTAL, "Total number of failed polls");

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, labelled with version)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        CAPTURE_EVENTS_TOTAL,
        CAPTURE_MALFORMED_TOTAL,
        QUERIES_FILTERED_TOTAL,
        QUERIES_OUT_OF_SCOPE_TOTAL,
        QUERIES_ACCEPTED_TOTAL,
        QUERIES_BUFFERED,
        FLUSHES_TOTAL,
        BATCHES_SENT_TOTAL,
        QUERIES_SENT_TOTAL,
        QUERIES_STORED_TOTAL,
        QUERIES_DROPPED_TOTAL,
        SEND_DURATION_SECONDS,
        STORE_PENDING_BATCHES,
        EVENTS_POLLED_TOTAL,
        EVENTS_POLL_ERRORS_TOTAL,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("dnswatch_"),
                "Metric '{name}' does not start with 'dnswatch_' prefix"
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn counters_end_with_total() {
        let counters = [
            CAPTURE_EVENTS_TOTAL,
            QUERIES_ACCEPTED_TOTAL,
            FLUSHES_TOTAL,
            BATCHES_SENT_TOTAL,
            EVENTS_POLLED_TOTAL,
        ];
        for name in counters {
            assert!(name.ends_with("_total"), "{name}");
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn send_duration_buckets_are_sorted() {
        let buckets = SEND_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(buckets[i] > buckets[i - 1]);
        }
    }
}
