//! 질의 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`DnswatchConfig`]에서 파이프라인이 사용하는
//! 값만 골라 만든 불변 값입니다. 기본값은 core 설정 로딩 단계에서 모두 채워지며,
//! 파이프라인은 이를 다시 채우지 않습니다.
//!
//! # 사용 예시
//! ```ignore
//! use dnswatch_core::config::DnswatchConfig;
//! use dnswatch_query_pipeline::config::PipelineConfig;
//!
//! let core_config = DnswatchConfig::load("/etc/dnswatch/dnswatch.toml").await?;
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use dnswatch_core::config::{
    DnswatchConfig, MIN_BUFFER_SIZE, MIN_FLUSH_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS,
};

use crate::error::QueryPipelineError;

/// 리눅스 네트워크 인터페이스 목록 경로
pub const DEFAULT_SYSFS_NET: &str = "/sys/class/net";

/// 질의 파이프라인 설정
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 캡처 인터페이스 (live 소스 전용)
    pub interface: String,
    /// 허용 프로토콜 (정렬, 중복 제거됨)
    pub protocols: Vec<String>,
    /// 허용 포트
    pub port: u16,

    /// live 소스 활성화 여부
    pub live: bool,
    /// live 피드 수신 주소
    pub feed_bind: String,
    /// 재생할 캡처 파일 목록
    pub replay_files: Vec<PathBuf>,
    /// 캡처 채널 용량
    pub channel_capacity: usize,

    /// 버퍼 용량
    pub buffer_size: usize,
    /// 타이머 flush 주기
    pub flush_interval: Duration,
    /// 배치 하나의 전송 제한 시간
    pub send_timeout: Duration,
    /// 종료 시 마지막 flush 제한 시간
    pub shutdown_grace: Duration,
    /// 실패 배치 저장 경로 (None이면 저장소 비활성)
    pub failed_file: Option<PathBuf>,

    /// 알림 출력 대상 (None이면 폴링 비활성)
    pub events_target: Option<String>,
    /// 폴링 주기
    pub poll_interval: Duration,
    /// 커서 저장 경로
    pub cursor_file: Option<PathBuf>,

    /// 인터페이스 존재 확인에 사용할 sysfs 경로
    pub sysfs_net: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_core(&DnswatchConfig::default())
    }
}

fn non_empty_path(s: &str) -> Option<PathBuf> {
    (!s.is_empty()).then(|| PathBuf::from(s))
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &DnswatchConfig) -> Self {
        Self {
            interface: core.network.interface.clone(),
            protocols: core.network.protocols.clone(),
            port: core.network.port,
            live: core.capture.live_enabled(),
            feed_bind: core.capture.feed_bind.clone(),
            replay_files: if core.capture.replay_enabled() {
                core.capture.replay_files.iter().map(PathBuf::from).collect()
            } else {
                Vec::new()
            },
            channel_capacity: core.capture.channel_capacity,
            buffer_size: core.queries.buffer_size,
            flush_interval: core.queries.flush_interval(),
            send_timeout: core.queries.send_timeout(),
            shutdown_grace: core.queries.shutdown_grace(),
            failed_file: non_empty_path(&core.queries.failed.file),
            events_target: core.events.enabled().then(|| core.events.file.clone()),
            poll_interval: core.events.poll_interval(),
            cursor_file: non_empty_path(&core.events.cursor_file),
            sysfs_net: PathBuf::from(DEFAULT_SYSFS_NET),
        }
    }

    /// 모든 캡처 소스가 유한한지 확인합니다 (replay 전용 구성).
    pub fn capture_is_finite(&self) -> bool {
        !self.live && !self.replay_files.is_empty()
    }

    /// 설정 값을 검증합니다.
    ///
    /// core 검증을 거친 값이라도 파이프라인을 직접 조립하는 경우를 위해
    /// 파이프라인이 의존하는 하한만 다시 확인합니다.
    pub fn validate(&self) -> Result<(), QueryPipelineError> {
        let invalid = |field: &str, reason: String| QueryPipelineError::Config {
            field: field.to_owned(),
            reason,
        };

        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(invalid(
                "queries.buffer_size",
                format!("must be at least {MIN_BUFFER_SIZE}"),
            ));
        }
        if self.flush_interval < Duration::from_secs(MIN_FLUSH_INTERVAL_SECS) {
            return Err(invalid(
                "queries.flush_interval_secs",
                format!("must be at least {MIN_FLUSH_INTERVAL_SECS}"),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(invalid(
                "queries.send_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.events_target.is_some()
            && self.poll_interval < Duration::from_secs(MIN_POLL_INTERVAL_SECS)
        {
            return Err(invalid(
                "events.poll_interval_secs",
                format!("must be at least {MIN_POLL_INTERVAL_SECS}"),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(invalid(
                "capture.channel_capacity",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.protocols.is_empty() {
            return Err(invalid(
                "network.protocols",
                "at least one protocol is required".to_owned(),
            ));
        }
        if !self.live && self.replay_files.is_empty() {
            return Err(invalid(
                "capture.sources",
                "no capture source configured".to_owned(),
            ));
        }
        if self.live {
            if self.interface.is_empty() {
                return Err(invalid(
                    "network.interface",
                    "required when live capture is enabled".to_owned(),
                ));
            }
            self.feed_bind
                .parse::<SocketAddr>()
                .map_err(|e| invalid("capture.feed_bind", e.to_string()))?;
        }
        Ok(())
    }
}
