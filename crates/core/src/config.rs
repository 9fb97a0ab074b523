//! 설정 관리 -- dnswatch.toml 파싱 및 런타임 설정
//!
//! [`DnswatchConfig`]는 에이전트 전체 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선, 데몬에서 적용)
//! 2. 환경변수 (`DNSWATCH_QUERIES_BUFFER_SIZE=1024` 형식)
//! 3. 설정 파일 (`dnswatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! 로딩이 끝난 설정은 불변 값으로 취급되며, 이후 어떤 컴포넌트도
//! 기본값을 다시 채우지 않습니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), dnswatch_core::error::DnswatchError> {
//! use dnswatch_core::config::DnswatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = DnswatchConfig::load("dnswatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = DnswatchConfig::parse("[queries]\nbuffer_size = 1024")?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DnswatchError};

/// 최소 버퍼 크기
pub const MIN_BUFFER_SIZE: usize = 64;
/// 최소 flush 주기 (초)
pub const MIN_FLUSH_INTERVAL_SECS: u64 = 5;
/// 최소 알림 폴링 주기 (초)
pub const MIN_POLL_INTERVAL_SECS: u64 = 5;
/// 허용되는 전송 프로토콜
pub const VALID_PROTOCOLS: [&str; 2] = ["tcp", "udp"];
/// 라이브 캡처 소스 이름
pub const SOURCE_LIVE: &str = "live";
/// 파일 재생 캡처 소스 이름
pub const SOURCE_REPLAY: &str = "replay";

/// dnswatch 통합 설정
///
/// `dnswatch.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnswatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 원격 스코어링 API 설정
    #[serde(default)]
    pub api: ApiConfig,
    /// 네트워크 선택 설정
    #[serde(default)]
    pub network: NetworkConfig,
    /// 캡처 소스 설정
    #[serde(default)]
    pub capture: CaptureConfig,
    /// 모니터링 스코프 설정
    #[serde(default)]
    pub scope: ScopeConfig,
    /// 질의 버퍼링/전송 설정
    #[serde(default)]
    pub queries: QueriesConfig,
    /// 알림 폴링 설정
    #[serde(default)]
    pub events: EventsConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl DnswatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 정규화 및 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DnswatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DnswatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DnswatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DnswatchError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, DnswatchError> {
        toml::from_str(toml_str).map_err(|e| {
            DnswatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `DNSWATCH_{SECTION}_{FIELD}`
    /// 예: `DNSWATCH_NETWORK_INTERFACE=eth0`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DNSWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DNSWATCH_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "DNSWATCH_GENERAL_PID_FILE");

        // API
        override_string(&mut self.api.host, "DNSWATCH_API_HOST");
        override_string(&mut self.api.api_key, "DNSWATCH_API_API_KEY");
        override_u64(&mut self.api.timeout_secs, "DNSWATCH_API_TIMEOUT_SECS");

        // Network
        override_string(&mut self.network.interface, "DNSWATCH_NETWORK_INTERFACE");
        override_csv(&mut self.network.protocols, "DNSWATCH_NETWORK_PROTOCOLS");
        override_u16(&mut self.network.port, "DNSWATCH_NETWORK_PORT");

        // Capture
        override_csv(&mut self.capture.sources, "DNSWATCH_CAPTURE_SOURCES");
        override_string(&mut self.capture.feed_bind, "DNSWATCH_CAPTURE_FEED_BIND");
        override_csv(
            &mut self.capture.replay_files,
            "DNSWATCH_CAPTURE_REPLAY_FILES",
        );
        override_usize(
            &mut self.capture.channel_capacity,
            "DNSWATCH_CAPTURE_CHANNEL_CAPACITY",
        );

        // Scope
        override_string(&mut self.scope.file, "DNSWATCH_SCOPE_FILE");

        // Queries
        override_usize(
            &mut self.queries.buffer_size,
            "DNSWATCH_QUERIES_BUFFER_SIZE",
        );
        override_u64(
            &mut self.queries.flush_interval_secs,
            "DNSWATCH_QUERIES_FLUSH_INTERVAL_SECS",
        );
        override_u64(
            &mut self.queries.send_timeout_secs,
            "DNSWATCH_QUERIES_SEND_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.queries.shutdown_grace_secs,
            "DNSWATCH_QUERIES_SHUTDOWN_GRACE_SECS",
        );
        override_string(
            &mut self.queries.failed.file,
            "DNSWATCH_QUERIES_FAILED_FILE",
        );

        // Events
        override_string(&mut self.events.file, "DNSWATCH_EVENTS_FILE");
        override_u64(
            &mut self.events.poll_interval_secs,
            "DNSWATCH_EVENTS_POLL_INTERVAL_SECS",
        );
        override_string(&mut self.events.cursor_file, "DNSWATCH_EVENTS_CURSOR_FILE");

        // Metrics
        override_bool(&mut self.metrics.enabled, "DNSWATCH_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "DNSWATCH_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "DNSWATCH_METRICS_PORT");
    }

    /// 목록 값을 정규화합니다.
    ///
    /// 프로토콜과 캡처 소스는 소문자로 바꾸고 정렬 후 중복을 제거합니다.
    pub fn normalize(&mut self) {
        normalize_list(&mut self.network.protocols);
        normalize_list(&mut self.capture.sources);
        self.capture.replay_files.retain(|f| !f.trim().is_empty());
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DnswatchError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.api.validate()?;
        self.network.validate()?;
        self.capture.validate()?;

        if self.capture.live_enabled() && self.network.interface.is_empty() {
            return Err(invalid(
                "network.interface",
                "interface must not be empty when live capture is enabled",
            ));
        }

        self.queries.validate()?;
        self.events.validate()?;

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is supported",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> DnswatchError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

fn normalize_list(list: &mut Vec<String>) {
    for item in list.iter_mut() {
        *item = item.trim().to_ascii_lowercase();
    }
    list.retain(|item| !item.is_empty());
    list.sort();
    list.dedup();
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: "/var/run/dnswatch.pid".to_owned(),
        }
    }
}

/// 원격 스코어링 API 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API 서버 주소
    pub host: String,
    /// API 키 (basic auth 사용자 이름으로 전달)
    pub api_key: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl ApiConfig {
    fn validate(&self) -> Result<(), DnswatchError> {
        if self.host.is_empty() {
            return Err(invalid("api.host", "host must not be empty"));
        }
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(invalid("api.host", "host must use http or https scheme"));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(invalid("api.timeout_secs", "must be between 1 and 300"));
        }
        Ok(())
    }

    /// 요청 타임아웃
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "https://api.alphasoc.net".to_owned(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

/// 네트워크 선택 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// 캡처할 네트워크 인터페이스
    pub interface: String,
    /// 허용 프로토콜 (udp, tcp)
    pub protocols: Vec<String>,
    /// DNS 포트
    pub port: u16,
}

impl NetworkConfig {
    fn validate(&self) -> Result<(), DnswatchError> {
        if self.protocols.is_empty() || self.protocols.len() > VALID_PROTOCOLS.len() {
            return Err(invalid(
                "network.protocols",
                "must list one or two of: tcp, udp",
            ));
        }
        if let Some(bad) = self
            .protocols
            .iter()
            .find(|p| !VALID_PROTOCOLS.contains(&p.as_str()))
        {
            return Err(invalid(
                "network.protocols",
                format!("unknown protocol '{bad}' (expected tcp or udp)"),
            ));
        }
        if self.port == 0 {
            return Err(invalid("network.port", "port must be between 1 and 65535"));
        }
        Ok(())
    }

    /// 프로토콜이 허용 목록에 있는지 확인합니다 (대소문자 무시).
    pub fn accepts_protocol(&self, protocol: &str) -> bool {
        self.protocols
            .iter()
            .any(|p| p.eq_ignore_ascii_case(protocol))
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            protocols: vec!["udp".to_owned()],
            port: 53,
        }
    }
}

/// 캡처 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 활성화할 소스 (live, replay)
    pub sources: Vec<String>,
    /// 라이브 피드 UDP 바인드 주소
    pub feed_bind: String,
    /// 재생할 JSON lines 파일 목록
    pub replay_files: Vec<String>,
    /// 캡처 → 디스패처 채널 용량
    pub channel_capacity: usize,
}

impl CaptureConfig {
    fn validate(&self) -> Result<(), DnswatchError> {
        if self.sources.is_empty() {
            return Err(invalid(
                "capture.sources",
                "at least one capture source is required",
            ));
        }
        if let Some(bad) = self
            .sources
            .iter()
            .find(|s| s.as_str() != SOURCE_LIVE && s.as_str() != SOURCE_REPLAY)
        {
            return Err(invalid(
                "capture.sources",
                format!("unknown source '{bad}' (expected live or replay)"),
            ));
        }
        if self.live_enabled() && self.feed_bind.parse::<SocketAddr>().is_err() {
            return Err(invalid(
                "capture.feed_bind",
                format!("'{}' is not a socket address", self.feed_bind),
            ));
        }
        if self.replay_enabled() && self.replay_files.is_empty() {
            return Err(invalid(
                "capture.replay_files",
                "replay source requires at least one file",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(invalid(
                "capture.channel_capacity",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// 라이브 소스가 활성화되어 있는지 확인합니다.
    pub fn live_enabled(&self) -> bool {
        self.sources.iter().any(|s| s == SOURCE_LIVE)
    }

    /// 재생 소스가 활성화되어 있는지 확인합니다.
    pub fn replay_enabled(&self) -> bool {
        self.sources.iter().any(|s| s == SOURCE_REPLAY)
    }

    /// 모든 소스가 유한한지 확인합니다 (재생 전용).
    pub fn all_finite(&self) -> bool {
        !self.live_enabled()
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sources: vec![SOURCE_LIVE.to_owned()],
            feed_bind: "127.0.0.1:5353".to_owned(),
            replay_files: Vec::new(),
            channel_capacity: 4096,
        }
    }
}

/// 모니터링 스코프 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// 스코프 YAML 파일 경로 (빈 문자열이면 내장 기본 스코프 사용)
    pub file: String,
}

/// 질의 버퍼링/전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueriesConfig {
    /// 버퍼 용량 (이 크기에 도달하면 즉시 flush)
    pub buffer_size: usize,
    /// 주기적 flush 간격 (초)
    pub flush_interval_secs: u64,
    /// 단일 전송 타임아웃 (초)
    pub send_timeout_secs: u64,
    /// 종료 시 마지막 flush에 허용되는 시간 (초)
    pub shutdown_grace_secs: u64,
    /// 실패 배치 저장소 설정
    pub failed: FailedQueriesConfig,
}

impl QueriesConfig {
    fn validate(&self) -> Result<(), DnswatchError> {
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(invalid(
                "queries.buffer_size",
                format!("must be at least {MIN_BUFFER_SIZE}"),
            ));
        }
        if self.flush_interval_secs < MIN_FLUSH_INTERVAL_SECS {
            return Err(invalid(
                "queries.flush_interval_secs",
                format!("must be at least {MIN_FLUSH_INTERVAL_SECS}"),
            ));
        }
        if self.send_timeout_secs == 0 {
            return Err(invalid(
                "queries.send_timeout_secs",
                "must be at least 1",
            ));
        }
        if self.shutdown_grace_secs == 0 {
            return Err(invalid(
                "queries.shutdown_grace_secs",
                "must be at least 1",
            ));
        }
        if !self.failed.file.is_empty() {
            let parent = Path::new(&self.failed.file).parent();
            if let Some(dir) = parent.filter(|d| !d.as_os_str().is_empty())
                && !dir.is_dir()
            {
                return Err(invalid(
                    "queries.failed.file",
                    format!("directory {} does not exist", dir.display()),
                ));
            }
        }
        Ok(())
    }

    /// 주기적 flush 간격
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// 단일 전송 타임아웃
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// 종료 유예 시간
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for QueriesConfig {
    fn default() -> Self {
        Self {
            buffer_size: 65535,
            flush_interval_secs: 30,
            send_timeout_secs: 30,
            shutdown_grace_secs: 10,
            failed: FailedQueriesConfig::default(),
        }
    }
}

/// 실패 배치 저장소 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FailedQueriesConfig {
    /// 저장 파일 경로 (빈 문자열이면 저장소 비활성화)
    pub file: String,
}

/// 알림 폴링 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// 알림 출력 대상 (stdout, stderr, 파일 경로; 빈 문자열이면 폴링 비활성화)
    pub file: String,
    /// 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 커서 저장 파일 (빈 문자열이면 메모리에만 보관)
    pub cursor_file: String,
}

impl EventsConfig {
    fn validate(&self) -> Result<(), DnswatchError> {
        if self.enabled() && self.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            return Err(invalid(
                "events.poll_interval_secs",
                format!("must be at least {MIN_POLL_INTERVAL_SECS}"),
            ));
        }
        Ok(())
    }

    /// 알림 폴링이 활성화되어 있는지 확인합니다.
    pub fn enabled(&self) -> bool {
        !self.file.is_empty()
    }

    /// 폴링 주기
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            file: "stderr".to_owned(),
            poll_interval_secs: 300,
            cursor_file: String::new(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 메트릭 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 스크랩 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, kind: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                kind,
                "failed to parse number from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn replay_only() -> DnswatchConfig {
        let mut config = DnswatchConfig::default();
        config.capture.sources = vec![SOURCE_REPLAY.to_owned()];
        config.capture.replay_files = vec!["/tmp/queries.jsonl".to_owned()];
        config
    }

    #[test]
    fn default_config_has_sane_values() {
        let config = DnswatchConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.api.host, "https://api.alphasoc.net");
        assert_eq!(config.network.protocols, vec!["udp"]);
        assert_eq!(config.network.port, 53);
        assert_eq!(config.queries.buffer_size, 65535);
        assert_eq!(config.queries.flush_interval_secs, 30);
        assert_eq!(config.events.file, "stderr");
        assert_eq!(config.events.poll_interval_secs, 300);
        assert!(config.queries.failed.file.is_empty());
    }

    #[test]
    fn default_config_requires_interface_for_live_capture() {
        let config = DnswatchConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("network.interface"));
    }

    #[test]
    fn replay_only_defaults_pass_validation() {
        replay_only().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = DnswatchConfig::parse("").unwrap();
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.capture.sources, vec!["live"]);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[network]
interface = "eth0"
protocols = ["udp", "tcp"]

[queries]
buffer_size = 128

[queries.failed]
file = "/tmp/failed.dwq"
"#;
        let config = DnswatchConfig::parse(toml).unwrap();
        assert_eq!(config.network.interface, "eth0");
        assert_eq!(config.queries.buffer_size, 128);
        // flush 주기는 기본값 유지
        assert_eq!(config.queries.flush_interval_secs, 30);
        assert_eq!(config.queries.failed.file, "/tmp/failed.dwq");
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = DnswatchConfig::parse("[queries\nbuffer_size = ").unwrap_err();
        assert!(matches!(
            err,
            DnswatchError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn normalize_sorts_and_dedups_protocols() {
        let mut config = replay_only();
        config.network.protocols = vec!["UDP".to_owned(), "tcp".to_owned(), "udp".to_owned()];
        config.normalize();
        assert_eq!(config.network.protocols, vec!["tcp", "udp"]);
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unknown_protocol() {
        let mut config = replay_only();
        config.network.protocols = vec!["icmp".to_owned()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("icmp"));
    }

    #[test]
    fn validate_rejects_too_many_protocols() {
        let mut config = replay_only();
        config.network.protocols = vec!["tcp".to_owned(), "udp".to_owned(), "udp".to_owned()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_small_buffer() {
        let mut config = replay_only();
        config.queries.buffer_size = 63;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queries.buffer_size"));

        config.queries.buffer_size = 64;
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_short_flush_interval() {
        let mut config = replay_only();
        config.queries.flush_interval_secs = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_short_poll_interval_only_when_polling() {
        let mut config = replay_only();
        config.events.poll_interval_secs = 1;
        assert!(config.validate().is_err());

        config.events.file = String::new();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_missing_failed_store_directory() {
        let mut config = replay_only();
        config.queries.failed.file = "/nonexistent/dir/failed.dwq".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queries.failed.file"));
    }

    #[test]
    fn validate_accepts_existing_failed_store_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = replay_only();
        config.queries.failed.file = dir.path().join("failed.dwq").display().to_string();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_replay_without_files() {
        let mut config = replay_only();
        config.capture.replay_files.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("capture.replay_files"));
    }

    #[test]
    fn validate_rejects_bad_api_host() {
        let mut config = replay_only();
        config.api.host = "api.example.com".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn capture_finiteness() {
        assert!(!DnswatchConfig::default().capture.all_finite());
        assert!(replay_only().capture.all_finite());
    }

    #[test]
    #[serial]
    fn env_override_string_and_number() {
        // SAFETY: serial 테스트에서만 환경변수를 수정합니다.
        unsafe {
            std::env::set_var("DNSWATCH_NETWORK_INTERFACE", "ens3");
            std::env::set_var("DNSWATCH_QUERIES_BUFFER_SIZE", "256");
        }
        let mut config = DnswatchConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("DNSWATCH_NETWORK_INTERFACE");
            std::env::remove_var("DNSWATCH_QUERIES_BUFFER_SIZE");
        }
        assert_eq!(config.network.interface, "ens3");
        assert_eq!(config.queries.buffer_size, 256);
    }

    #[test]
    #[serial]
    fn env_override_invalid_number_keeps_original() {
        unsafe {
            std::env::set_var("DNSWATCH_QUERIES_FLUSH_INTERVAL_SECS", "soon");
        }
        let mut config = DnswatchConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("DNSWATCH_QUERIES_FLUSH_INTERVAL_SECS");
        }
        assert_eq!(config.queries.flush_interval_secs, 30);
    }

    #[test]
    #[serial]
    fn env_override_csv() {
        unsafe {
            std::env::set_var("DNSWATCH_NETWORK_PROTOCOLS", "tcp, udp");
        }
        let mut config = DnswatchConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("DNSWATCH_NETWORK_PROTOCOLS");
        }
        assert_eq!(config.network.protocols, vec!["tcp", "udp"]);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = DnswatchConfig::from_file("/nonexistent/dnswatch.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DnswatchError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    #[serial]
    async fn load_applies_overrides_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dnswatch.toml");
        std::fs::write(
            &path,
            "[capture]\nsources = [\"replay\"]\nreplay_files = [\"q.jsonl\"]\n",
        )
        .unwrap();

        unsafe {
            std::env::set_var("DNSWATCH_QUERIES_BUFFER_SIZE", "10");
        }
        let result = DnswatchConfig::load(&path).await;
        unsafe {
            std::env::remove_var("DNSWATCH_QUERIES_BUFFER_SIZE");
        }
        assert!(result.is_err(), "buffer_size override below minimum must fail");
    }
}
