//! 에러 타입 -- 도메인별 에러 정의

/// dnswatch 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum DnswatchError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 원격 스코어링 서비스 클라이언트 에러
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// 실패 배치 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
///
/// 스코프 파일의 잘못된 CIDR/IP/도메인 패턴도 여기에 속합니다.
/// 모든 설정 에러는 기동 시점에 치명적입니다.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,

    /// 캡처 소스의 복구 불가능한 실패
    #[error("capture source '{source_name}' failed: {reason}")]
    CaptureFailed { source_name: String, reason: String },
}

/// 원격 스코어링 서비스 클라이언트 에러
///
/// 코어는 단일 호출을 재시도하지 않습니다. 이 에러를 받으면
/// 배치 단위로 저장 후 다음 사이클에 재전송할지만 결정합니다.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// API 키가 설정되지 않음
    #[error("api key is not set")]
    NoApiKey,

    /// 전송 계층 실패 (연결 거부, DNS 실패 등)
    #[error("transport error: {0}")]
    Transport(String),

    /// 응답 대기 시간 초과
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// 2xx 이외의 응답
    #[error("unexpected status {code}: {message}")]
    Status { code: u16, message: String },

    /// 응답 본문 디코딩 실패
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// 실패 배치 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 저장 경로가 설정되지 않아 저장소가 비활성화됨
    #[error("failed query store is disabled (no file configured)")]
    Disabled,

    /// 파일 I/O 실패
    #[error("io error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// 레코드 형식 손상
    #[error("corrupted store {path} at offset {offset}: {reason}")]
    Corrupted {
        path: String,
        offset: usize,
        reason: String,
    },

    /// 지원하지 않는 파일 포맷 버전
    #[error("unsupported store format version {version} in {path}")]
    UnsupportedVersion { path: String, version: u16 },
}
