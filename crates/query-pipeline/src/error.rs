//! 질의 파이프라인 에러 타입
//!
//! [`QueryPipelineError`]는 질의 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<QueryPipelineError> for DnswatchError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use dnswatch_core::error::{ClientError, ConfigError, DnswatchError, PipelineError, StorageError};

/// 질의 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum QueryPipelineError {
    /// 스코프 그룹의 잘못된 항목 (CIDR, IP, 도메인 패턴)
    #[error("scope error: group '{group}': invalid entry '{entry}': {reason}")]
    Scope {
        /// 그룹 이름
        group: String,
        /// 문제가 된 항목
        entry: String,
        /// 실패 사유
        reason: String,
    },

    /// 스코프 파일 로딩/파싱 실패
    #[error("scope load error: {path}: {reason}")]
    ScopeLoad {
        /// 스코프 파일 경로 (내장 스코프는 "<default>")
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 캡처 소스 에러
    #[error("capture error: {source_name}: {reason}")]
    Capture {
        /// 소스 식별자 (예: "live:eth0", "replay:/tmp/q.jsonl")
        source_name: String,
        /// 실패 사유
        reason: String,
    },

    /// 알림 출력 실패
    #[error("sink error: {target}: {reason}")]
    Sink {
        /// 출력 대상
        target: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 실패 배치 저장소 에러
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// 원격 클라이언트 에러
    #[error(transparent)]
    Client(#[from] ClientError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<QueryPipelineError> for DnswatchError {
    fn from(err: QueryPipelineError) -> Self {
        match err {
            QueryPipelineError::Scope {
                group,
                entry,
                reason,
            } => DnswatchError::Config(ConfigError::InvalidValue {
                field: format!("scope.groups.{group}"),
                reason: format!("'{entry}': {reason}"),
            }),
            QueryPipelineError::ScopeLoad { path, reason } => {
                DnswatchError::Config(ConfigError::ParseFailed {
                    reason: format!("scope {path}: {reason}"),
                })
            }
            QueryPipelineError::Config { field, reason } => {
                DnswatchError::Config(ConfigError::InvalidValue { field, reason })
            }
            QueryPipelineError::Capture {
                source_name,
                reason,
            } => DnswatchError::Pipeline(PipelineError::CaptureFailed {
                source_name,
                reason,
            }),
            QueryPipelineError::Storage(e) => DnswatchError::Storage(e),
            QueryPipelineError::Client(e) => DnswatchError::Client(e),
            QueryPipelineError::Io(e) => DnswatchError::Io(e),
            other => DnswatchError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_error_display_names_group_and_entry() {
        let err = QueryPipelineError::Scope {
            group: "office".to_owned(),
            entry: "10.0.0.0/33".to_owned(),
            reason: "prefix length 33 exceeds 32".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("office"));
        assert!(msg.contains("10.0.0.0/33"));
    }

    #[test]
    fn scope_error_becomes_config_error() {
        let err = QueryPipelineError::Scope {
            group: "office".to_owned(),
            entry: "bad".to_owned(),
            reason: "not a cidr".to_owned(),
        };
        let top: DnswatchError = err.into();
        match top {
            DnswatchError::Config(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "scope.groups.office");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn capture_error_becomes_capture_failed() {
        let err = QueryPipelineError::Capture {
            source_name: "live:eth0".to_owned(),
            reason: "interface disappeared".to_owned(),
        };
        let top: DnswatchError = err.into();
        assert!(matches!(
            top,
            DnswatchError::Pipeline(PipelineError::CaptureFailed { .. })
        ));
    }

    #[test]
    fn channel_error_becomes_pipeline_error() {
        let err = QueryPipelineError::Channel("receiver closed".to_owned());
        let top: DnswatchError = err.into();
        assert!(matches!(top, DnswatchError::Pipeline(_)));
    }

    #[test]
    fn storage_error_is_preserved() {
        let err: QueryPipelineError = StorageError::Disabled.into();
        let top: DnswatchError = err.into();
        assert!(matches!(top, DnswatchError::Storage(StorageError::Disabled)));
    }
}
