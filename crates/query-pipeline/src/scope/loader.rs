//! 스코프 파일 로더 -- YAML 스코프 정의를 파싱하고 검증합니다.
//!
//! 모든 항목은 리졸버를 만들기 전에 검증되며, 잘못된 항목은 그룹 이름과
//! 항목 값을 포함한 에러로 보고됩니다. 빌드된 리졸버는 평가 시점에 실패하지 않습니다.
//!
//! # 파일 형식
//! ```yaml
//! groups:
//!   office:
//!     networks: [10.0.0.0/8]
//!     exclude:
//!       networks: [10.0.0.53]
//!       domains: ["*.local", "printer.office.lan"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use dnswatch_core::config::ScopeConfig;

use super::domain::DomainPattern;
use super::network::IpNetwork;
use super::{Group, ScopeResolver};
use crate::error::QueryPipelineError;

/// 내장 기본 스코프 (사설 네트워크, 로컬 도메인 제외)
pub const DEFAULT_SCOPE: &str = r#"
groups:
  default:
    networks:
      - 10.0.0.0/8
      - 192.168.0.0/16
      - 172.16.0.0/12
      - fc00::/7
    exclude:
      domains:
        - "*.arpa"
        - "*.lan"
        - "*.local"
        - "*.internal"
"#;

/// 스코프 파일 최대 크기
const MAX_SCOPE_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// 내장 스코프의 경로 표기
const DEFAULT_SCOPE_NAME: &str = "<default>";

#[derive(Debug, Deserialize)]
struct ScopeDocument {
    #[serde(default)]
    groups: Option<BTreeMap<String, GroupDocument>>,
}

#[derive(Debug, Default, Deserialize)]
struct GroupDocument {
    #[serde(default)]
    networks: Option<Vec<String>>,
    #[serde(default)]
    exclude: Option<ExcludeDocument>,
}

#[derive(Debug, Default, Deserialize)]
struct ExcludeDocument {
    #[serde(default)]
    networks: Option<Vec<String>>,
    #[serde(default)]
    domains: Option<Vec<String>>,
}

/// 스코프 로더
pub struct ScopeLoader;

impl ScopeLoader {
    /// 설정에 따라 스코프를 로드합니다.
    ///
    /// `scope.file`이 비어 있으면 내장 기본 스코프를 사용합니다.
    pub async fn from_config(config: &ScopeConfig) -> Result<ScopeResolver, QueryPipelineError> {
        if config.file.is_empty() {
            tracing::info!("using built-in default scope");
            return Self::default_scope();
        }
        Self::load_file(&config.file).await
    }

    /// 내장 기본 스코프를 빌드합니다.
    pub fn default_scope() -> Result<ScopeResolver, QueryPipelineError> {
        Self::parse_named(DEFAULT_SCOPE, DEFAULT_SCOPE_NAME)
    }

    /// YAML 파일에서 스코프를 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<ScopeResolver, QueryPipelineError> {
        let path = path.as_ref();
        let load_err = |reason: String| QueryPipelineError::ScopeLoad {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_err(format!("failed to read file metadata: {e}")))?;
        if metadata.len() > MAX_SCOPE_FILE_SIZE {
            return Err(load_err(format!(
                "file too large: {} bytes (max {MAX_SCOPE_FILE_SIZE})",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_err(format!("failed to read file: {e}")))?;

        let resolver = Self::parse_named(&content, &path.display().to_string())?;
        tracing::info!(
            path = %path.display(),
            groups = resolver.len(),
            "loaded scope"
        );
        Ok(resolver)
    }

    /// YAML 문자열에서 스코프를 파싱합니다.
    pub fn parse(yaml: &str) -> Result<ScopeResolver, QueryPipelineError> {
        Self::parse_named(yaml, "<inline>")
    }

    fn parse_named(yaml: &str, origin: &str) -> Result<ScopeResolver, QueryPipelineError> {
        let doc: ScopeDocument =
            serde_yaml::from_str(yaml).map_err(|e| QueryPipelineError::ScopeLoad {
                path: origin.to_owned(),
                reason: e.to_string(),
            })?;

        let groups = doc
            .groups
            .unwrap_or_default()
            .into_iter()
            .map(|(name, group)| build_group(name, group))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ScopeResolver::new(groups))
    }
}

fn build_group(name: String, doc: GroupDocument) -> Result<Group, QueryPipelineError> {
    let entry_err = |entry: &str, reason: String| QueryPipelineError::Scope {
        group: name.clone(),
        entry: entry.to_owned(),
        reason,
    };

    let networks = doc
        .networks
        .unwrap_or_default()
        .iter()
        .map(|n| IpNetwork::parse_cidr(n).map_err(|e| entry_err(n.as_str(), e.reason)))
        .collect::<Result<Vec<_>, _>>()?;

    let exclude = doc.exclude.unwrap_or_default();

    let exclude_networks = exclude
        .networks
        .unwrap_or_default()
        .iter()
        .map(|n| IpNetwork::parse_cidr_or_ip(n).map_err(|e| entry_err(n.as_str(), e.reason)))
        .collect::<Result<Vec<_>, _>>()?;

    let exclude_domains = exclude
        .domains
        .unwrap_or_default()
        .iter()
        .map(|d| DomainPattern::parse(d).map_err(|e| entry_err(d.as_str(), e.reason)))
        .collect::<Result<Vec<_>, _>>()?;

    if networks.is_empty() {
        tracing::warn!(group = %name, "scope group has no networks and admits nothing");
    }

    Ok(Group::new(name, networks, exclude_networks, exclude_domains))
}
