//! 스코프 매칭 엔진 -- (출발지 IP, 도메인) 쌍이 모니터링 대상인지 판정합니다.
//!
//! # 판정 규칙
//! 질의는 다음을 모두 만족하는 그룹이 하나라도 있으면 스코프 안입니다.
//! - 출발지 IP가 그룹의 포함 네트워크 중 하나에 속함
//! - 출발지 IP가 그룹의 제외 네트워크(CIDR 또는 단일 IP)에 속하지 않음
//! - 도메인이 그룹의 제외 도메인 패턴에 매칭되지 않음
//!
//! 그룹별 판정은 독립적이며 OR로 결합되므로 그룹 순서는 결과에 영향을 주지 않습니다.
//! 어떤 그룹에도 포함되지 않는 질의는 스코프 밖입니다.
//!
//! # 모듈 구성
//! - [`network`]: CIDR 파싱 및 포함 검사
//! - [`domain`]: 정확/와일드카드 도메인 패턴
//! - [`loader`]: YAML 스코프 파일 로더

pub mod domain;
pub mod loader;
pub mod network;

pub use domain::DomainPattern;
pub use loader::{DEFAULT_SCOPE, ScopeLoader};
pub use network::IpNetwork;

use std::borrow::Cow;
use std::net::IpAddr;

/// 스코프 항목 파싱 실패
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct InvalidEntry {
    /// 실패 사유
    pub reason: String,
}

impl InvalidEntry {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// 이름이 붙은 스코프 그룹
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    networks: Vec<IpNetwork>,
    exclude_networks: Vec<IpNetwork>,
    exclude_domains: Vec<DomainPattern>,
}

impl Group {
    /// 검증된 항목으로 그룹을 생성합니다.
    pub fn new(
        name: impl Into<String>,
        networks: Vec<IpNetwork>,
        exclude_networks: Vec<IpNetwork>,
        exclude_domains: Vec<DomainPattern>,
    ) -> Self {
        Self {
            name: name.into(),
            networks,
            exclude_networks,
            exclude_domains,
        }
    }

    /// 그룹 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 이 그룹이 질의를 허용하는지 확인합니다. fqdn은 정규화되어 있어야 합니다.
    pub fn admits(&self, ip: IpAddr, fqdn: &str) -> bool {
        self.networks.iter().any(|n| n.contains(ip))
            && !self.exclude_networks.iter().any(|n| n.contains(ip))
            && !self.exclude_domains.iter().any(|p| p.matches(fqdn))
    }
}

/// 스코프 리졸버
///
/// 한 번 빌드되면 변경되지 않으며, 평가는 실패하지 않습니다.
/// `Arc`로 공유되어 디스패처에서 읽기 전용으로 사용됩니다.
#[derive(Debug, Clone, Default)]
pub struct ScopeResolver {
    groups: Vec<Group>,
}

impl ScopeResolver {
    /// 그룹 목록으로 리졸버를 생성합니다.
    pub fn new(groups: Vec<Group>) -> Self {
        Self { groups }
    }

    /// 질의가 모니터링 스코프 안에 있는지 판정합니다.
    pub fn is_in_scope(&self, ip: IpAddr, fqdn: &str) -> bool {
        let fqdn = normalized(fqdn);
        self.groups.iter().any(|g| g.admits(ip, &fqdn))
    }

    /// 그룹 수
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// 그룹이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// 그룹 이름 목록
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(Group::name).collect()
    }
}

fn normalized(fqdn: &str) -> Cow<'_, str> {
    if fqdn.ends_with('.') || fqdn.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(dnswatch_core::types::normalize_fqdn(fqdn))
    } else {
        Cow::Borrowed(fqdn)
    }
}
