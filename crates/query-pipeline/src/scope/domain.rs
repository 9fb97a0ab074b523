//! 도메인 패턴 매칭
//!
//! 패턴은 정확한 도메인(`site.net`) 또는 와일드카드(`*.local`)입니다.
//! 와일드카드 `*.<suffix>`는 `suffix` 자체와 `.<suffix>`로 끝나는 모든 이름에
//! 매칭됩니다. 매칭 대상 fqdn은 소문자이며 끝의 점이 제거되어 있어야 합니다.

use std::fmt;

use super::InvalidEntry;

/// 도메인 이름 최대 길이 (끝의 점 제외)
const MAX_NAME_LEN: usize = 253;
/// 레이블 최대 길이
const MAX_LABEL_LEN: usize = 63;

/// 제외 도메인 패턴
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DomainPattern {
    /// 정확히 일치하는 도메인
    Exact(String),
    /// `*.<suffix>` 와일드카드 (suffix만 저장)
    Wildcard(String),
}

impl DomainPattern {
    /// 패턴 문자열을 파싱합니다. 대소문자와 끝의 점은 정규화됩니다.
    pub fn parse(s: &str) -> Result<Self, InvalidEntry> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = lowered.strip_suffix('.').unwrap_or(&lowered);

        if let Some(suffix) = name.strip_prefix("*.") {
            if !is_domain_name(suffix) {
                return Err(InvalidEntry::new("not a valid wildcard domain pattern"));
            }
            return Ok(Self::Wildcard(suffix.to_owned()));
        }

        if !is_domain_name(name) {
            return Err(InvalidEntry::new("not a valid domain name"));
        }
        Ok(Self::Exact(name.to_owned()))
    }

    /// 정규화된 fqdn이 패턴에 매칭되는지 확인합니다.
    pub fn matches(&self, fqdn: &str) -> bool {
        match self {
            Self::Exact(name) => fqdn == name,
            Self::Wildcard(suffix) => {
                fqdn == suffix
                    || fqdn
                        .strip_suffix(suffix.as_str())
                        .is_some_and(|head| head.ends_with('.'))
            }
        }
    }
}

impl fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(name) => write!(f, "{name}"),
            Self::Wildcard(suffix) => write!(f, "*.{suffix}"),
        }
    }
}

/// 문자열이 유효한 DNS 이름인지 확인합니다.
///
/// - 레이블은 1~63자, 영숫자와 `-`, `_`만 허용
/// - 레이블은 `-`로 시작하거나 끝날 수 없음
/// - 전체 길이 253자 이하 (끝의 점 하나 허용)
/// - 숫자로만 이루어진 이름은 거부
pub fn is_domain_name(s: &str) -> bool {
    let name = s.strip_suffix('.').unwrap_or(s);
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }

    let mut non_numeric = false;
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return false;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        for b in label.bytes() {
            match b {
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'-' => non_numeric = true,
                b'0'..=b'9' => {}
                _ => return false,
            }
        }
    }
    non_numeric
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_suffix_and_subdomains() {
        let p = DomainPattern::parse("*.local").unwrap();
        assert!(p.matches("a.local"));
        assert!(p.matches("a.b.local"));
        assert!(p.matches("local"));
        assert!(!p.matches("locals"));
        assert!(!p.matches("alocal"));
        assert!(!p.matches("a.local.com"));
    }

    #[test]
    fn exact_matches_only_itself() {
        let p = DomainPattern::parse("site.net").unwrap();
        assert!(p.matches("site.net"));
        assert!(!p.matches("www.site.net"));
        assert!(!p.matches("site.network"));
    }

    #[test]
    fn parse_normalizes_case_and_trailing_dot() {
        assert_eq!(
            DomainPattern::parse("Site.NET.").unwrap(),
            DomainPattern::Exact("site.net".to_owned())
        );
        assert_eq!(
            DomainPattern::parse("*.Corp.Example").unwrap(),
            DomainPattern::Wildcard("corp.example".to_owned())
        );
    }

    #[test]
    fn display_round_trips_wildcard_form() {
        let p = DomainPattern::parse("*.internal").unwrap();
        assert_eq!(p.to_string(), "*.internal");
    }

    #[test]
    fn rejects_invalid_patterns() {
        assert!(DomainPattern::parse("").is_err());
        assert!(DomainPattern::parse("*").is_err());
        assert!(DomainPattern::parse("*.").is_err());
        assert!(DomainPattern::parse("a*.local").is_err());
        assert!(DomainPattern::parse("*.*.local").is_err());
        assert!(DomainPattern::parse("bad domain.com").is_err());
        assert!(DomainPattern::parse("-lead.com").is_err());
    }

    #[test]
    fn domain_name_rules() {
        assert!(is_domain_name("example.com"));
        assert!(is_domain_name("example.com."));
        assert!(is_domain_name("_dmarc.example.com"));
        assert!(is_domain_name("xn--80ak6aa92e.com"));
        assert!(is_domain_name("arpa"));
        assert!(!is_domain_name("123.456"));
        assert!(!is_domain_name("a..b"));
        assert!(!is_domain_name(&"a".repeat(64)));
        assert!(!is_domain_name(&format!("{}.com", ["abc"; 70].join("."))));
        assert!(!is_domain_name("trail-.com"));
    }
}
