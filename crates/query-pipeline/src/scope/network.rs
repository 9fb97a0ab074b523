//! 네트워크 매칭 -- IPv4/IPv6 CIDR 파싱 및 포함 검사
//!
//! 주소는 정수(u32/u128)로, 프리픽스는 상위 비트 마스크로 표현합니다.
//! IPv4-mapped IPv6 주소(`::ffff:a.b.c.d`)는 IPv4 주소로 정규화한 뒤 비교합니다.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use super::InvalidEntry;

/// CIDR 네트워크 (호스트 비트는 0으로 정규화됨)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpNetwork {
    /// IPv4 네트워크
    V4 { network: u32, prefix_len: u8 },
    /// IPv6 네트워크
    V6 { network: u128, prefix_len: u8 },
}

impl IpNetwork {
    /// `a.b.c.d/nn` 또는 `x::y/nn` 형식의 CIDR을 파싱합니다.
    pub fn parse_cidr(s: &str) -> Result<Self, InvalidEntry> {
        let s = s.trim();
        let Some((addr, prefix)) = s.split_once('/') else {
            return Err(InvalidEntry::new("not a cidr (missing '/prefix')"));
        };
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| InvalidEntry::new(format!("'{addr}' is not an ip address")))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| InvalidEntry::new(format!("'{prefix}' is not a prefix length")))?;
        Self::new(ip, prefix_len)
    }

    /// CIDR 또는 단일 IP를 파싱합니다 (제외 네트워크용).
    ///
    /// 단일 IP는 /32 (IPv4) 또는 /128 (IPv6) 네트워크가 됩니다.
    pub fn parse_cidr_or_ip(s: &str) -> Result<Self, InvalidEntry> {
        let s = s.trim();
        if s.contains('/') {
            return Self::parse_cidr(s);
        }
        s.parse::<IpAddr>()
            .map(Self::host)
            .map_err(|_| InvalidEntry::new("not a cidr nor an ip address"))
    }

    /// 주소와 프리픽스 길이로 네트워크를 만듭니다. 호스트 비트는 지워집니다.
    pub fn new(ip: IpAddr, prefix_len: u8) -> Result<Self, InvalidEntry> {
        match ip {
            IpAddr::V4(v4) => {
                if prefix_len > 32 {
                    return Err(InvalidEntry::new(format!(
                        "prefix length {prefix_len} exceeds 32"
                    )));
                }
                Ok(Self::V4 {
                    network: u32::from(v4) & v4_mask(prefix_len),
                    prefix_len,
                })
            }
            IpAddr::V6(v6) => {
                if prefix_len > 128 {
                    return Err(InvalidEntry::new(format!(
                        "prefix length {prefix_len} exceeds 128"
                    )));
                }
                Ok(Self::V6 {
                    network: u128::from(v6) & v6_mask(prefix_len),
                    prefix_len,
                })
            }
        }
    }

    /// 단일 호스트 네트워크
    pub fn host(ip: IpAddr) -> Self {
        match normalize_ip(ip) {
            IpAddr::V4(v4) => Self::V4 {
                network: u32::from(v4),
                prefix_len: 32,
            },
            IpAddr::V6(v6) => Self::V6 {
                network: u128::from(v6),
                prefix_len: 128,
            },
        }
    }

    /// 주소가 이 네트워크에 포함되는지 확인합니다.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (*self, normalize_ip(ip)) {
            (Self::V4 { network, prefix_len }, IpAddr::V4(v4)) => {
                u32::from(v4) & v4_mask(prefix_len) == network
            }
            (Self::V6 { network, prefix_len }, IpAddr::V6(v6)) => {
                u128::from(v6) & v6_mask(prefix_len) == network
            }
            _ => false,
        }
    }

    /// 프리픽스 길이
    pub fn prefix_len(&self) -> u8 {
        match self {
            Self::V4 { prefix_len, .. } | Self::V6 { prefix_len, .. } => *prefix_len,
        }
    }
}

impl FromStr for IpNetwork {
    type Err = InvalidEntry;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_cidr(s)
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 {
                network,
                prefix_len,
            } => write!(f, "{}/{}", Ipv4Addr::from(*network), prefix_len),
            Self::V6 {
                network,
                prefix_len,
            } => write!(f, "{}/{}", Ipv6Addr::from(*network), prefix_len),
        }
    }
}

/// IPv4-mapped IPv6 주소를 IPv4로 변환합니다. 그 외 주소는 그대로 반환합니다.
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

fn v4_mask(prefix_len: u8) -> u32 {
    // prefix 0은 시프트 폭이 32가 되므로 0으로 처리
    u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0)
}

fn v6_mask(prefix_len: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix_len)).unwrap_or(0)
}
