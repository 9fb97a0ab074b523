//! 라이브 캡처 피드 소스
//!
//! 외부 스니퍼가 `network.interface`에서 잡은 질의를 데이터그램 하나에
//! JSON 레코드 하나로 보내면, 이 소스가 `capture.feed_bind`에서 수신합니다.
//!
//! 기동 시 인터페이스가 존재해야 하며 (`/sys/class/net/<iface>`), 실행 중에
//! 인터페이스가 사라지거나 소켓 수신이 실패하면 복구 불가능한 캡처 실패입니다.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{CaptureEvent, decode_event};
use crate::error::QueryPipelineError;
use crate::stats::PipelineStats;

/// 레이블에 쓰는 소스 종류
const SOURCE_KIND: &str = "live";

/// 최대 데이터그램 크기
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// 인터페이스 존재 재확인 주기
const INTERFACE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// UDP 피드 소스 (무한)
#[derive(Debug)]
pub struct FeedSource {
    interface: String,
    socket: UdpSocket,
    sysfs_net: PathBuf,
}

impl FeedSource {
    /// 인터페이스를 확인하고 피드 소켓을 바인드합니다.
    ///
    /// 인터페이스가 없거나 바인드에 실패하면 에러를 반환합니다.
    pub async fn bind(
        interface: &str,
        feed_bind: &str,
        sysfs_net: &Path,
    ) -> Result<Self, QueryPipelineError> {
        let source_name = format!("{SOURCE_KIND}:{interface}");
        if !interface_exists(sysfs_net, interface).await {
            return Err(QueryPipelineError::Capture {
                source_name,
                reason: format!("network interface '{interface}' does not exist"),
            });
        }

        let addr: SocketAddr = feed_bind.parse().map_err(|e| QueryPipelineError::Config {
            field: "capture.feed_bind".to_owned(),
            reason: format!("'{feed_bind}': {e}"),
        })?;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| QueryPipelineError::Capture {
                source_name,
                reason: format!("failed to bind {addr}: {e}"),
            })?;

        tracing::info!(interface, addr = %addr, "capture feed bound");
        Ok(Self {
            interface: interface.to_owned(),
            socket,
            sysfs_net: sysfs_net.to_path_buf(),
        })
    }

    /// 소스 이름
    pub fn name(&self) -> String {
        format!("{SOURCE_KIND}:{}", self.interface)
    }

    /// 실제 바인드된 주소
    pub fn local_addr(&self) -> Result<SocketAddr, QueryPipelineError> {
        Ok(self.socket.local_addr()?)
    }

    /// 취소될 때까지 데이터그램을 수신합니다.
    pub async fn run(
        self,
        tx: mpsc::Sender<CaptureEvent>,
        stats: Arc<PipelineStats>,
        cancel: CancellationToken,
    ) -> Result<u64, QueryPipelineError> {
        let failed = |reason: String| QueryPipelineError::Capture {
            source_name: self.name(),
            reason,
        };

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut sent = 0u64;
        let mut check = tokio::time::interval_at(
            tokio::time::Instant::now() + INTERFACE_CHECK_INTERVAL,
            INTERFACE_CHECK_INTERVAL,
        );

        loop {
            let len = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(sent),
                _ = check.tick() => {
                    if !interface_exists(&self.sysfs_net, &self.interface).await {
                        return Err(failed(format!(
                            "network interface '{}' disappeared",
                            self.interface
                        )));
                    }
                    continue;
                }
                res = self.socket.recv_from(&mut buf) => {
                    let (len, _peer) = res.map_err(|e| failed(format!("receive failed: {e}")))?;
                    len
                }
            };

            let Some(event) = decode_event(&buf[..len], SOURCE_KIND, &stats) else {
                continue;
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(sent),
                res = tx.send(event) => {
                    if res.is_err() {
                        tracing::debug!("dispatcher closed, stopping capture feed");
                        return Ok(sent);
                    }
                }
            }
            sent += 1;
        }
    }
}

async fn interface_exists(sysfs_net: &Path, interface: &str) -> bool {
    if interface.is_empty() || interface.contains('/') {
        return false;
    }
    tokio::fs::try_exists(sysfs_net.join(interface))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(iface: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(iface)).unwrap();
        dir
    }

    #[tokio::test]
    async fn missing_interface_refuses_to_start() {
        let sysfs = tempfile::tempdir().unwrap();
        let err = FeedSource::bind("eth9", "127.0.0.1:0", sysfs.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("eth9"));
    }

    #[tokio::test]
    async fn interface_name_with_slash_is_rejected() {
        let sysfs = fake_sysfs("eth0");
        assert!(!interface_exists(sysfs.path(), "../eth0").await);
        assert!(interface_exists(sysfs.path(), "eth0").await);
    }

    #[tokio::test]
    async fn receives_datagrams() {
        let sysfs = fake_sysfs("eth0");
        let source = FeedSource::bind("eth0", "127.0.0.1:0", sysfs.path())
            .await
            .unwrap();
        assert_eq!(source.name(), "live:eth0");
        let addr = source.local_addr().unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let stats = Arc::new(PipelineStats::default());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(source.run(tx, Arc::clone(&stats), cancel.clone()));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"garbage", addr).await.unwrap();
        client
            .send_to(
                br#"{"source_ip":"10.0.0.7","record_type":"A","fqdn":"feed.example.com"}"#,
                addr,
            )
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.fqdn, "feed.example.com");

        cancel.cancel();
        assert_eq!(handle.await.unwrap().unwrap(), 1);
        assert_eq!(stats.snapshot().malformed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disappearing_interface_is_fatal() {
        let sysfs = fake_sysfs("eth0");
        let source = FeedSource::bind("eth0", "127.0.0.1:0", sysfs.path())
            .await
            .unwrap();
        std::fs::remove_dir(sysfs.path().join("eth0")).unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let err = source
            .run(tx, Arc::new(PipelineStats::default()), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disappeared"));
    }
}
