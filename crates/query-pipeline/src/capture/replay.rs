//! 캡처 파일 재생 소스
//!
//! 줄 단위 JSON 레코드를 파일 순서대로 읽어 전달합니다. 빈 줄은 건너뛰고,
//! 디코딩에 실패한 줄은 형식 오류로 집계합니다.
//! 파일을 열 수 없으면 복구 불가능한 캡처 실패입니다.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{CaptureEvent, decode_event};
use crate::error::QueryPipelineError;
use crate::stats::PipelineStats;

/// 레이블에 쓰는 소스 종류
const SOURCE_KIND: &str = "replay";

/// 파일 재생 소스 (유한)
#[derive(Debug, Clone)]
pub struct ReplaySource {
    files: Vec<PathBuf>,
}

impl ReplaySource {
    /// 재생할 파일 목록으로 소스를 만듭니다.
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    /// 소스 이름
    pub fn name(&self) -> String {
        SOURCE_KIND.to_owned()
    }

    /// 재생 대상 파일
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// 모든 파일을 순서대로 재생합니다.
    ///
    /// 취소되거나 수신측이 닫히면 남은 레코드를 버리고 정상 종료합니다.
    pub async fn run(
        self,
        tx: mpsc::Sender<CaptureEvent>,
        stats: Arc<PipelineStats>,
        cancel: CancellationToken,
    ) -> Result<u64, QueryPipelineError> {
        let mut sent = 0u64;

        for path in &self.files {
            let capture_err = |reason: String| QueryPipelineError::Capture {
                source_name: SOURCE_KIND.to_owned(),
                reason: format!("{}: {reason}", path.display()),
            };

            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| capture_err(format!("failed to open: {e}")))?;
            let mut lines = BufReader::new(file).lines();
            tracing::info!(path = %path.display(), "replaying capture file");

            loop {
                let line = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(sent),
                    line = lines.next_line() => line,
                };
                let Some(line) = line.map_err(|e| capture_err(format!("read failed: {e}")))?
                else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let Some(event) = decode_event(line.as_bytes(), SOURCE_KIND, &stats) else {
                    continue;
                };

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(sent),
                    res = tx.send(event) => {
                        if res.is_err() {
                            tracing::debug!("dispatcher closed, stopping replay");
                            return Ok(sent);
                        }
                    }
                }
                sent += 1;
            }
        }

        Ok(sent)
    }
}
