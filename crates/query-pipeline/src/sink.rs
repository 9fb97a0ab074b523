//! 알림 출력 -- 원격 서비스의 알림을 JSON 한 줄씩 기록합니다.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;

use dnswatch_core::types::ScoredEvent;

use crate::error::QueryPipelineError;

/// 알림 출력 대상
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSink {
    /// 표준 출력
    Stdout,
    /// 표준 에러
    Stderr,
    /// 추가 모드로 여는 파일
    File(PathBuf),
}

impl EventSink {
    /// `events.file` 값으로 출력 대상을 고릅니다.
    pub fn from_target(target: &str) -> Self {
        match target {
            "stdout" => Self::Stdout,
            "stderr" => Self::Stderr,
            path => Self::File(PathBuf::from(path)),
        }
    }

    fn target_name(&self) -> String {
        match self {
            Self::Stdout => "stdout".to_owned(),
            Self::Stderr => "stderr".to_owned(),
            Self::File(path) => path.display().to_string(),
        }
    }

    /// 알림을 기록합니다. 모두 기록되어야 성공입니다.
    pub async fn write_events(&self, events: &[ScoredEvent]) -> Result<(), QueryPipelineError> {
        if events.is_empty() {
            return Ok(());
        }
        let sink_err = |reason: String| QueryPipelineError::Sink {
            target: self.target_name(),
            reason,
        };

        let mut out = Vec::new();
        for event in events {
            serde_json::to_writer(&mut out, event)
                .map_err(|e| sink_err(format!("failed to encode event: {e}")))?;
            out.push(b'\n');
        }

        let written = match self {
            Self::Stdout => {
                let mut stdout = tokio::io::stdout();
                match stdout.write_all(&out).await {
                    Ok(()) => stdout.flush().await,
                    Err(e) => Err(e),
                }
            }
            Self::Stderr => {
                let mut stderr = tokio::io::stderr();
                match stderr.write_all(&out).await {
                    Ok(()) => stderr.flush().await,
                    Err(e) => Err(e),
                }
            }
            Self::File(path) => {
                let file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await;
                match file {
                    Ok(mut file) => match file.write_all(&out).await {
                        Ok(()) => file.flush().await,
                        Err(e) => Err(e),
                    },
                    Err(e) => Err(e),
                }
            }
        };
        written.map_err(|e| sink_err(e.to_string()))
    }
}
