//! 실패 배치 저장소 -- 전송에 실패한 배치를 디스크에 보관합니다.
//!
//! 파일은 추가 전용 바이너리 로그이며, 재시작 후에도 원래 순서대로 재생됩니다.
//! 모든 보관 배치가 재전송되면 파일은 헤더만 남도록 다시 쓰여집니다.
//!
//! # 파일 형식 (big-endian)
//! ```text
//! header : "DWFQ" | version u16 | reserved u16
//! record : body_len u32 | body
//! body   : batch_seq u64 | ts_micros i64 | family u8 (4|6) | ip [4|16]
//!          | rtype_len u16 | rtype | fqdn_len u16 | fqdn
//! ```
//! 레코드 하나는 질의 하나이며, 같은 `batch_seq`를 가진 연속 레코드가 한 배치입니다.
//! `xxd`, `hexdump` 같은 표준 도구로 확인할 수 있습니다.
//! 파일 끝의 잘린 레코드(쓰기 중 중단)는 저장소를 열 때 잘라 내고,
//! 이후 추가는 항상 마지막 완전한 레코드 뒤에서 시작합니다.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use chrono::DateTime;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use dnswatch_core::error::StorageError;
use dnswatch_core::types::{Query, QueryBatch};

/// 파일 매직
const MAGIC: &[u8; 4] = b"DWFQ";
/// 현재 포맷 버전
const FORMAT_VERSION: u16 = 1;
/// 헤더 길이
const HEADER_LEN: usize = 8;
/// 레코드 본문 최대 길이
const MAX_RECORD_LEN: usize = 64 * 1024;

/// 보관된 실패 배치
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBatch {
    /// 보관 순서 (단조 증가)
    pub seq: u64,
    /// 배치 내용
    pub batch: QueryBatch,
}

/// 실패 배치 저장소
///
/// 경로가 없으면 비활성화되며, 비활성 저장소의 `append`는
/// [`StorageError::Disabled`]를 반환합니다.
#[derive(Debug)]
pub struct FailedQueryStore {
    path: Option<PathBuf>,
    next_seq: u64,
    pending: usize,
    /// 마지막 완전한 레코드까지의 파일 길이
    valid_len: u64,
}

impl FailedQueryStore {
    /// 비활성 저장소를 생성합니다.
    pub fn disabled() -> Self {
        Self {
            path: None,
            next_seq: 0,
            pending: 0,
            valid_len: 0,
        }
    }

    /// 저장소를 엽니다. 기존 파일이 있으면 보관 배치 수와 다음 순번을 복원합니다.
    ///
    /// 쓰다 중단된 끝부분은 이 시점에 잘라 냅니다.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let decoded = recover(&path).await?;
        let existing = decoded.batches;

        let store = Self {
            next_seq: existing.last().map_or(0, |last| last.seq + 1),
            pending: existing.len(),
            valid_len: decoded.valid_len as u64,
            path: Some(path.clone()),
        };

        tracing::info!(
            path = %path.display(),
            pending = store.pending,
            "opened failed query store"
        );
        Ok(store)
    }

    /// 저장소 활성화 여부
    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// 저장소 파일 경로
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 디스크에 대기 중인 배치 수
    pub fn pending_batches(&self) -> usize {
        self.pending
    }

    /// 배치를 파일 끝에 추가합니다.
    ///
    /// 반환값은 부여된 순번입니다. 이전 추가가 중간에 실패했다면
    /// 그 부분을 먼저 잘라 내므로, 실패한 배치의 일부가 남지 않습니다.
    pub async fn append(&mut self, batch: &QueryBatch) -> Result<u64, StorageError> {
        let path = self.path.as_ref().ok_or(StorageError::Disabled)?;
        let seq = self.next_seq;

        // 인코딩이 실패하면 파일은 건드리지 않음
        let mut records = BytesMut::new();
        for query in batch {
            put_record(&mut records, seq, query)?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .await
            .map_err(|e| io_error(path, &e))?;
        let len = file.metadata().await.map_err(|e| io_error(path, &e))?.len();

        if len < self.valid_len {
            // 외부에서 파일이 바뀜: 실제 내용 기준으로 다시 맞춤
            drop(file);
            self.valid_len = recover(path).await?.valid_len as u64;
            file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(path)
                .await
                .map_err(|e| io_error(path, &e))?;
        } else if len > self.valid_len {
            tracing::warn!(
                path = %path.display(),
                discarded = len - self.valid_len,
                "discarding incomplete write at end of store"
            );
            file.set_len(self.valid_len)
                .await
                .map_err(|e| io_error(path, &e))?;
        }

        let mut buf = BytesMut::new();
        if self.valid_len == 0 {
            put_header(&mut buf);
        }
        buf.extend_from_slice(&records);

        file.seek(std::io::SeekFrom::Start(self.valid_len))
            .await
            .map_err(|e| io_error(path, &e))?;
        file.write_all(&buf).await.map_err(|e| io_error(path, &e))?;
        file.sync_data().await.map_err(|e| io_error(path, &e))?;

        self.valid_len += buf.len() as u64;
        self.next_seq += 1;
        self.pending += 1;
        tracing::debug!(
            path = %path.display(),
            seq,
            queries = batch.len(),
            "appended failed batch"
        );
        Ok(seq)
    }

    /// 보관된 배치를 순서대로 읽습니다.
    ///
    /// 비활성 저장소나 아직 없는 파일은 빈 목록입니다.
    pub async fn load(&self) -> Result<Vec<FailedBatch>, StorageError> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };

        let data = read_store(path).await?;
        Ok(decode(&data, path)?.batches)
    }

    /// 저장소 내용을 `remaining`으로 교체합니다.
    ///
    /// 임시 파일에 쓴 뒤 rename하므로 중간에 실패해도 기존 파일은 보존됩니다.
    /// `remaining`이 비어 있으면 헤더만 남습니다.
    pub async fn replace(&mut self, remaining: &[FailedBatch]) -> Result<(), StorageError> {
        let path = self.path.as_ref().ok_or(StorageError::Disabled)?;

        let mut buf = BytesMut::new();
        put_header(&mut buf);
        for failed in remaining {
            for query in &failed.batch {
                put_record(&mut buf, failed.seq, query)?;
            }
        }

        let tmp = tmp_path(path);
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| io_error(&tmp, &e))?;
        file.write_all(&buf).await.map_err(|e| io_error(&tmp, &e))?;
        file.sync_all().await.map_err(|e| io_error(&tmp, &e))?;
        drop(file);
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| io_error(path, &e))?;

        self.pending = remaining.len();
        self.valid_len = buf.len() as u64;
        tracing::debug!(
            path = %path.display(),
            pending = self.pending,
            "rewrote failed query store"
        );
        Ok(())
    }
}

/// 디코딩 결과
struct Decoded {
    batches: Vec<FailedBatch>,
    /// 헤더와 완전한 레코드가 차지하는 길이
    valid_len: usize,
}

async fn read_store(path: &Path) -> Result<Vec<u8>, StorageError> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(io_error(path, &e)),
    }
}

/// 파일을 읽어 디코딩하고, 완전한 레코드 뒤의 끝부분을 잘라 냅니다.
async fn recover(path: &Path) -> Result<Decoded, StorageError> {
    let data = read_store(path).await?;
    let decoded = decode(&data, path)?;

    if decoded.valid_len < data.len() {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .await
            .map_err(|e| io_error(path, &e))?;
        file.set_len(decoded.valid_len as u64)
            .await
            .map_err(|e| io_error(path, &e))?;
        file.sync_all().await.map_err(|e| io_error(path, &e))?;
        tracing::warn!(
            path = %path.display(),
            offset = decoded.valid_len,
            discarded = data.len() - decoded.valid_len,
            "truncated incomplete record at end of store"
        );
    }
    Ok(decoded)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn io_error(path: &Path, err: &std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn put_header(buf: &mut BytesMut) {
    buf.put_slice(MAGIC);
    buf.put_u16(FORMAT_VERSION);
    buf.put_u16(0);
}

fn put_record(buf: &mut BytesMut, seq: u64, query: &Query) -> Result<(), StorageError> {
    let rtype = query.record_type().as_bytes();
    let fqdn = query.fqdn().as_bytes();
    let too_long = |field: &str| StorageError::Corrupted {
        path: String::new(),
        offset: buf.len(),
        reason: format!("{field} too long to encode"),
    };
    let rtype_len = u16::try_from(rtype.len()).map_err(|_| too_long("record type"))?;
    let fqdn_len = u16::try_from(fqdn.len()).map_err(|_| too_long("fqdn"))?;

    let ip_len = match query.source_ip() {
        IpAddr::V4(_) => 4,
        IpAddr::V6(_) => 16,
    };
    let body_len = 8 + 8 + 1 + ip_len + 2 + rtype.len() + 2 + fqdn.len();
    if body_len > MAX_RECORD_LEN {
        return Err(too_long("record"));
    }
    let body_len = u32::try_from(body_len).map_err(|_| too_long("record"))?;

    buf.put_u32(body_len);
    buf.put_u64(seq);
    buf.put_i64(query.timestamp().timestamp_micros());
    match query.source_ip() {
        IpAddr::V4(v4) => {
            buf.put_u8(4);
            buf.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            buf.put_u8(6);
            buf.put_slice(&v6.octets());
        }
    }
    buf.put_u16(rtype_len);
    buf.put_slice(rtype);
    buf.put_u16(fqdn_len);
    buf.put_slice(fqdn);
    Ok(())
}

fn decode(data: &[u8], path: &Path) -> Result<Decoded, StorageError> {
    let corrupted = |offset: usize, reason: &str| StorageError::Corrupted {
        path: path.display().to_string(),
        offset,
        reason: reason.to_owned(),
    };

    let empty = Decoded {
        batches: Vec::new(),
        valid_len: 0,
    };
    if data.is_empty() {
        return Ok(empty);
    }
    if data.len() < HEADER_LEN {
        // 헤더를 쓰다 중단된 새 파일
        let magic_len = data.len().min(MAGIC.len());
        if data[..magic_len] == MAGIC[..magic_len] {
            return Ok(empty);
        }
        return Err(corrupted(0, "missing store header"));
    }
    if &data[..4] != MAGIC {
        return Err(corrupted(0, "missing store header"));
    }
    let mut header = &data[4..HEADER_LEN];
    let version = header.get_u16();
    if version != FORMAT_VERSION {
        return Err(StorageError::UnsupportedVersion {
            path: path.display().to_string(),
            version,
        });
    }

    let mut batches: Vec<FailedBatch> = Vec::new();
    let mut current: Option<(u64, Vec<Query>)> = None;
    let mut cursor = &data[HEADER_LEN..];
    let mut valid_len = HEADER_LEN;

    while cursor.has_remaining() {
        let offset = data.len() - cursor.remaining();
        if cursor.remaining() < 4 {
            break;
        }
        let body_len = cursor.get_u32() as usize;
        if body_len > MAX_RECORD_LEN {
            return Err(corrupted(offset, "record length out of range"));
        }
        if cursor.remaining() < body_len {
            break;
        }

        let mut body = &cursor[..body_len];
        cursor.advance(body_len);
        let (seq, query) =
            decode_body(&mut body).ok_or_else(|| corrupted(offset, "malformed record"))?;
        valid_len = data.len() - cursor.remaining();

        match &mut current {
            Some((current_seq, queries)) if *current_seq == seq => queries.push(query),
            _ => {
                if let Some((seq, queries)) = current.take() {
                    batches.push(FailedBatch {
                        seq,
                        batch: QueryBatch::new(queries),
                    });
                }
                current = Some((seq, vec![query]));
            }
        }
    }

    if let Some((seq, queries)) = current {
        batches.push(FailedBatch {
            seq,
            batch: QueryBatch::new(queries),
        });
    }
    Ok(Decoded {
        batches,
        valid_len,
    })
}

fn decode_body(body: &mut &[u8]) -> Option<(u64, Query)> {
    if body.remaining() < 17 {
        return None;
    }
    let seq = body.get_u64();
    let timestamp = DateTime::from_timestamp_micros(body.get_i64())?;
    let ip = match body.get_u8() {
        4 if body.remaining() >= 4 => {
            let mut octets = [0u8; 4];
            body.copy_to_slice(&mut octets);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        6 if body.remaining() >= 16 => {
            let mut octets = [0u8; 16];
            body.copy_to_slice(&mut octets);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };
    let record_type = get_str(body)?;
    let fqdn = get_str(body)?;
    if body.has_remaining() {
        return None;
    }
    Some((seq, Query::new(timestamp, ip, record_type, &fqdn)))
}

fn get_str(body: &mut &[u8]) -> Option<String> {
    if body.remaining() < 2 {
        return None;
    }
    let len = body.get_u16() as usize;
    if body.remaining() < len {
        return None;
    }
    let s = std::str::from_utf8(&body[..len]).ok()?.to_owned();
    body.advance(len);
    Some(s)
}
