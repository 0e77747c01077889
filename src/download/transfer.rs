use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::time::{Instant, MissedTickBehavior};

use super::backoff::next_delay;
use super::files::song_file_path;
use super::manager::{DownloadManager, TransferControl};
use super::messages::{AttemptId, DownloadEvent, DownloadProgress};
use super::rate::throttle_delay;
use crate::cache_store::CacheEntry;
use crate::domain::Song;
use crate::error::{CacheError, DownloadError};

/// 每次写入并记账的块大小
const CHUNK_SIZE: usize = 8 * 1024;

enum Outcome {
    Complete(CacheEntry),
    Aborted,
}

/// 单个下载的传输任务：失败按退避无限重试，直到成功、致命错误或被 abort
pub(super) async fn run(
    mgr: Arc<DownloadManager>,
    song: Song,
    attempt: AttemptId,
    control: Arc<TransferControl>,
    dir: PathBuf,
) {
    let path = song_file_path(&dir, song.id);
    let mut backoff = Duration::ZERO;

    loop {
        if !backoff.is_zero() && !control.sleep(backoff).await {
            tracing::debug!(song_id = %song.id, attempt, "重试等待中被中止");
            return;
        }
        if !control.is_active() {
            return;
        }

        let before = cached_bytes(&mgr, &song);
        match transfer_once(&mgr, &song, attempt, &control, &path).await {
            Ok(Outcome::Complete(entry)) => {
                if mgr.finish(attempt) {
                    tracing::info!(song_id = %song.id, attempt, total = entry.total_bytes, "下载完成");
                    mgr.emit(DownloadEvent::Complete { attempt, entry }).await;
                }
                return;
            }
            Ok(Outcome::Aborted) => {
                tracing::debug!(song_id = %song.id, attempt, "传输已中止");
                return;
            }
            Err(e) if e.is_retryable() => {
                if !control.is_active() {
                    return;
                }
                let made_progress = cached_bytes(&mgr, &song) > before;
                backoff = next_delay(backoff, made_progress);
                tracing::warn!(
                    song_id = %song.id,
                    attempt,
                    err = %e,
                    delay_ms = backoff.as_millis() as u64,
                    "下载中断，稍后重试"
                );
                mgr.emit(DownloadEvent::Retrying {
                    attempt,
                    song_id: song.id,
                    message: e.to_string(),
                    delay_ms: backoff.as_millis() as u64,
                })
                .await;
            }
            Err(e) => {
                if mgr.finish(attempt) {
                    tracing::error!(song_id = %song.id, attempt, err = %e, "下载失败");
                    mgr.emit(DownloadEvent::Failed {
                        attempt,
                        song_id: song.id,
                        message: e.to_string(),
                    })
                    .await;
                }
                return;
            }
        }
    }
}

fn cached_bytes(mgr: &DownloadManager, song: &Song) -> u64 {
    mgr.store().get(song.id).map(|e| e.cached_bytes).unwrap_or(0)
}

async fn transfer_once(
    mgr: &DownloadManager,
    song: &Song,
    attempt: AttemptId,
    control: &TransferControl,
    path: &Path,
) -> Result<Outcome, DownloadError> {
    let store = mgr.store();
    let mut entry = store.get(song.id).ok_or(CacheError::NotFound(song.id))?;

    if entry.is_fully_cached() {
        if file_len(path).await == Some(entry.total_bytes) {
            return Ok(Outcome::Complete(entry));
        }
        tracing::warn!(song_id = %song.id, path = %path.display(), "缓存文件缺失或长度不符，重新下载");
        entry = store.set_cached_bytes(song.id, 0)?;
    }

    // 开始阶段
    let resume_from = entry.is_resumable().then_some(entry.cached_bytes);
    if let Some(offset) = resume_from {
        let actual = file_len(path).await.unwrap_or(0);
        if actual < offset {
            store.set_cached_bytes(song.id, 0)?;
            return Err(DownloadError::Truncated {
                path: path.to_path_buf(),
                recorded: offset,
                actual,
            });
        }
    }
    let mut req = mgr.http().get(&song.url);
    if let Some(offset) = resume_from {
        req = req.header(RANGE, format!("bytes={offset}-"));
    }
    let resp = req.send().await.map_err(DownloadError::Http)?;

    let status = resp.status();
    let (start, declared) = match (status, resume_from) {
        (StatusCode::OK, _) => {
            let len = resp.content_length().filter(|n| *n > 1).ok_or_else(|| {
                DownloadError::InvalidLength {
                    url: song.url.clone(),
                    length: resp.content_length(),
                }
            })?;
            if entry.cached_bytes > 0 {
                tracing::info!(song_id = %song.id, cached = entry.cached_bytes, "服务端未按 Range 返回，从头下载");
                store.set_cached_bytes(song.id, 0)?;
            }
            entry = store.set_total_bytes(song.id, len)?;
            (0, len)
        }
        (StatusCode::PARTIAL_CONTENT, Some(offset)) => {
            let remaining = entry.remaining_bytes();
            let len = resp.content_length().unwrap_or(remaining);
            if len != remaining {
                return Err(DownloadError::InvalidLength {
                    url: song.url.clone(),
                    length: Some(len),
                });
            }
            (offset, len)
        }
        (other, _) => {
            return Err(DownloadError::StatusCode {
                status: other,
                url: song.url.clone(),
            });
        }
    };
    tracing::debug!(song_id = %song.id, attempt, %status, start, declared, "开始接收");

    // 空间阶段
    if !mgr.make_space(declared).await? {
        return Err(DownloadError::NoSpace { needed: declared });
    }

    let mut file = open_at(path, start).await?;
    if !control.is_active() {
        return Ok(Outcome::Aborted);
    }

    // 写入阶段
    let started = Instant::now();
    let mut received = 0u64;
    let mut reported = None::<u64>;
    let mut report = |entry: &CacheEntry, received: u64| {
        if reported == Some(entry.cached_bytes) {
            return None;
        }
        reported = Some(entry.cached_bytes);
        Some(DownloadEvent::Progress(DownloadProgress {
            attempt,
            song_id: song.id,
            cached_bytes: entry.cached_bytes,
            total_bytes: entry.total_bytes,
            downloaded_bytes: received,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }))
    };

    // 让协调器尽早知道文件大小
    if let Some(evt) = report(&entry, 0) {
        mgr.emit(evt).await;
    }

    let mut ticker = tokio::time::interval(mgr.progress_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    let mut stream = resp.bytes_stream();
    loop {
        tokio::select! {
            biased;
            _ = control.cancelled() => {
                return Ok(Outcome::Aborted);
            }
            _ = ticker.tick() => {
                if let Some(evt) = report(&entry, received) {
                    mgr.emit(evt).await;
                }
            }
            item = stream.next() => {
                let Some(item) = item else { break };
                let bytes = item.map_err(DownloadError::Stream)?;
                for chunk in bytes.chunks(CHUNK_SIZE) {
                    if !control.is_active() {
                        return Ok(Outcome::Aborted);
                    }
                    write_chunk(&mut file, path, chunk).await?;
                    entry = store.add_cached_bytes(song.id, chunk.len() as u64)?;
                    received += chunk.len() as u64;

                    let limit = mgr.max_bytes_per_sec();
                    if let Some(d) = throttle_delay(received, started.elapsed(), limit) {
                        tokio::time::sleep(d).await;
                    }
                }
            }
        }
    }

    if !control.is_active() {
        return Ok(Outcome::Aborted);
    }
    if let Some(evt) = report(&entry, received) {
        mgr.emit(evt).await;
    }

    if received != declared {
        return Err(DownloadError::LengthMismatch {
            expected: declared,
            received,
        });
    }
    if !entry.is_fully_cached() {
        return Err(DownloadError::LengthMismatch {
            expected: entry.total_bytes,
            received: entry.cached_bytes,
        });
    }
    Ok(Outcome::Complete(entry))
}

async fn file_len(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

/// 打开目标文件并定位到 `start`；续传时截掉记账之后多写的尾部
async fn open_at(path: &Path, start: u64) -> Result<File, DownloadError> {
    let create_err = |source: std::io::Error| DownloadError::CreateFile {
        path: path.to_path_buf(),
        source,
    };

    if start == 0 {
        return File::create(path).await.map_err(create_err);
    }

    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(create_err)?;
    file.set_len(start).await.map_err(create_err)?;
    file.seek(SeekFrom::Start(start)).await.map_err(create_err)?;
    Ok(file)
}

async fn write_chunk(file: &mut File, path: &Path, chunk: &[u8]) -> Result<(), DownloadError> {
    let write_err = |source: std::io::Error| DownloadError::Write {
        path: path.to_path_buf(),
        source,
    };
    file.write_all(chunk).await.map_err(write_err)?;
    // 播放端会直接读这个文件，记账前必须真正写下去
    file.flush().await.map_err(write_err)?;
    Ok(())
}
