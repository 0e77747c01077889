use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;

use super::paths::AppPaths;
use crate::cache_store::CacheStore;
use crate::coordinator::{
    CoordinatorCommand, CoordinatorConfig, LogReporter, PlaybackCoordinator, UiEvent,
};
use crate::domain::Song;
use crate::download::{CacheStats, DownloadConfig, DownloadEvent, DownloadManager, LogKeepAlive};
use crate::error::AppError;
use crate::playback::{AudioBackend, PlaybackEngine};
use crate::settings::AppSettings;

fn open_downloads(
    paths: &AppPaths,
    settings: &AppSettings,
) -> Result<(Arc<DownloadManager>, mpsc::Receiver<DownloadEvent>), AppError> {
    let store = Arc::new(CacheStore::open(&paths.index_dir())?);
    let (downloads, rx_download) = DownloadManager::new(
        store,
        DownloadConfig::from_settings(settings),
        Arc::new(LogKeepAlive),
    );
    downloads.start_ready_wait(paths.music_dir())?;
    Ok((downloads, rx_download))
}

/// 播放整个列表，直到播完或收到 Ctrl-C
pub async fn play(
    paths: &AppPaths,
    settings: &AppSettings,
    songs: Vec<Song>,
    start: usize,
    backend: AudioBackend,
) -> Result<(), AppError> {
    if songs.is_empty() {
        return Err(AppError::Other("播放列表为空".to_owned()));
    }
    if start >= songs.len() {
        return Err(AppError::Other(format!(
            "起始位置 {start} 超出播放列表长度 {}",
            songs.len()
        )));
    }

    let (downloads, rx_download) = open_downloads(paths, settings)?;
    let (engine, rx_playback) = PlaybackEngine::spawn(backend, settings.pre_amp_gain_db).await?;
    let (coordinator, mut rx_ui) = PlaybackCoordinator::new(
        downloads,
        engine.sender(),
        Arc::new(LogReporter),
        CoordinatorConfig::from_settings(settings),
    );

    let (tx_cmd, rx_cmd) = mpsc::channel::<CoordinatorCommand>(64);
    let actor = tokio::spawn(coordinator.run(rx_cmd, rx_download, rx_playback));

    tx_cmd
        .send(CoordinatorCommand::SetPlaylist {
            songs,
            start: Some(start),
        })
        .await
        .map_err(|_| AppError::Other("播放协调器已退出".to_owned()))?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        select! {
            _ = &mut ctrl_c => {
                tracing::info!("收到 Ctrl-C，退出");
                break;
            }
            maybe_evt = rx_ui.recv() => {
                let Some(evt) = maybe_evt else {
                    break;
                };
                if let Some(line) = describe_event(&evt) {
                    println!("{line}");
                }
                if evt == UiEvent::PlaybackStopped {
                    break;
                }
            }
        }
    }

    let _ = tx_cmd.send(CoordinatorCommand::Shutdown).await;
    // 协调器退出时还会发事件，先放掉接收端免得它卡在发送上
    drop(rx_ui);
    if let Err(e) = actor.await {
        tracing::warn!(err = %e, "播放协调器异常退出");
    }
    engine.quit().await;
    Ok(())
}

pub async fn cache_stats(paths: &AppPaths, settings: &AppSettings) -> Result<CacheStats, AppError> {
    let (downloads, _rx) = open_downloads(paths, settings)?;
    Ok(downloads.cache_stats())
}

pub async fn cache_clear(paths: &AppPaths, settings: &AppSettings) -> Result<(usize, u64), AppError> {
    let (downloads, rx) = open_downloads(paths, settings)?;
    drop(rx);
    Ok(downloads.clear().await?)
}

pub fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes < 1024 * 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MiB", bytes as f64 / MIB)
    }
}

/// 把界面事件转成一行终端输出；位置和下载进度太频繁，只打印关键节点
pub fn describe_event(evt: &UiEvent) -> Option<String> {
    match evt {
        UiEvent::SongChanged { song, index } => {
            Some(format!("▶ [{}] {}", index + 1, song.display_title()))
        }
        UiEvent::PositionChanged { .. } => None,
        UiEvent::PauseStateChanged(paused) => {
            Some(if *paused { "已暂停" } else { "继续播放" }.to_owned())
        }
        UiEvent::SongFileSizeChanged {
            song,
            cached_bytes,
            total_bytes,
        } => (*total_bytes > 0 && cached_bytes == total_bytes).then(|| {
            format!(
                "  已缓存 {} ({})",
                song.display_title(),
                format_bytes(*total_bytes)
            )
        }),
        UiEvent::PlaylistChanged(songs) => Some(format!("播放列表: {} 首", songs.len())),
        UiEvent::PlaybackStopped => Some("播放结束".to_owned()),
        UiEvent::DownloadError {
            song_id,
            message,
            fatal,
        } => Some(if *fatal {
            format!("下载失败 {song_id}: {message}")
        } else {
            format!("下载出错 {song_id}，稍后重试: {message}")
        }),
        UiEvent::CacheCleared { files, bytes } => Some(format!(
            "缓存已清空: {files} 个文件，{}",
            format_bytes(*bytes)
        )),
        UiEvent::Error(e) => Some(format!("错误: {e}")),
    }
}
