//! 整条链路：mockito 服务端 → DownloadManager → PlaybackCoordinator → 静音播放引擎

use cacheplay::cache_store::CacheStore;
use cacheplay::coordinator::{
    CoordinatorCommand, CoordinatorConfig, LogReporter, PlaybackCoordinator, UiEvent,
};
use cacheplay::domain::{Song, SongId};
use cacheplay::download::{DownloadConfig, DownloadManager, LogKeepAlive};
use cacheplay::playback::{AudioBackend, PlaybackCommand, PlaybackEngine, PlaybackEvent, TrackSpec};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(20);

async fn next_event<T>(rx: &mut mpsc::Receiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("等待事件超时")
        .expect("通道已关闭")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn null_engine_plays_complete_file_to_the_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("1.bin");
    fs::write(&path, vec![0u8; 4_096]).expect("write");

    let (engine, mut rx) = PlaybackEngine::spawn(AudioBackend::Null, 0.0)
        .await
        .expect("spawn");
    engine
        .send(PlaybackCommand::Play(TrackSpec {
            path: path.clone(),
            total_bytes: 4_096,
            gain_db: None,
            peak_amp: None,
            length_ms: 300,
            start_ms: 0,
        }))
        .await
        .expect("send");

    assert_eq!(
        next_event(&mut rx).await,
        PlaybackEvent::Started {
            path: path.clone(),
            streaming: false,
        }
    );
    loop {
        match next_event(&mut rx).await {
            PlaybackEvent::Completed { path: done } => {
                assert_eq!(done, path);
                break;
            }
            PlaybackEvent::Position { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }
    engine.quit().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn playlist_downloads_and_plays_through() {
    let mut server = mockito::Server::new_async().await;
    let mut songs = Vec::new();
    for id in 1..=2 {
        server
            .mock("GET", format!("/song/{id}").as_str())
            .with_status(200)
            .with_body(vec![id as u8; 200_000])
            .create_async()
            .await;
        songs.push(Song {
            id: SongId(id),
            artist: "Artist".to_owned(),
            title: format!("Song {id}"),
            url: format!("{}/song/{id}", server.url()),
            length_sec: 1,
            ..Song::default()
        });
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(CacheStore::open(&dir.path().join("index")).expect("store"));
    let (downloads, rx_download) = DownloadManager::new(
        store.clone(),
        DownloadConfig::default(),
        Arc::new(LogKeepAlive),
    );
    downloads
        .start_ready_wait(dir.path().join("music"))
        .expect("ready");

    let (engine, rx_playback) = PlaybackEngine::spawn(AudioBackend::Null, 0.0)
        .await
        .expect("spawn");
    let (coordinator, mut rx_ui) = PlaybackCoordinator::new(
        downloads,
        engine.sender(),
        Arc::new(LogReporter),
        CoordinatorConfig::default(),
    );
    let (tx_cmd, rx_cmd) = mpsc::channel(16);
    let actor = tokio::spawn(coordinator.run(rx_cmd, rx_download, rx_playback));

    tx_cmd
        .send(CoordinatorCommand::SetPlaylist {
            songs,
            start: Some(0),
        })
        .await
        .expect("send");

    let mut changed = Vec::new();
    loop {
        match next_event(&mut rx_ui).await {
            UiEvent::SongChanged { index, .. } => changed.push(index),
            UiEvent::PlaybackStopped => break,
            UiEvent::DownloadError { message, .. } => panic!("download error: {message}"),
            _ => {}
        }
    }
    assert_eq!(changed, vec![0, 1]);
    for id in 1..=2 {
        let entry = store.get(SongId(id)).expect("entry");
        assert!(entry.is_fully_cached());
        assert_eq!(entry.total_bytes, 200_000);
    }

    tx_cmd
        .send(CoordinatorCommand::Shutdown)
        .await
        .expect("send");
    drop(rx_ui);
    actor.await.expect("coordinator");
    engine.quit().await;
}
