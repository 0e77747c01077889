use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tracing::Instrument;

use super::messages::{CoordinatorCommand, UiEvent};
use super::policy::{can_resume_after_stall, can_start_playback, report_threshold_ms};
use super::recent::RecentSongs;
use super::report::PlayReporter;
use super::session::{DownloadSlot, PlaybackSession, StalledAt};
use crate::cache_store::CacheEntry;
use crate::domain::Song;
use crate::download::{DownloadEvent, DownloadManager};
use crate::playback::{PlaybackCommand, PlaybackEvent, TrackSpec};
use crate::settings::AppSettings;

/// 两次位置上报之间超过这个跨度就视为跳转，不计入播放时长
const MAX_POSITION_STEP_MS: u64 = 2_000;

/// 预取策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// 当前歌曲之后预先下载几首
    pub songs_to_prefetch: usize,
    /// 不受预取窗口限制，下载后面所有歌曲
    pub download_all: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default())
    }
}

impl CoordinatorConfig {
    pub fn from_settings(s: &AppSettings) -> Self {
        Self {
            songs_to_prefetch: s.songs_to_prefetch,
            download_all: s.download_all,
        }
    }
}

/// 播放协调器：决定下载什么、什么时候开始播放，并把下载/播放事件串起来
pub struct PlaybackCoordinator {
    downloads: Arc<DownloadManager>,
    player: mpsc::Sender<PlaybackCommand>,
    ui: mpsc::Sender<UiEvent>,
    reporter: Arc<dyn PlayReporter>,
    config: CoordinatorConfig,
    session: PlaybackSession,
    recent: RecentSongs,
}

impl PlaybackCoordinator {
    pub fn new(
        downloads: Arc<DownloadManager>,
        player: mpsc::Sender<PlaybackCommand>,
        reporter: Arc<dyn PlayReporter>,
        config: CoordinatorConfig,
    ) -> (Self, mpsc::Receiver<UiEvent>) {
        let (ui, rx_ui) = mpsc::channel::<UiEvent>(256);
        (
            Self {
                downloads,
                player,
                ui,
                reporter,
                config,
                session: PlaybackSession::default(),
                recent: RecentSongs::new(),
            },
            rx_ui,
        )
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn recent(&self) -> &RecentSongs {
        &self.recent
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    pub async fn run(
        self,
        rx_cmd: mpsc::Receiver<CoordinatorCommand>,
        rx_download: mpsc::Receiver<DownloadEvent>,
        rx_playback: mpsc::Receiver<PlaybackEvent>,
    ) {
        self.event_loop(rx_cmd, rx_download, rx_playback)
            .instrument(tracing::info_span!("coordinator"))
            .await;
    }

    async fn event_loop(
        mut self,
        mut rx_cmd: mpsc::Receiver<CoordinatorCommand>,
        mut rx_download: mpsc::Receiver<DownloadEvent>,
        mut rx_playback: mpsc::Receiver<PlaybackEvent>,
    ) {
        tracing::info!("PlaybackCoordinator 已启动");
        loop {
            select! {
                maybe_cmd = rx_cmd.recv() => {
                    match maybe_cmd {
                        Some(CoordinatorCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                Some(evt) = rx_download.recv() => {
                    self.handle_download_event(evt).await;
                }
                Some(evt) = rx_playback.recv() => {
                    self.handle_playback_event(evt).await;
                }
            }
        }

        self.downloads.abort_current();
        self.send_player(PlaybackCommand::Stop).await;
        let recent = self
            .recent
            .songs()
            .iter()
            .map(Song::display_title)
            .collect::<Vec<_>>();
        tracing::info!(?recent, "PlaybackCoordinator 已退出");
    }

    pub async fn handle_command(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::SetPlaylist { songs, start } => {
                self.set_playlist(songs, start).await;
            }
            CoordinatorCommand::Append(songs) => {
                let at = self.session.songs.len();
                self.insert(at, songs).await;
            }
            CoordinatorCommand::Insert { index, songs } => self.insert(index, songs).await,
            CoordinatorCommand::RemoveRange { start, end } => self.remove_range(start, end).await,
            CoordinatorCommand::PlayAt(index) => self.play_at(index).await,
            CoordinatorCommand::Next => {
                let next = self.session.current.map_or(0, |c| c + 1);
                if next < self.session.songs.len() {
                    self.play_at(next).await;
                }
            }
            CoordinatorCommand::Prev => {
                if let Some(cur) = self.session.current {
                    self.play_at(cur.saturating_sub(1)).await;
                }
            }
            CoordinatorCommand::Pause => self.send_player(PlaybackCommand::Pause).await,
            CoordinatorCommand::Unpause => self.send_player(PlaybackCommand::Unpause).await,
            CoordinatorCommand::TogglePause => self.send_player(PlaybackCommand::TogglePause).await,
            CoordinatorCommand::Stop => self.stop().await,
            CoordinatorCommand::SetLowVolume(low) => {
                self.send_player(PlaybackCommand::SetLowVolume(low)).await;
            }
            CoordinatorCommand::SetPreAmpGain(db) => {
                self.send_player(PlaybackCommand::SetPreAmpGain(db)).await;
            }
            CoordinatorCommand::UpdatePolicy {
                songs_to_prefetch,
                download_all,
                max_bytes_per_sec,
                max_cache_bytes,
            } => {
                self.config = CoordinatorConfig {
                    songs_to_prefetch,
                    download_all,
                };
                self.downloads.set_max_bytes_per_sec(max_bytes_per_sec);
                self.downloads.set_max_cache_bytes(max_cache_bytes);
                tracing::info!(
                    songs_to_prefetch,
                    download_all,
                    max_bytes_per_sec,
                    max_cache_bytes,
                    "预取策略已更新"
                );
                if let Some(cur) = self.session.current {
                    self.maybe_download_another(cur + 1).await;
                }
            }
            CoordinatorCommand::ClearCache => {
                self.stop().await;
                self.session.download = None;
                match self.downloads.clear().await {
                    Ok((files, bytes)) => {
                        tracing::info!(files, bytes, "缓存已清空");
                        self.send_ui(UiEvent::CacheCleared { files, bytes }).await;
                    }
                    Err(e) => {
                        tracing::error!(err = %e, "清空缓存失败");
                        self.send_ui(UiEvent::Error(e.to_string())).await;
                    }
                }
            }
            CoordinatorCommand::Shutdown => {}
        }
    }

    pub async fn set_playlist(&mut self, songs: Vec<Song>, start: Option<usize>) {
        self.downloads.abort_current();
        self.downloads.clear_all_pins();
        self.session = PlaybackSession {
            songs,
            paused: self.session.paused,
            ..PlaybackSession::default()
        };
        self.send_ui(UiEvent::PlaylistChanged(self.session.songs.clone()))
            .await;
        if let Some(i) = start {
            self.play_at(i).await;
        }
    }

    /// 切到第 `index` 首
    ///
    /// 已完整缓存则立即播放并从下一首开始预取；否则停止播放，确保它在下载，
    /// 进入“等待数据”状态。两种情况都会钉住目标歌曲，且下一首已缓存时提前交给引擎准备。
    pub async fn play_at(&mut self, index: usize) {
        let Some(song) = self.session.songs.get(index).cloned() else {
            tracing::warn!(index, len = self.session.songs.len(), "播放位置越界");
            return;
        };
        tracing::info!(index, song_id = %song.id, title = %song.display_title(), "切换歌曲");

        self.session.current = Some(index);
        self.session.waiting = false;
        self.session.stalled = None;
        self.session.reset_play_time();
        self.downloads.clear_all_pins();
        self.downloads.pin(song.id);
        self.send_ui(UiEvent::SongChanged {
            song: song.clone(),
            index,
        })
        .await;

        let cached = self
            .downloads
            .store()
            .get(song.id)
            .is_some_and(|e| e.is_fully_cached());
        if cached {
            if let Some((id, _)) = self.downloads.in_progress()
                && id != song.id
            {
                self.downloads.abort(id);
                self.session.download = None;
            }
            self.start_playing(index).await;
            self.maybe_download_another(index + 1).await;
        } else {
            self.send_player(PlaybackCommand::Stop).await;
            self.session.waiting = true;
            match self.downloads.in_progress() {
                Some((id, attempt)) if id == song.id => {
                    self.session.download = Some(DownloadSlot {
                        index,
                        song_id: id,
                        attempt,
                    });
                }
                _ => self.start_download(index).await,
            }
        }

        self.queue_next(index).await;
    }

    /// 没有下载在进行时，从 `start_index` 往后找第一首没缓存的歌开始下载
    ///
    /// 只看预取窗口内的歌（`download_all` 时不限）；途中已缓存的歌都钉住，避免被后面的下载淘汰。
    pub async fn maybe_download_another(&mut self, start_index: usize) {
        if self.downloads.in_progress().is_some() {
            return;
        }
        let base = self.session.current.unwrap_or(start_index);
        for i in start_index..self.session.songs.len() {
            if !self.config.download_all && i > base + self.config.songs_to_prefetch {
                break;
            }
            let song_id = self.session.songs[i].id;
            let cached = self
                .downloads
                .store()
                .get(song_id)
                .is_some_and(|e| e.is_fully_cached());
            if cached {
                self.downloads.pin(song_id);
                continue;
            }
            self.start_download(i).await;
            return;
        }
    }

    pub async fn handle_download_event(&mut self, evt: DownloadEvent) {
        if let DownloadEvent::Evicted { song_id } = evt {
            if let Some(song) = self.session.current_song().filter(|s| s.id == song_id).cloned() {
                self.send_ui(UiEvent::SongFileSizeChanged {
                    song,
                    cached_bytes: 0,
                    total_bytes: 0,
                })
                .await;
            }
            return;
        }

        let Some(slot) = self
            .session
            .download
            .filter(|s| evt.attempt() == Some(s.attempt))
        else {
            tracing::debug!(song_id = %evt.song_id(), attempt = ?evt.attempt(), "丢弃过期的下载事件");
            return;
        };
        let song = self.session.songs.get(slot.index).cloned();

        match evt {
            DownloadEvent::Progress(p) => {
                if let Some(song) = song {
                    self.send_ui(UiEvent::SongFileSizeChanged {
                        song: song.clone(),
                        cached_bytes: p.cached_bytes,
                        total_bytes: p.total_bytes,
                    })
                    .await;

                    if self.session.waiting && self.session.current == Some(slot.index) {
                        let stalled = self.session.stalled;
                        let ready = self.downloads.store().get(p.song_id).is_some_and(|e| {
                            match stalled {
                                Some(at) => can_resume_after_stall(&e, at.cached_bytes),
                                None => can_start_playback(
                                    &e,
                                    p.downloaded_bytes,
                                    p.elapsed_ms,
                                    song.length_sec,
                                ),
                            }
                        });
                        if ready {
                            tracing::info!(
                                song_id = %p.song_id,
                                cached = p.cached_bytes,
                                total = p.total_bytes,
                                "数据足够，开始边下边播"
                            );
                            self.start_playing(slot.index).await;
                        }
                    }
                }
            }
            DownloadEvent::Complete { entry, .. } => {
                self.session.download = None;
                if let Some(song) = song {
                    self.send_ui(UiEvent::SongFileSizeChanged {
                        song,
                        cached_bytes: entry.cached_bytes,
                        total_bytes: entry.total_bytes,
                    })
                    .await;
                }
                match self.session.current {
                    Some(cur) if cur == slot.index => {
                        if self.session.waiting {
                            self.start_playing(cur).await;
                        }
                    }
                    Some(cur) if cur + 1 == slot.index => self.queue_next(cur).await,
                    _ => {}
                }
                self.maybe_download_another(slot.index + 1).await;
            }
            DownloadEvent::Failed { song_id, message, .. } => {
                self.session.download = None;
                self.send_ui(UiEvent::DownloadError {
                    song_id,
                    message,
                    fatal: true,
                })
                .await;
                self.maybe_download_another(slot.index + 1).await;
            }
            DownloadEvent::Retrying { song_id, message, .. } => {
                self.send_ui(UiEvent::DownloadError {
                    song_id,
                    message,
                    fatal: false,
                })
                .await;
            }
            DownloadEvent::Evicted { .. } => {}
        }
    }

    pub async fn handle_playback_event(&mut self, evt: PlaybackEvent) {
        match evt {
            PlaybackEvent::Position {
                path,
                position_ms,
                duration_ms,
            } => {
                let Some(song) = self.session.current_song().cloned() else {
                    return;
                };
                if path != self.downloads.song_path(song.id).await {
                    return;
                }
                self.session
                    .accumulate_position(position_ms, MAX_POSITION_STEP_MS);
                self.send_ui(UiEvent::PositionChanged {
                    song: song.clone(),
                    position_ms,
                    duration_ms,
                })
                .await;

                if !self.session.reported
                    && self.session.played_ms >= report_threshold_ms(song.length_ms())
                {
                    self.session.reported = true;
                    let started_at = self.session.started_at.unwrap_or_else(Utc::now);
                    self.reporter.report(song.id, started_at);
                }
            }
            PlaybackEvent::Completed { path } => {
                let Some(cur) = self.session.current else {
                    return;
                };
                let Some(song_id) = self.session.songs.get(cur).map(|s| s.id) else {
                    return;
                };
                if path != self.downloads.song_path(song_id).await {
                    tracing::debug!(path = %path.display(), "忽略非当前歌曲的播放结束");
                    return;
                }
                if cur + 1 < self.session.songs.len() {
                    self.play_at(cur + 1).await;
                } else {
                    tracing::info!("播放列表已播完");
                    self.finish_playback().await;
                }
            }
            PlaybackEvent::Stalled { path, position_ms } => {
                self.on_stalled(path, position_ms).await;
            }
            PlaybackEvent::PauseChanged(paused) => {
                self.session.paused = paused;
                self.send_ui(UiEvent::PauseStateChanged(paused)).await;
            }
            PlaybackEvent::Error { message, .. } => {
                self.send_ui(UiEvent::Error(message)).await;
            }
            PlaybackEvent::Started { .. } | PlaybackEvent::Stopped => {}
        }
    }

    pub async fn insert(&mut self, index: usize, songs: Vec<Song>) {
        if songs.is_empty() {
            return;
        }
        let at = self.session.insert(index, songs);
        self.send_ui(UiEvent::PlaylistChanged(self.session.songs.clone()))
            .await;

        if let Some(cur) = self.session.current {
            if at == cur + 1 {
                self.queue_next(cur).await;
            }
            self.maybe_download_another(cur + 1).await;
        }
    }

    /// 删除 `[start, end)`；删到当前歌曲时在同一位置重新开始播放（之后没歌了就停止）
    pub async fn remove_range(&mut self, start: usize, end: usize) {
        let out = self.session.remove_range(start, end);
        if let Some(song_id) = out.removed_download {
            self.downloads.abort(song_id);
        }
        self.send_ui(UiEvent::PlaylistChanged(self.session.songs.clone()))
            .await;

        if out.removed_current {
            self.send_player(PlaybackCommand::Stop).await;
            match self.session.current {
                Some(i) => self.play_at(i).await,
                None => self.finish_playback().await,
            }
        } else if let Some(cur) = self.session.current {
            self.queue_next(cur).await;
            self.maybe_download_another(cur + 1).await;
        }
    }

    /// 引擎放下了追上下载的曲目：进入等待，数据补上后从停下的位置继续
    async fn on_stalled(&mut self, path: PathBuf, position_ms: u64) {
        let Some(cur) = self.session.current else {
            return;
        };
        let Some(song_id) = self.session.songs.get(cur).map(|s| s.id) else {
            return;
        };
        if path != self.downloads.song_path(song_id).await {
            return;
        }

        let entry = self.downloads.store().get(song_id);
        let cached_bytes = entry.as_ref().map_or(0, |e| e.cached_bytes);
        tracing::warn!(song_id = %song_id, position_ms, cached_bytes, "播放追上下载，等待数据后继续");
        self.session.waiting = true;
        self.session.stalled = Some(StalledAt {
            position_ms,
            cached_bytes,
        });
        self.send_ui(UiEvent::Error("缓冲不足，等待下载后继续播放".to_owned()))
            .await;

        if entry.is_some_and(|e| e.is_fully_cached()) {
            self.start_playing(cur).await;
        } else if self.session.download.is_none_or(|s| s.index != cur) {
            self.start_download(cur).await;
        }
    }

    pub async fn stop(&mut self) {
        self.session.waiting = false;
        self.session.stalled = None;
        self.send_player(PlaybackCommand::Stop).await;
        self.send_ui(UiEvent::PlaybackStopped).await;
    }

    async fn finish_playback(&mut self) {
        self.session.current = None;
        self.session.waiting = false;
        self.session.stalled = None;
        self.session.reset_play_time();
        self.downloads.clear_all_pins();
        self.send_ui(UiEvent::PlaybackStopped).await;
    }

    async fn start_download(&mut self, index: usize) {
        let Some(song) = self.session.songs.get(index).cloned() else {
            return;
        };
        match self.downloads.download(&song).await {
            Ok(Some(ticket)) => {
                self.session.download = Some(DownloadSlot {
                    index,
                    song_id: song.id,
                    attempt: ticket.attempt,
                });
            }
            Ok(None) => {
                if let Some((id, attempt)) = self.downloads.in_progress()
                    && id == song.id
                {
                    self.session.download = Some(DownloadSlot {
                        index,
                        song_id: id,
                        attempt,
                    });
                }
            }
            Err(e) => {
                tracing::error!(song_id = %song.id, err = %e, "无法开始下载");
                self.send_ui(UiEvent::Error(e.to_string())).await;
                return;
            }
        }
        self.downloads.pin(song.id);
    }

    async fn start_playing(&mut self, index: usize) {
        let Some(song) = self.session.songs.get(index).cloned() else {
            return;
        };
        let entry = match self.downloads.store().touch(song.id) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(song_id = %song.id, err = %e, "读取缓存记录失败");
                self.send_ui(UiEvent::Error(e.to_string())).await;
                return;
            }
        };
        let mut spec = self.track_spec(&song, &entry).await;
        self.session.waiting = false;
        match self.session.stalled.take() {
            Some(at) => {
                tracing::info!(song_id = %song.id, position_ms = at.position_ms, "数据已补上，继续播放");
                spec.start_ms = at.position_ms;
            }
            None => {
                self.session.started_at = Some(Utc::now());
                self.recent.touch(&song);
            }
        }
        self.send_player(PlaybackCommand::Play(spec)).await;
    }

    /// 下一首已完整缓存时交给引擎提前准备；否则丢掉引擎里为旧的下一首准备的单元
    async fn queue_next(&mut self, index: usize) {
        let next = self.session.songs.get(index + 1).cloned();
        let ready = next.and_then(|song| {
            self.downloads
                .store()
                .get(song.id)
                .filter(CacheEntry::is_fully_cached)
                .map(|entry| (song, entry))
        });
        let Some((next, entry)) = ready else {
            self.send_player(PlaybackCommand::ClearQueued).await;
            return;
        };
        let spec = self.track_spec(&next, &entry).await;
        self.send_player(PlaybackCommand::Queue(spec)).await;
    }

    async fn track_spec(&self, song: &Song, entry: &CacheEntry) -> TrackSpec {
        TrackSpec {
            path: self.downloads.song_path(song.id).await,
            total_bytes: entry.total_bytes,
            gain_db: song.track_gain_db,
            peak_amp: song.peak_amp,
            length_ms: song.length_ms(),
            start_ms: 0,
        }
    }

    async fn send_player(&self, cmd: PlaybackCommand) {
        if self.player.send(cmd).await.is_err() {
            tracing::warn!("播放引擎已关闭");
        }
    }

    async fn send_ui(&self, evt: UiEvent) {
        if self.ui.send(evt).await.is_err() {
            tracing::debug!("界面事件接收端已关闭");
        }
    }
}
