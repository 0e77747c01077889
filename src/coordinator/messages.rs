use crate::domain::{Song, SongId};

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorCommand {
    SetPlaylist {
        songs: Vec<Song>,
        start: Option<usize>,
    },
    Append(Vec<Song>),
    Insert {
        index: usize,
        songs: Vec<Song>,
    },
    /// 删除 `[start, end)`
    RemoveRange {
        start: usize,
        end: usize,
    },
    PlayAt(usize),
    Next,
    Prev,
    Pause,
    Unpause,
    TogglePause,
    Stop,
    SetLowVolume(bool),
    SetPreAmpGain(f64),
    UpdatePolicy {
        songs_to_prefetch: usize,
        download_all: bool,
        max_bytes_per_sec: u64,
        max_cache_bytes: u64,
    },
    ClearCache,
    Shutdown,
}

/// 交给界面/通知层展示的事件
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    SongChanged {
        song: Song,
        index: usize,
    },
    PositionChanged {
        song: Song,
        position_ms: u64,
        duration_ms: u64,
    },
    PauseStateChanged(bool),
    SongFileSizeChanged {
        song: Song,
        cached_bytes: u64,
        total_bytes: u64,
    },
    PlaylistChanged(Vec<Song>),
    /// 当前播放列表播完或被清空
    PlaybackStopped,
    /// `fatal == false` 表示会自动重试
    DownloadError {
        song_id: SongId,
        message: String,
        fatal: bool,
    },
    CacheCleared {
        files: usize,
        bytes: u64,
    },
    Error(String),
}
