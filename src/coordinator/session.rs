use chrono::{DateTime, Utc};

use crate::domain::{Song, SongId};
use crate::download::AttemptId;

/// 正在进行的下载对应播放列表中的哪一项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSlot {
    pub index: usize,
    pub song_id: SongId,
    pub attempt: AttemptId,
}

/// 播放追上下载时的位置，以及当时已缓存的字节数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalledAt {
    pub position_ms: u64,
    pub cached_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub removed_current: bool,
    /// 被移除的下载（需要 abort）
    pub removed_download: Option<SongId>,
}

/// 当前播放会话：播放列表、当前位置、等待数据状态和本次播放的累计时间
///
/// 由协调器独占持有，不存在全局的“正在播放”状态。
#[derive(Debug, Default)]
pub struct PlaybackSession {
    pub songs: Vec<Song>,
    pub current: Option<usize>,
    /// 当前歌曲还没下载到足够开始播放
    pub waiting: bool,
    /// 等待数据时从这里继续，而不是从头播放
    pub stalled: Option<StalledAt>,
    pub download: Option<DownloadSlot>,
    pub paused: bool,
    pub played_ms: u64,
    pub last_position_ms: Option<u64>,
    pub reported: bool,
    pub started_at: Option<DateTime<Utc>>,
}

impl PlaybackSession {
    pub fn current_song(&self) -> Option<&Song> {
        self.current.and_then(|i| self.songs.get(i))
    }

    /// 开始新的一次播放前清零累计时间
    pub fn reset_play_time(&mut self) {
        self.played_ms = 0;
        self.last_position_ms = None;
        self.reported = false;
        self.started_at = None;
    }

    /// 累加两次位置上报之间的播放时间；跳跃过大（seek/重新打开）的区间不计
    pub fn accumulate_position(&mut self, position_ms: u64, max_step_ms: u64) {
        if let Some(last) = self.last_position_ms
            && position_ms > last
            && position_ms - last <= max_step_ms
        {
            self.played_ms += position_ms - last;
        }
        self.last_position_ms = Some(position_ms);
    }

    pub fn insert(&mut self, index: usize, songs: Vec<Song>) -> usize {
        let index = index.min(self.songs.len());
        let n = songs.len();
        self.songs.splice(index..index, songs);

        if let Some(cur) = self.current.as_mut()
            && *cur >= index
        {
            *cur += n;
        }
        if let Some(slot) = self.download.as_mut()
            && slot.index >= index
        {
            slot.index += n;
        }
        index
    }

    /// 删除 `[start, end)`
    ///
    /// 删除了当前歌曲时，`current` 指向同一位置上的下一首；之后没有歌曲时清空。
    pub fn remove_range(&mut self, start: usize, end: usize) -> RemoveOutcome {
        let end = end.min(self.songs.len());
        if start >= end {
            return RemoveOutcome::default();
        }
        let n = end - start;
        self.songs.drain(start..end);

        let mut outcome = RemoveOutcome::default();
        if let Some(cur) = self.current {
            if (start..end).contains(&cur) {
                outcome.removed_current = true;
                self.current = (start < self.songs.len()).then_some(start);
            } else if cur >= end {
                self.current = Some(cur - n);
            }
        }
        if let Some(slot) = self.download {
            if (start..end).contains(&slot.index) {
                outcome.removed_download = Some(slot.song_id);
                self.download = None;
            } else if slot.index >= end {
                self.download = Some(DownloadSlot {
                    index: slot.index - n,
                    ..slot
                });
            }
        }
        outcome
    }
}
