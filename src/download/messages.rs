use crate::cache_store::CacheEntry;
use crate::domain::SongId;

/// 一次下载请求的身份；abort 之后迟到的事件按它丢弃，而不是只比较 song id
pub type AttemptId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub attempt: AttemptId,
    pub song_id: SongId,
    pub cached_bytes: u64,
    pub total_bytes: u64,
    /// 本次连接收到的字节数
    pub downloaded_bytes: u64,
    /// 本次连接已用时间
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Progress(DownloadProgress),
    Complete {
        attempt: AttemptId,
        entry: CacheEntry,
    },
    /// 致命错误，不再自动重试
    Failed {
        attempt: AttemptId,
        song_id: SongId,
        message: String,
    },
    /// 可重试错误，`delay_ms` 后自动重试
    Retrying {
        attempt: AttemptId,
        song_id: SongId,
        message: String,
        delay_ms: u64,
    },
    Evicted {
        song_id: SongId,
    },
}

impl DownloadEvent {
    pub fn attempt(&self) -> Option<AttemptId> {
        match self {
            DownloadEvent::Progress(p) => Some(p.attempt),
            DownloadEvent::Complete { attempt, .. }
            | DownloadEvent::Failed { attempt, .. }
            | DownloadEvent::Retrying { attempt, .. } => Some(*attempt),
            DownloadEvent::Evicted { .. } => None,
        }
    }

    pub fn song_id(&self) -> SongId {
        match self {
            DownloadEvent::Progress(p) => p.song_id,
            DownloadEvent::Complete { entry, .. } => entry.song_id,
            DownloadEvent::Failed { song_id, .. }
            | DownloadEvent::Retrying { song_id, .. }
            | DownloadEvent::Evicted { song_id } => *song_id,
        }
    }
}
