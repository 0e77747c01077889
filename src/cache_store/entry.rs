use serde::{Deserialize, Serialize};

use crate::domain::SongId;

/// 一首歌在本地缓存中的状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub song_id: SongId,
    /// 已写入本地文件的字节数
    pub cached_bytes: u64,
    /// 服务端声明的总大小，首次成功响应前为 0
    pub total_bytes: u64,
    pub last_access_ms: u64,
}

impl CacheEntry {
    pub fn new(song_id: SongId, now_ms: u64) -> Self {
        Self {
            song_id,
            cached_bytes: 0,
            total_bytes: 0,
            last_access_ms: now_ms,
        }
    }

    pub fn is_fully_cached(&self) -> bool {
        self.total_bytes > 0 && self.cached_bytes == self.total_bytes
    }

    /// 是否可以用 Range 请求续传
    pub fn is_resumable(&self) -> bool {
        self.cached_bytes > 0 && self.cached_bytes < self.total_bytes
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.cached_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cached: u64, total: u64) -> CacheEntry {
        CacheEntry {
            song_id: SongId(1),
            cached_bytes: cached,
            total_bytes: total,
            last_access_ms: 0,
        }
    }

    #[test]
    fn fully_cached_requires_known_total() {
        assert!(!entry(0, 0).is_fully_cached());
        assert!(!entry(10, 20).is_fully_cached());
        assert!(entry(20, 20).is_fully_cached());
    }

    #[test]
    fn resumable_only_when_partial() {
        assert!(!entry(0, 100).is_resumable());
        assert!(entry(40, 100).is_resumable());
        assert!(!entry(100, 100).is_resumable());
        assert!(!entry(5, 0).is_resumable());
        assert_eq!(entry(40, 100).remaining_bytes(), 60);
    }
}
