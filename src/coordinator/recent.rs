use lru::LruCache;
use std::num::NonZeroUsize;

use crate::domain::{Song, SongId};

/// 最近播放列表的容量
pub const RECENT_CAPACITY: usize = 10;

/// 最近播放过的歌曲，最新的在前
#[derive(Debug)]
pub struct RecentSongs {
    inner: LruCache<SongId, Song>,
}

impl Default for RecentSongs {
    fn default() -> Self {
        Self::new()
    }
}

impl RecentSongs {
    pub fn new() -> Self {
        let cap = NonZeroUsize::new(RECENT_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    pub fn touch(&mut self, song: &Song) {
        self.inner.put(song.id, song.clone());
    }

    pub fn songs(&self) -> Vec<Song> {
        self.inner.iter().map(|(_, s)| s.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: i64) -> Song {
        Song {
            id: SongId(id),
            ..Song::default()
        }
    }

    #[test]
    fn keeps_most_recent_first_and_caps() {
        let mut r = RecentSongs::new();
        for id in 0..12 {
            r.touch(&song(id));
        }
        assert_eq!(r.len(), RECENT_CAPACITY);
        r.touch(&song(5));

        let ids = r.songs().iter().map(|s| s.id.0).collect::<Vec<_>>();
        assert_eq!(ids[0], 5);
        assert_eq!(ids[1], 11);
        assert!(!ids.contains(&0));
        assert!(!ids.contains(&1));
    }
}
