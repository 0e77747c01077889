use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::NamedTempFile;

use super::entry::CacheEntry;
use crate::clock::{Clock, SystemClock};
use crate::domain::SongId;
use crate::error::CacheError;

const RECORD_EXT: &str = "json";

/// 缓存条目存储
///
/// 每个条目对应目录下一个 `<song_id>.json` 记录，写入走临时文件 + rename，
/// 所以一次写入要么完整落盘，要么什么都不改变。读者可以并发，写者通过写锁串行，
/// 保证 `add_cached_bytes` 的增量不会丢失。
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    entries: RwLock<HashMap<SongId, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        Self::open_with_clock(dir, Arc::new(SystemClock))
    }

    pub fn open_with_clock(dir: &Path, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        fs::create_dir_all(dir).map_err(|source| CacheError::DirUnavailable {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut entries = HashMap::new();
        for ent in fs::read_dir(dir)?.flatten() {
            let path = ent.path();
            if path.extension().is_none_or(|e| e != RECORD_EXT) {
                continue;
            }
            let parsed = fs::read(&path)
                .ok()
                .and_then(|b| serde_json::from_slice::<CacheEntry>(&b).ok());
            match parsed {
                Some(entry) => {
                    entries.insert(entry.song_id, entry);
                }
                None => {
                    tracing::warn!(path = %path.display(), "缓存记录损坏，已忽略");
                    let _ = fs::remove_file(&path);
                }
            }
        }

        tracing::debug!(dir = %dir.display(), entries = entries.len(), "缓存记录已加载");
        Ok(Self {
            dir: dir.to_path_buf(),
            entries: RwLock::new(entries),
            clock,
        })
    }

    pub fn get(&self, song_id: SongId) -> Option<CacheEntry> {
        self.read().get(&song_id).cloned()
    }

    /// 新建（或重置）条目：cached=0、total=0、last_access=now
    pub fn create(&self, song_id: SongId) -> Result<CacheEntry, CacheError> {
        let mut entries = self.write();
        let entry = CacheEntry::new(song_id, self.clock.now_ms());
        self.persist(&entry)?;
        entries.insert(song_id, entry.clone());
        Ok(entry)
    }

    pub fn set_total_bytes(&self, song_id: SongId, total: u64) -> Result<CacheEntry, CacheError> {
        self.update(song_id, |e| e.total_bytes = total)
    }

    /// 原子增加已缓存字节数，永不减少
    pub fn add_cached_bytes(&self, song_id: SongId, delta: u64) -> Result<CacheEntry, CacheError> {
        self.update(song_id, |e| e.cached_bytes = e.cached_bytes.saturating_add(delta))
    }

    /// 仅在无法续传、需要从头下载时使用
    pub fn set_cached_bytes(&self, song_id: SongId, cached: u64) -> Result<CacheEntry, CacheError> {
        self.update(song_id, |e| e.cached_bytes = cached)
    }

    pub fn touch(&self, song_id: SongId) -> Result<CacheEntry, CacheError> {
        let now = self.clock.now_ms();
        self.update(song_id, |e| e.last_access_ms = now)
    }

    pub fn remove(&self, song_id: SongId) -> Result<Option<CacheEntry>, CacheError> {
        let mut entries = self.write();
        match fs::remove_file(self.record_path(song_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(CacheError::RemoveRecord { song_id, source }),
        }
        Ok(entries.remove(&song_id))
    }

    /// 按最近访问时间排序，最久未访问的在前
    pub fn list_by_age(&self) -> Vec<SongId> {
        let entries = self.read();
        let mut v = entries
            .values()
            .map(|e| (e.last_access_ms, e.song_id))
            .collect::<Vec<_>>();
        v.sort();
        v.into_iter().map(|(_, id)| id).collect()
    }

    pub fn total_cached_bytes(&self) -> u64 {
        self.read().values().map(|e| e.cached_bytes).sum()
    }

    pub fn entries(&self) -> Vec<CacheEntry> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn update(
        &self,
        song_id: SongId,
        f: impl FnOnce(&mut CacheEntry),
    ) -> Result<CacheEntry, CacheError> {
        let mut entries = self.write();
        let mut entry = entries
            .get(&song_id)
            .cloned()
            .ok_or(CacheError::NotFound(song_id))?;
        f(&mut entry);
        // 先落盘再更新内存，写失败时内存中保持旧值
        self.persist(&entry)?;
        entries.insert(song_id, entry.clone());
        Ok(entry)
    }

    fn persist(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let song_id = entry.song_id;
        let bytes = serde_json::to_vec(entry)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|source| CacheError::SaveRecord { song_id, source })?;
        tmp.write_all(&bytes)
            .map_err(|source| CacheError::SaveRecord { song_id, source })?;
        tmp.persist(self.record_path(song_id))
            .map_err(|e| CacheError::SaveRecord {
                song_id,
                source: e.error,
            })?;
        Ok(())
    }

    fn record_path(&self, song_id: SongId) -> PathBuf {
        self.dir.join(format!("{song_id}.{RECORD_EXT}"))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SongId, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SongId, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}
