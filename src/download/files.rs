use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::SongId;

pub fn song_file_path(dir: &Path, song_id: SongId) -> PathBuf {
    dir.join(format!("{song_id}.bin"))
}

/// 删除目录下的所有普通文件，返回（文件数，字节数）
pub(super) fn clear_dir_files(dir: &Path) -> (usize, u64) {
    let mut removed_files = 0usize;
    let mut removed_bytes = 0u64;

    let Ok(rd) = fs::read_dir(dir) else {
        return (0, 0);
    };
    for ent in rd.flatten() {
        let p = ent.path();
        if p.is_dir() {
            continue;
        }
        if let Ok(md) = ent.metadata() {
            removed_bytes = removed_bytes.saturating_add(md.len());
        }
        if fs::remove_file(&p).is_ok() {
            removed_files += 1;
        }
    }

    (removed_files, removed_bytes)
}
