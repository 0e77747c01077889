use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// 数据目录布局
///
/// ```text
/// {data_dir}/settings.json
/// {data_dir}/logs/
/// {data_dir}/cache/index/<song_id>.json   缓存条目记录
/// {data_dir}/cache/music/<song_id>.bin    音频文件
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub data_dir: PathBuf,
}

impl Default for AppPaths {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("dev", "cacheplay", "cacheplay")
            .map(|p| p.data_local_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("cacheplay"));
        Self { data_dir }
    }
}

impl AppPaths {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        match data_dir {
            Some(data_dir) => Self { data_dir },
            None => Self::default(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("cache").join("index")
    }

    pub fn music_dir(&self) -> PathBuf {
        self.data_dir.join("cache").join("music")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_music_dirs_are_separate() {
        let p = AppPaths::new(Some(PathBuf::from("/data")));
        assert_eq!(p.index_dir(), PathBuf::from("/data/cache/index"));
        assert_eq!(p.music_dir(), PathBuf::from("/data/cache/music"));
        assert_ne!(p.index_dir(), p.music_dir());
    }
}
