//! 应用层错误

use super::{AudioError, CacheError, DownloadError};

/// 顶层错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("解析播放列表失败: {0}")]
    Playlist(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cache_error_is_transparent() {
        let err: AppError = CacheError::NotFound(crate::domain::SongId(9)).into();
        assert_eq!(err.to_string(), "缓存条目不存在: 9");
    }
}
