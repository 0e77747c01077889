//! 缓存记录存储相关错误

use std::path::PathBuf;

use crate::domain::SongId;

/// 缓存操作错误类型
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// 缓存目录不可用
    #[error("缓存目录不可用({path}): {source}")]
    DirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 条目不存在
    #[error("缓存条目不存在: {0}")]
    NotFound(SongId),

    /// 写入缓存记录失败（已提交的状态保持不变）
    #[error("保存缓存记录失败({song_id}): {source}")]
    SaveRecord {
        song_id: SongId,
        #[source]
        source: std::io::Error,
    },

    /// 删除缓存记录失败
    #[error("删除缓存记录失败({song_id}): {source}")]
    RemoveRecord {
        song_id: SongId,
        #[source]
        source: std::io::Error,
    },

    /// 文件操作失败
    #[error("文件操作失败: {0}")]
    FileOp(#[from] std::io::Error),

    /// 序列化失败
    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = CacheError::NotFound(SongId(42));
        assert_eq!(err.to_string(), "缓存条目不存在: 42");
    }

    #[test]
    fn test_save_record_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "只读文件系统");
        let err = CacheError::SaveRecord {
            song_id: SongId(3),
            source: io_err,
        };
        assert!(err.to_string().contains("只读文件系统"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
