//! 音频播放相关错误

use std::path::PathBuf;

/// 音频播放错误类型
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// 打开音频文件失败
    #[error("打开音频文件失败({path}): {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 解码音频失败
    #[error("解码音频失败({path}): {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 音频输出流创建失败
    #[error("创建音频输出流失败: {0}")]
    OutputStream(String),

    /// 后台准备任务异常退出
    #[error("准备播放单元中断: {0}")]
    PrepareAborted(String),

    /// 播放线程已退出
    #[error("播放引擎已关闭")]
    EngineClosed,
}
