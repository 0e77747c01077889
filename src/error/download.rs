//! 下载相关错误

use reqwest::StatusCode;
use std::path::PathBuf;

use super::CacheError;

/// 下载错误类型
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// 构造或发送 HTTP 请求失败
    #[error("HTTP 请求失败: {0}")]
    Http(#[source] reqwest::Error),

    /// 服务端返回了 200/206 以外的状态码
    #[error("HTTP 状态码 {status}: {url}")]
    StatusCode { status: StatusCode, url: String },

    /// 200 响应缺少 Content-Length 或长度不合法
    #[error("响应长度无效({url}): {length:?}")]
    InvalidLength { url: String, length: Option<u64> },

    /// 读取响应体中断
    #[error("读取响应失败: {0}")]
    Stream(#[source] reqwest::Error),

    /// 收到的字节数与声明长度不一致
    #[error("字节数不匹配: 期望 {expected}，实际 {received}")]
    LengthMismatch { expected: u64, received: u64 },

    /// 本地文件比记录的已缓存字节短，需要从头下载
    #[error("本地文件被截断({path}): 记录 {recorded}，实际 {actual}")]
    Truncated {
        path: PathBuf,
        recorded: u64,
        actual: u64,
    },

    /// 创建/打开目标文件失败
    #[error("打开缓存文件失败({path}): {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 写入文件失败
    #[error("写入缓存文件失败({path}): {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 淘汰后仍无法腾出足够空间
    #[error("缓存空间不足: 需要 {needed} 字节")]
    NoSpace { needed: u64 },

    /// 缓存记录读写失败
    #[error("缓存记录失败: {0}")]
    Cache(#[from] CacheError),
}

impl DownloadError {
    /// 判断错误是否可重试（网络抖动类错误可以无限重试，其余视为致命）
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Http(e) => !e.is_builder() && !e.is_redirect(),
            DownloadError::Stream(_)
            | DownloadError::LengthMismatch { .. }
            | DownloadError::Truncated { .. } => true,
            DownloadError::StatusCode { .. }
            | DownloadError::InvalidLength { .. }
            | DownloadError::CreateFile { .. }
            | DownloadError::Write { .. }
            | DownloadError::NoSpace { .. }
            | DownloadError::Cache(_) => false,
        }
    }
}
