//! 统一错误处理模块
//!
//! 每个子系统一个结构化错误类型，顶层由 [`AppError`] 汇总。

mod app;
mod audio;
mod cache;
mod download;

pub use app::AppError;
pub use audio::AudioError;
pub use cache::CacheError;
pub use download::DownloadError;
