use std::path::PathBuf;

use super::volume::Volume;
use crate::error::AudioError;

/// 准备一个播放单元所需的信息
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareRequest {
    pub path: PathBuf,
    pub total_bytes: u64,
    /// 文件仍在下载中，需要边下边读
    pub streaming: bool,
    /// 从该位置开始播放（切换文件或缓冲不足恢复时使用）
    pub start_ms: u64,
    pub length_ms: u64,
}

/// 底层播放原语
pub trait MediaBackend: Send + Sync {
    fn prepare(&self, req: &PrepareRequest) -> Result<Box<dyn MediaHandle>, AudioError>;
}

/// 一个已准备好的媒体句柄；准备完成后处于暂停状态
pub trait MediaHandle: Send {
    fn play(&self);
    fn pause(&self);
    /// 停止并释放，之后不会再触发结束回调
    fn stop(&self);
    fn set_volume(&self, v: Volume);
    fn position_ms(&self) -> u64;
    /// 解码器实际读到的字节偏移
    fn bytes_consumed(&self) -> u64;
    /// 播放自然结束时调用一次 `on_end`
    fn watch_end(&mut self, on_end: Box<dyn FnOnce() + Send>);
}
