use std::path::PathBuf;

/// 要播放/预备的文件
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSpec {
    pub path: PathBuf,
    /// 期望的完整文件大小
    pub total_bytes: u64,
    pub gain_db: Option<f64>,
    pub peak_amp: Option<f64>,
    pub length_ms: u64,
    /// 从该位置开始播放；缓冲不足后恢复时非零
    pub start_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Play(TrackSpec),
    /// 提前准备下一首，用于无缝切换
    Queue(TrackSpec),
    /// 丢掉已准备或正在准备的下一首
    ClearQueued,
    Pause,
    Unpause,
    TogglePause,
    Stop,
    SetLowVolume(bool),
    SetPreAmpGain(f64),
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started {
        path: PathBuf,
        streaming: bool,
    },
    Position {
        path: PathBuf,
        position_ms: u64,
        duration_ms: u64,
    },
    PauseChanged(bool),
    /// 曲目真正播放完毕
    Completed {
        path: PathBuf,
    },
    /// 播放反复追上下载，引擎已放下当前曲目；数据补上后应从 `position_ms` 继续
    Stalled {
        path: PathBuf,
        position_ms: u64,
    },
    /// 非致命错误（准备失败、缓冲不足恢复等）
    Error {
        path: Option<PathBuf>,
        message: String,
    },
    Stopped,
}
