//! 播放引擎：当前/预备两个播放单元、音量增益、缓冲不足恢复和位置上报。

mod backend;
mod engine;
mod growing_file;
mod messages;
mod null_backend;
mod rodio_backend;
mod volume;

pub use backend::{MediaBackend, MediaHandle, PrepareRequest};
pub use engine::{AudioBackend, PlaybackEngine};
pub use growing_file::{TrackFile, UNDERRUN_WAIT};
pub use messages::{PlaybackCommand, PlaybackEvent, TrackSpec};
pub use null_backend::NullBackend;
pub use rodio_backend::RodioBackend;
pub use volume::{LOW_VOLUME_FRACTION, Volume, compute_volume};
