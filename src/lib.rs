//! 边下边播的音乐缓存：断点续传下载、按访问时间淘汰的缓存目录、
//! 从流式读取无缝切换到完整文件的播放引擎，以及串起它们的播放协调器。

pub mod app;
pub mod cache_store;
pub mod cli;
pub mod clock;
pub mod coordinator;
pub mod domain;
pub mod download;
pub mod error;
pub mod logging;
pub mod playback;
pub mod settings;
