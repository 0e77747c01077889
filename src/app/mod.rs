//! 命令行背后的装配：数据目录布局、播放列表加载和各组件的串联
mod paths;
mod playlist;
mod runner;

pub use paths::AppPaths;
pub use playlist::{load_playlist, parse_songs};
pub use runner::{cache_clear, cache_stats, describe_event, format_bytes, play};
