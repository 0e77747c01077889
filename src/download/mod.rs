//! 下载管理：断点续传、限速、重试退避、LRU 淘汰和网络保活。

mod backoff;
mod files;
mod manager;
mod messages;
mod rate;
mod reservation;
mod transfer;

pub use backoff::{BACKOFF_CEILING, BACKOFF_FLOOR, next_delay};
pub use files::song_file_path;
pub use manager::{CacheStats, DownloadConfig, DownloadManager, DownloadTicket};
pub use messages::{AttemptId, DownloadEvent, DownloadProgress};
pub use rate::throttle_delay;
pub use reservation::{LogKeepAlive, NetworkKeepAlive, NetworkReservation, ReservationState};
