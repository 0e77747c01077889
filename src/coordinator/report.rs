use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::domain::SongId;

/// 播放记录上报；投递即不管，重试和持久化由实现方负责
pub trait PlayReporter: Send + Sync {
    fn report(&self, song_id: SongId, started_at: DateTime<Utc>);
}

#[derive(Debug, Default)]
pub struct LogReporter;

impl PlayReporter for LogReporter {
    fn report(&self, song_id: SongId, started_at: DateTime<Utc>) {
        tracing::info!(song_id = %song_id, started_at = %started_at.to_rfc3339(), "播放记录");
    }
}

/// 把上报转发到通道，由外部消费
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<(SongId, DateTime<Utc>)>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SongId, DateTime<Utc>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PlayReporter for ChannelReporter {
    fn report(&self, song_id: SongId, started_at: DateTime<Utc>) {
        if self.tx.send((song_id, started_at)).is_err() {
            tracing::debug!(song_id = %song_id, "播放记录接收端已关闭");
        }
    }
}
