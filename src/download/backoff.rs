use std::time::Duration;

pub const BACKOFF_FLOOR: Duration = Duration::from_secs(1);
pub const BACKOFF_CEILING: Duration = Duration::from_secs(60);

/// 计算下一次重试前的等待时间
///
/// 上次尝试有进展就立即重试；否则从 1s 起翻倍，封顶 60s，永不放弃。
pub fn next_delay(current: Duration, made_progress: bool) -> Duration {
    if made_progress {
        return Duration::ZERO;
    }
    current
        .saturating_mul(2)
        .clamp(BACKOFF_FLOOR, BACKOFF_CEILING)
}
