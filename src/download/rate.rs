use std::time::Duration;

/// 限速：按已写入字节数和已用时间计算还需要睡多久
///
/// `max_bytes_per_sec == 0` 表示不限速。
pub fn throttle_delay(
    bytes_written: u64,
    elapsed: Duration,
    max_bytes_per_sec: u64,
) -> Option<Duration> {
    if max_bytes_per_sec == 0 {
        return None;
    }
    let min_elapsed = Duration::from_secs_f64(bytes_written as f64 / max_bytes_per_sec as f64);
    (min_elapsed > elapsed).then(|| min_elapsed - elapsed)
}
