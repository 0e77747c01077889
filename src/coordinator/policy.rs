use crate::cache_store::CacheEntry;

/// 未完整缓存时，至少要有这么多字节才考虑开始播放
pub const MIN_BYTES_BEFORE_PLAYING: u64 = 128_000;
/// 估算下载完成时间时额外留出的余量
pub const EXTRA_BUFFER_MS: u64 = 10_000;
/// 播放超过这个时长（或曲长一半）即算一次有效播放
pub const REPORT_THRESHOLD_MS: u64 = 240_000;

/// 判断已下载的数据是否足够开始播放
///
/// 按本次连接的平均速率估算剩余部分的下载时间，加上余量后不能超过歌曲时长，
/// 否则播放会追上下载进度。
pub fn can_start_playback(
    entry: &CacheEntry,
    downloaded_bytes: u64,
    elapsed_ms: u64,
    song_length_sec: u32,
) -> bool {
    if entry.is_fully_cached() {
        return true;
    }
    if entry.cached_bytes < MIN_BYTES_BEFORE_PLAYING {
        return false;
    }
    if entry.total_bytes == 0 || downloaded_bytes == 0 || elapsed_ms == 0 || song_length_sec == 0 {
        return false;
    }

    let remaining = u128::from(entry.remaining_bytes());
    let remaining_ms = remaining * u128::from(elapsed_ms) / u128::from(downloaded_bytes);
    let song_ms = u128::from(song_length_sec) * 1000;
    remaining_ms + u128::from(EXTRA_BUFFER_MS) <= song_ms
}

/// 播放追上下载之后，至少再攒够起播门槛的数据才继续，避免马上又停下
pub fn can_resume_after_stall(entry: &CacheEntry, cached_at_stall: u64) -> bool {
    entry.is_fully_cached()
        || entry.cached_bytes >= cached_at_stall.saturating_add(MIN_BYTES_BEFORE_PLAYING)
}

/// 一首歌需要累计播放多久才上报
pub fn report_threshold_ms(length_ms: u64) -> u64 {
    if length_ms == 0 {
        return REPORT_THRESHOLD_MS;
    }
    (length_ms / 2).min(REPORT_THRESHOLD_MS)
}
