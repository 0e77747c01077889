use reqwest::Client;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tracing::Instrument;

use super::files::{clear_dir_files, song_file_path};
use super::messages::{AttemptId, DownloadEvent};
use super::reservation::{NetworkKeepAlive, NetworkReservation, ReservationState};
use super::transfer;
use crate::cache_store::{CacheEntry, CacheStore};
use crate::domain::{Song, SongId};
use crate::error::CacheError;
use crate::settings::AppSettings;

/// 下载配置
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// 缓存目录上限（字节）
    pub max_cache_bytes: u64,
    /// 下载限速（字节/秒），0 表示不限
    pub max_bytes_per_sec: u64,
    /// HTTP 连接超时（秒）
    pub http_connect_timeout_secs: u64,
    /// HTTP 读超时（秒）
    pub http_read_timeout_secs: u64,
    /// 进度事件的最短间隔
    pub progress_interval: Duration,
    /// 下载全部结束后延迟多久释放网络保活
    pub keepalive_release_delay: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default())
    }
}

impl DownloadConfig {
    pub fn from_settings(s: &AppSettings) -> Self {
        Self {
            max_cache_bytes: s.cache_max_mb.saturating_mul(1024).saturating_mul(1024),
            max_bytes_per_sec: s.max_download_bytes_per_sec,
            http_connect_timeout_secs: s.http_connect_timeout_secs,
            http_read_timeout_secs: s.http_read_timeout_secs,
            progress_interval: Duration::from_millis(s.progress_interval_ms.max(1)),
            keepalive_release_delay: Duration::from_secs(s.keepalive_release_delay_secs),
        }
    }
}

/// `download` 成功调度后的回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTicket {
    pub attempt: AttemptId,
    pub entry: CacheEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub fully_cached: usize,
    pub cached_bytes: u64,
    pub max_cache_bytes: u64,
}

/// 单个传输任务的取消标志；在块边界和重试睡眠前检查
pub(super) struct TransferControl {
    active: AtomicBool,
    notify: Notify,
}

impl TransferControl {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(true),
            notify: Notify::new(),
        })
    }

    pub(super) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// 在 abort 时完成
    pub(super) async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.is_active() {
            return;
        }
        notified.await;
    }

    /// 可被 abort 打断的睡眠，返回睡醒后是否仍然有效
    pub(super) async fn sleep(&self, d: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(d) => self.is_active(),
            _ = self.cancelled() => false,
        }
    }
}

struct ActiveTransfer {
    song_id: SongId,
    attempt: AttemptId,
    control: Arc<TransferControl>,
}

struct State {
    active: Option<ActiveTransfer>,
    pinned: HashSet<SongId>,
    next_attempt: AttemptId,
    max_cache_bytes: u64,
    max_bytes_per_sec: u64,
}

/// 下载管理器
///
/// 同一时间最多一个传输任务在跑；进度/完成/失败/淘汰通过事件通道按发生顺序送出。
pub struct DownloadManager {
    store: Arc<CacheStore>,
    http: Client,
    progress_interval: Duration,
    ready_tx: watch::Sender<Option<PathBuf>>,
    state: Mutex<State>,
    reservation: Arc<NetworkReservation>,
    tx_evt: mpsc::Sender<DownloadEvent>,
}

impl DownloadManager {
    pub fn new(
        store: Arc<CacheStore>,
        config: DownloadConfig,
        keepalive: Arc<dyn NetworkKeepAlive>,
    ) -> (Arc<Self>, mpsc::Receiver<DownloadEvent>) {
        let (tx_evt, rx_evt) = mpsc::channel::<DownloadEvent>(256);

        // 音频需要精确的 Content-Length 和 Range 语义，关闭自动解压
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.http_connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.http_read_timeout_secs))
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .unwrap_or_else(|e| {
                tracing::error!(err = %e, "初始化 HTTP 客户端失败");
                Client::new()
            });

        tracing::info!(
            max_cache_bytes = config.max_cache_bytes,
            max_bytes_per_sec = config.max_bytes_per_sec,
            connect_timeout_secs = config.http_connect_timeout_secs,
            read_timeout_secs = config.http_read_timeout_secs,
            "DownloadManager 已创建"
        );

        let manager = Arc::new(Self {
            store,
            http,
            progress_interval: config.progress_interval,
            ready_tx: watch::Sender::new(None),
            state: Mutex::new(State {
                active: None,
                pinned: HashSet::new(),
                next_attempt: 0,
                max_cache_bytes: config.max_cache_bytes,
                max_bytes_per_sec: config.max_bytes_per_sec,
            }),
            reservation: NetworkReservation::new(keepalive, config.keepalive_release_delay),
            tx_evt,
        });
        (manager, rx_evt)
    }

    /// 后台初始化（确定音乐文件目录）完成；在此之前其它操作都会等待
    pub fn start_ready_wait(&self, music_dir: PathBuf) -> Result<(), CacheError> {
        std::fs::create_dir_all(&music_dir).map_err(|source| CacheError::DirUnavailable {
            path: music_dir.clone(),
            source,
        })?;
        tracing::info!(dir = %music_dir.display(), "下载目录就绪");
        self.ready_tx.send_replace(Some(music_dir));
        Ok(())
    }

    pub async fn music_dir(&self) -> PathBuf {
        let mut rx = self.ready_tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(dir) => dir.clone().unwrap_or_default(),
            // 发送端由 self 持有，不会先于接收端关闭
            Err(_) => PathBuf::new(),
        }
    }

    pub async fn song_path(&self, song_id: SongId) -> PathBuf {
        song_file_path(&self.music_dir().await, song_id)
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// 调度一首歌的下载
    ///
    /// 该歌曲已在下载时返回 `None`，不会产生第二个传输任务。
    /// 若正在下载的是另一首，先中止它（同一时间只允许一个传输）。
    pub async fn download(self: &Arc<Self>, song: &Song) -> Result<Option<DownloadTicket>, CacheError> {
        let dir = self.music_dir().await;

        let (ticket, control, previous) = {
            let mut st = self.lock();
            if st.active.as_ref().is_some_and(|a| a.song_id == song.id) {
                tracing::debug!(song_id = %song.id, "已在下载中，忽略重复请求");
                return Ok(None);
            }

            let entry = match self.store.get(song.id) {
                Some(e) => e,
                None => self.store.create(song.id)?,
            };

            st.next_attempt = st.next_attempt.wrapping_add(1).max(1);
            let attempt = st.next_attempt;
            let control = TransferControl::new();
            let previous = st.active.replace(ActiveTransfer {
                song_id: song.id,
                attempt,
                control: Arc::clone(&control),
            });
            (DownloadTicket { attempt, entry }, control, previous)
        };

        if let Some(prev) = previous {
            tracing::info!(
                song_id = %prev.song_id,
                attempt = prev.attempt,
                "开始新下载，中止上一个传输"
            );
            prev.control.deactivate();
        }

        self.reservation.update(true);
        tracing::info!(
            song_id = %song.id,
            attempt = ticket.attempt,
            cached = ticket.entry.cached_bytes,
            total = ticket.entry.total_bytes,
            "调度下载"
        );
        let span = tracing::info_span!("download", song_id = %song.id, attempt = ticket.attempt);
        tokio::spawn(
            transfer::run(Arc::clone(self), song.clone(), ticket.attempt, control, dir)
                .instrument(span),
        );
        Ok(Some(ticket))
    }

    /// 标记传输失效；传输任务在下一次写入前会看到并停止
    pub fn abort(&self, song_id: SongId) -> bool {
        let taken = {
            let mut st = self.lock();
            if st.active.as_ref().is_some_and(|a| a.song_id == song_id) {
                st.active.take()
            } else {
                None
            }
        };
        self.deactivate(taken).is_some()
    }

    pub fn abort_current(&self) -> Option<SongId> {
        let taken = self.lock().active.take();
        self.deactivate(taken)
    }

    fn deactivate(&self, taken: Option<ActiveTransfer>) -> Option<SongId> {
        let t = taken?;
        tracing::info!(song_id = %t.song_id, attempt = t.attempt, "中止下载");
        t.control.deactivate();
        self.reservation.update(false);
        Some(t.song_id)
    }

    pub fn in_progress(&self) -> Option<(SongId, AttemptId)> {
        self.lock()
            .active
            .as_ref()
            .map(|a| (a.song_id, a.attempt))
    }

    pub fn is_active_attempt(&self, attempt: AttemptId) -> bool {
        self.lock()
            .active
            .as_ref()
            .is_some_and(|a| a.attempt == attempt)
    }

    pub fn pin(&self, song_id: SongId) {
        self.lock().pinned.insert(song_id);
    }

    pub fn clear_all_pins(&self) {
        self.lock().pinned.clear();
    }

    pub fn is_pinned(&self, song_id: SongId) -> bool {
        self.lock().pinned.contains(&song_id)
    }

    pub fn set_max_bytes_per_sec(&self, v: u64) {
        self.lock().max_bytes_per_sec = v;
    }

    pub fn set_max_cache_bytes(&self, v: u64) {
        self.lock().max_cache_bytes = v;
    }

    pub fn reservation_state(&self) -> ReservationState {
        self.reservation.state()
    }

    pub fn cache_stats(&self) -> CacheStats {
        let entries = self.store.entries();
        CacheStats {
            entries: entries.len(),
            fully_cached: entries.iter().filter(|e| e.is_fully_cached()).count(),
            cached_bytes: entries.iter().map(|e| e.cached_bytes).sum(),
            max_cache_bytes: self.lock().max_cache_bytes,
        }
    }

    /// 按最近访问时间从旧到新淘汰（跳过正在下载和被钉住的），直到空出 `needed` 字节
    pub async fn make_space(&self, needed: u64) -> Result<bool, CacheError> {
        let dir = self.music_dir().await;
        let max = self.lock().max_cache_bytes;
        let available = |store: &CacheStore| max.saturating_sub(store.total_cached_bytes());

        if available(&self.store) >= needed {
            return Ok(true);
        }

        for song_id in self.store.list_by_age() {
            if available(&self.store) >= needed {
                break;
            }
            if self.is_protected(song_id) {
                continue;
            }
            self.evict(&dir, song_id).await?;
        }

        let ok = available(&self.store) >= needed;
        if !ok {
            tracing::warn!(
                needed,
                available = available(&self.store),
                max,
                "淘汰后仍无法腾出足够空间"
            );
        }
        Ok(ok)
    }

    /// 中止下载、清除钉住集合、淘汰所有条目并删除残留文件
    pub async fn clear(&self) -> Result<(usize, u64), CacheError> {
        self.abort_current();
        self.clear_all_pins();
        let dir = self.music_dir().await;

        let mut files = 0usize;
        let mut bytes = 0u64;
        for song_id in self.store.list_by_age() {
            bytes = bytes.saturating_add(self.evict(&dir, song_id).await?);
            files += 1;
        }
        let (stray_files, stray_bytes) = clear_dir_files(&dir);
        if stray_files > 0 {
            tracing::info!(stray_files, stray_bytes, "删除残留文件");
        }
        Ok((files + stray_files, bytes.saturating_add(stray_bytes)))
    }

    fn is_protected(&self, song_id: SongId) -> bool {
        let st = self.lock();
        st.pinned.contains(&song_id) || st.active.as_ref().is_some_and(|a| a.song_id == song_id)
    }

    async fn evict(&self, dir: &Path, song_id: SongId) -> Result<u64, CacheError> {
        let path = song_file_path(dir, song_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::FileOp(e)),
        }
        let freed = self
            .store
            .remove(song_id)?
            .map(|e| e.cached_bytes)
            .unwrap_or(0);
        tracing::info!(song_id = %song_id, freed, "淘汰缓存");
        self.emit(DownloadEvent::Evicted { song_id }).await;
        Ok(freed)
    }

    /// 传输任务结束时调用；返回它是否仍是当前有效的传输（被 abort 的任务不再发事件）
    pub(super) fn finish(&self, attempt: AttemptId) -> bool {
        let was_current = {
            let mut st = self.lock();
            if st.active.as_ref().is_some_and(|a| a.attempt == attempt) {
                st.active = None;
                true
            } else {
                false
            }
        };
        if was_current {
            self.reservation.update(false);
        }
        was_current
    }

    pub(super) async fn emit(&self, evt: DownloadEvent) {
        if self.tx_evt.send(evt).await.is_err() {
            tracing::debug!("下载事件接收端已关闭");
        }
    }

    pub(super) fn http(&self) -> &Client {
        &self.http
    }

    pub(super) fn progress_interval(&self) -> Duration {
        self.progress_interval
    }

    pub(super) fn max_bytes_per_sec(&self) -> u64 {
        self.lock().max_bytes_per_sec
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
