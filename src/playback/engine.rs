use rodio::OutputStreamBuilder;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use super::backend::{MediaBackend, MediaHandle, PrepareRequest};
use super::messages::{PlaybackCommand, PlaybackEvent, TrackSpec};
use super::null_backend::NullBackend;
use super::rodio_backend::RodioBackend;
use super::volume::{Volume, compute_volume};
use crate::error::AudioError;

const POSITION_INTERVAL: Duration = Duration::from_millis(500);
/// 连续多少次缓冲不足恢复都没有推进播放位置就放弃
const MAX_UNDERRUN_STALLS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioBackend {
    #[default]
    Rodio,
    /// 不出声，只模拟播放时间
    Null,
}

enum BackendKind {
    Rodio,
    Null,
    Custom(Arc<dyn MediaBackend>),
}

struct Unit {
    id: u64,
    spec: TrackSpec,
    streaming: bool,
    start_ms: u64,
    stalls: u32,
    handle: Box<dyn MediaHandle>,
}

enum Internal {
    Ended { unit: u64 },
    Prepared { job: u64, result: Result<Unit, AudioError> },
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn is_complete(spec: &TrackSpec) -> bool {
    spec.total_bytes == 0 || file_len(&spec.path) >= spec.total_bytes
}

fn prepare_unit(
    backend: &dyn MediaBackend,
    id: u64,
    spec: TrackSpec,
    start_ms: u64,
    volume: Volume,
) -> Result<Unit, AudioError> {
    let streaming = !is_complete(&spec);
    let handle = backend.prepare(&PrepareRequest {
        path: spec.path.clone(),
        total_bytes: spec.total_bytes,
        streaming,
        start_ms,
        length_ms: spec.length_ms,
    })?;
    handle.set_volume(volume);
    Ok(Unit {
        id,
        spec,
        streaming,
        start_ms,
        stalls: 0,
        handle,
    })
}

struct Engine {
    backend: Arc<dyn MediaBackend>,
    tx_evt: mpsc::Sender<PlaybackEvent>,
    rx_cmd: mpsc::Receiver<PlaybackCommand>,
    tx_internal: mpsc::UnboundedSender<Internal>,
    rx_internal: mpsc::UnboundedReceiver<Internal>,
    current: Option<Unit>,
    queued: Option<Unit>,
    preparing: Option<(u64, std::path::PathBuf)>,
    next_id: u64,
    paused: bool,
    low_volume: bool,
    pre_amp_db: f64,
}

impl Engine {
    fn new(
        backend: Arc<dyn MediaBackend>,
        tx_evt: mpsc::Sender<PlaybackEvent>,
        rx_cmd: mpsc::Receiver<PlaybackCommand>,
        pre_amp_db: f64,
    ) -> Self {
        let (tx_internal, rx_internal) = mpsc::unbounded_channel();
        Self {
            backend,
            tx_evt,
            rx_cmd,
            tx_internal,
            rx_internal,
            current: None,
            queued: None,
            preparing: None,
            next_id: 0,
            paused: false,
            low_volume: false,
            pre_amp_db,
        }
    }

    async fn run(mut self) {
        let mut position_tick = tokio::time::interval(POSITION_INTERVAL);
        position_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            select! {
                Some(msg) = self.rx_internal.recv() => {
                    self.handle_internal(msg).await;
                }
                maybe_cmd = self.rx_cmd.recv() => {
                    match maybe_cmd {
                        Some(PlaybackCommand::Quit) | None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                _ = position_tick.tick() => {
                    self.report_position().await;
                }
            }
        }

        self.release_all();
        tracing::info!("PlaybackEngine 已退出");
    }

    async fn emit(&self, evt: PlaybackEvent) {
        if self.tx_evt.send(evt).await.is_err() {
            tracing::debug!("播放事件接收端已关闭");
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }

    fn volume_for(&self, spec: &TrackSpec) -> Volume {
        compute_volume(self.pre_amp_db, spec.gain_db, spec.peak_amp, self.low_volume)
    }

    fn release_all(&mut self) {
        if let Some(u) = self.current.take() {
            u.handle.stop();
        }
        self.clear_queued();
    }

    fn clear_queued(&mut self) {
        self.preparing = None;
        if let Some(u) = self.queued.take() {
            tracing::debug!(path = %u.spec.path.display(), "丢弃已准备的下一首");
            u.handle.stop();
        }
    }

    async fn handle_command(&mut self, cmd: PlaybackCommand) {
        match cmd {
            PlaybackCommand::Play(spec) => self.play(spec).await,
            PlaybackCommand::Queue(spec) => self.queue(spec),
            PlaybackCommand::ClearQueued => self.clear_queued(),
            PlaybackCommand::Pause => self.set_paused(true).await,
            PlaybackCommand::Unpause => self.set_paused(false).await,
            PlaybackCommand::TogglePause => self.set_paused(!self.paused).await,
            PlaybackCommand::Stop => {
                self.release_all();
                self.emit(PlaybackEvent::Stopped).await;
            }
            PlaybackCommand::SetLowVolume(low) => {
                self.low_volume = low;
                self.apply_volume();
            }
            PlaybackCommand::SetPreAmpGain(db) => {
                self.pre_amp_db = db;
                self.apply_volume();
            }
            PlaybackCommand::Quit => {}
        }
    }

    async fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Ended { unit } => self.on_ended(unit).await,
            Internal::Prepared { job, result } => {
                if self.preparing.as_ref().is_none_or(|(j, _)| *j != job) {
                    // 已被新的 queue/play 取代
                    if let Ok(u) = result {
                        u.handle.stop();
                    }
                    return;
                }
                self.preparing = None;
                match result {
                    Ok(u) => {
                        tracing::debug!(path = %u.spec.path.display(), "下一首已准备");
                        if let Some(old) = self.queued.replace(u) {
                            old.handle.stop();
                        }
                    }
                    Err(e) => {
                        tracing::warn!(err = %e, "准备下一首失败");
                        self.emit(PlaybackEvent::Error {
                            path: None,
                            message: e.to_string(),
                        })
                        .await;
                    }
                }
            }
        }
    }

    async fn play(&mut self, spec: TrackSpec) {
        if let Some(cur) = self.current.take() {
            cur.handle.stop();
        }
        if self
            .preparing
            .as_ref()
            .is_some_and(|(_, p)| *p == spec.path)
        {
            self.preparing = None;
        }

        let volume = self.volume_for(&spec);
        let promoted = match self.queued.take() {
            Some(q) if q.spec.path == spec.path && q.start_ms == spec.start_ms => Some(q),
            other => {
                self.queued = other;
                None
            }
        };

        let unit = match promoted {
            Some(mut u) => {
                tracing::debug!(path = %spec.path.display(), "使用已准备的单元");
                u.spec = spec;
                u.handle.set_volume(volume);
                u
            }
            None => {
                let id = self.next_id();
                let start_ms = spec.start_ms;
                match prepare_unit(self.backend.as_ref(), id, spec.clone(), start_ms, volume) {
                    Ok(u) => u,
                    Err(e) => {
                        tracing::warn!(path = %spec.path.display(), err = %e, "准备播放失败");
                        self.emit(PlaybackEvent::Error {
                            path: Some(spec.path),
                            message: e.to_string(),
                        })
                        .await;
                        return;
                    }
                }
            }
        };
        self.start(unit).await;
    }

    fn queue(&mut self, spec: TrackSpec) {
        let same_queued = self.queued.as_ref().is_some_and(|q| q.spec.path == spec.path);
        let same_preparing = self
            .preparing
            .as_ref()
            .is_some_and(|(_, p)| *p == spec.path);
        if same_queued || same_preparing {
            return;
        }

        let job = self.next_id();
        self.preparing = Some((job, spec.path.clone()));
        let backend = Arc::clone(&self.backend);
        let tx = self.tx_internal.clone();
        let volume = self.volume_for(&spec);
        tokio::task::spawn_local(async move {
            let joined = tokio::task::spawn_blocking(move || {
                let start_ms = spec.start_ms;
                prepare_unit(backend.as_ref(), job, spec, start_ms, volume)
            })
            .await;
            let result = joined.unwrap_or_else(|e| Err(AudioError::PrepareAborted(e.to_string())));
            let _ = tx.send(Internal::Prepared { job, result });
        });
    }

    async fn start(&mut self, mut unit: Unit) {
        let tx = self.tx_internal.clone();
        let id = unit.id;
        unit.handle.watch_end(Box::new(move || {
            let _ = tx.send(Internal::Ended { unit: id });
        }));
        if !self.paused {
            unit.handle.play();
        }
        tracing::info!(
            path = %unit.spec.path.display(),
            streaming = unit.streaming,
            start_ms = unit.start_ms,
            paused = self.paused,
            "开始播放"
        );
        let evt = PlaybackEvent::Started {
            path: unit.spec.path.clone(),
            streaming: unit.streaming,
        };
        self.current = Some(unit);
        self.emit(evt).await;
    }

    async fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        if paused {
            if let Some(cur) = self.current.as_ref() {
                cur.handle.pause();
            }
        } else {
            let switch = self
                .current
                .as_ref()
                .is_some_and(|cur| cur.streaming && is_complete(&cur.spec));
            if switch {
                tracing::info!("文件已下载完成，恢复播放时切换到完整文件");
                self.reopen_current(false).await;
            } else if let Some(cur) = self.current.as_ref() {
                cur.handle.play();
            }
        }
        self.emit(PlaybackEvent::PauseChanged(paused)).await;
    }

    /// 在当前位置重新打开当前曲目；`stalled` 表示这次是缓冲不足触发的
    async fn reopen_current(&mut self, stalled: bool) {
        let Some(cur) = self.current.take() else {
            return;
        };
        let pos = cur.handle.position_ms();
        cur.handle.stop();

        let stalls = if stalled && pos <= cur.start_ms {
            cur.stalls + 1
        } else {
            0
        };
        if stalls > MAX_UNDERRUN_STALLS {
            tracing::warn!(
                path = %cur.spec.path.display(),
                stalls,
                position_ms = pos,
                "缓冲持续不足，等待下载补上数据"
            );
            self.emit(PlaybackEvent::Stalled {
                path: cur.spec.path,
                position_ms: pos,
            })
            .await;
            return;
        }

        let id = self.next_id();
        let volume = self.volume_for(&cur.spec);
        let path = cur.spec.path.clone();
        match prepare_unit(self.backend.as_ref(), id, cur.spec, pos, volume) {
            Ok(mut u) => {
                u.stalls = stalls;
                self.start(u).await;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "重新打开失败");
                self.emit(PlaybackEvent::Error {
                    path: Some(path),
                    message: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn on_ended(&mut self, unit: u64) {
        let Some(cur) = self.current.as_ref() else {
            return;
        };
        if cur.id != unit {
            return;
        }

        let consumed = cur.handle.bytes_consumed();
        if cur.streaming && consumed < cur.spec.total_bytes {
            let complete = is_complete(&cur.spec);
            let message = if complete {
                "缓冲不足，已切换到完整文件继续播放"
            } else {
                "缓冲不足，重新打开文件继续播放"
            };
            tracing::warn!(
                path = %cur.spec.path.display(),
                consumed,
                total = cur.spec.total_bytes,
                complete,
                "播放提前结束"
            );
            self.emit(PlaybackEvent::Error {
                path: Some(cur.spec.path.clone()),
                message: message.to_owned(),
            })
            .await;
            self.reopen_current(true).await;
            return;
        }

        if let Some(cur) = self.current.take() {
            cur.handle.stop();
            tracing::info!(path = %cur.spec.path.display(), "播放结束");
            self.emit(PlaybackEvent::Completed {
                path: cur.spec.path,
            })
            .await;
        }
    }

    fn apply_volume(&self) {
        for u in [self.current.as_ref(), self.queued.as_ref()].into_iter().flatten() {
            u.handle.set_volume(self.volume_for(&u.spec));
        }
    }

    async fn report_position(&self) {
        if self.paused {
            return;
        }
        let Some(cur) = self.current.as_ref() else {
            return;
        };
        let evt = PlaybackEvent::Position {
            path: cur.spec.path.clone(),
            position_ms: cur.handle.position_ms(),
            duration_ms: cur.spec.length_ms,
        };
        self.emit(evt).await;
    }
}

/// 播放引擎的句柄；引擎本身跑在独立线程的单线程运行时上，所有操作串行执行
pub struct PlaybackEngine {
    tx_cmd: mpsc::Sender<PlaybackCommand>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    pub async fn spawn(
        backend: AudioBackend,
        pre_amp_db: f64,
    ) -> Result<(Self, mpsc::Receiver<PlaybackEvent>), AudioError> {
        let kind = match backend {
            AudioBackend::Rodio => BackendKind::Rodio,
            AudioBackend::Null => BackendKind::Null,
        };
        Self::spawn_kind(kind, pre_amp_db).await
    }

    pub async fn spawn_with_backend(
        backend: Arc<dyn MediaBackend>,
        pre_amp_db: f64,
    ) -> Result<(Self, mpsc::Receiver<PlaybackEvent>), AudioError> {
        Self::spawn_kind(BackendKind::Custom(backend), pre_amp_db).await
    }

    async fn spawn_kind(
        kind: BackendKind,
        pre_amp_db: f64,
    ) -> Result<(Self, mpsc::Receiver<PlaybackEvent>), AudioError> {
        let (tx_cmd, rx_cmd) = mpsc::channel::<PlaybackCommand>(256);
        let (tx_evt, rx_evt) = mpsc::channel::<PlaybackEvent>(256);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), AudioError>>();

        let thread = std::thread::Builder::new()
            .name("playback-engine".to_owned())
            .spawn(move || run_thread(kind, pre_amp_db, rx_cmd, tx_evt, ready_tx))
            .map_err(|e| AudioError::OutputStream(format!("创建播放线程失败: {e}")))?;

        ready_rx.await.map_err(|_| AudioError::EngineClosed)??;
        Ok((
            Self {
                tx_cmd,
                thread: Some(thread),
            },
            rx_evt,
        ))
    }

    pub fn sender(&self) -> mpsc::Sender<PlaybackCommand> {
        self.tx_cmd.clone()
    }

    pub async fn send(&self, cmd: PlaybackCommand) -> Result<(), AudioError> {
        self.tx_cmd
            .send(cmd)
            .await
            .map_err(|_| AudioError::EngineClosed)
    }

    /// 取消后台准备、释放所有单元并等待引擎线程退出
    pub async fn quit(mut self) {
        let _ = self.tx_cmd.send(PlaybackCommand::Quit).await;
        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                tracing::warn!("播放线程异常退出");
            }
        }
    }
}

fn run_thread(
    kind: BackendKind,
    pre_amp_db: f64,
    rx_cmd: mpsc::Receiver<PlaybackCommand>,
    tx_evt: mpsc::Sender<PlaybackEvent>,
    ready_tx: oneshot::Sender<Result<(), AudioError>>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::OutputStream(format!(
                "创建播放运行时失败: {e}"
            ))));
            return;
        }
    };

    // 输出流必须活到线程结束
    let mut _stream = None;
    let backend: Arc<dyn MediaBackend> = match kind {
        BackendKind::Rodio => match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => {
                let backend = Arc::new(RodioBackend::new(stream.mixer().clone()));
                _stream = Some(stream);
                backend
            }
            Err(e) => {
                tracing::error!(err = %e, "初始化音频输出失败");
                let _ = ready_tx.send(Err(AudioError::OutputStream(e.to_string())));
                return;
            }
        },
        BackendKind::Null => Arc::new(NullBackend),
        BackendKind::Custom(b) => b,
    };
    let _ = ready_tx.send(Ok(()));
    tracing::info!(pre_amp_db, "PlaybackEngine 已启动");

    let local = tokio::task::LocalSet::new();
    let engine = Engine::new(backend, tx_evt, rx_cmd, pre_amp_db);
    local.block_on(&rt, engine.run().instrument(tracing::info_span!("playback")));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[derive(Default)]
    struct FakeHandleState {
        playing: AtomicBool,
        stopped: AtomicBool,
        position_ms: AtomicU64,
        consumed: AtomicU64,
        on_end: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl FakeHandleState {
        fn end(&self) {
            let f = self.on_end.lock().expect("lock").take();
            if let Some(f) = f {
                f();
            }
        }
    }

    struct FakeHandle(Arc<FakeHandleState>);

    impl MediaHandle for FakeHandle {
        fn play(&self) {
            self.0.playing.store(true, Ordering::SeqCst);
        }
        fn pause(&self) {
            self.0.playing.store(false, Ordering::SeqCst);
        }
        fn stop(&self) {
            self.0.stopped.store(true, Ordering::SeqCst);
            self.0.playing.store(false, Ordering::SeqCst);
        }
        fn set_volume(&self, _v: Volume) {}
        fn position_ms(&self) -> u64 {
            self.0.position_ms.load(Ordering::SeqCst)
        }
        fn bytes_consumed(&self) -> u64 {
            self.0.consumed.load(Ordering::SeqCst)
        }
        fn watch_end(&mut self, on_end: Box<dyn FnOnce() + Send>) {
            *self.0.on_end.lock().expect("lock") = Some(on_end);
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        prepared: Mutex<Vec<PrepareRequest>>,
        handles: Mutex<Vec<Arc<FakeHandleState>>>,
        fail: AtomicBool,
    }

    impl FakeBackend {
        fn prepared(&self) -> Vec<PrepareRequest> {
            self.prepared.lock().expect("lock").clone()
        }
        fn handle(&self, i: usize) -> Arc<FakeHandleState> {
            Arc::clone(&self.handles.lock().expect("lock")[i])
        }
    }

    impl MediaBackend for FakeBackend {
        fn prepare(&self, req: &PrepareRequest) -> Result<Box<dyn MediaHandle>, AudioError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AudioError::OpenFile {
                    path: req.path.clone(),
                    source: std::io::Error::other("boom"),
                });
            }
            self.prepared.lock().expect("lock").push(req.clone());
            let st = Arc::new(FakeHandleState::default());
            self.handles.lock().expect("lock").push(Arc::clone(&st));
            Ok(Box::new(FakeHandle(st)))
        }
    }

    fn spec(path: PathBuf, total: u64) -> TrackSpec {
        TrackSpec {
            path,
            total_bytes: total,
            gain_db: None,
            peak_amp: None,
            length_ms: 180_000,
            start_ms: 0,
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<PlaybackEvent>) -> PlaybackEvent {
        loop {
            let evt = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event timeout")
                .expect("channel open");
            if !matches!(evt, PlaybackEvent::Position { .. }) {
                return evt;
            }
        }
    }

    async fn setup() -> (
        tempfile::TempDir,
        Arc<FakeBackend>,
        PlaybackEngine,
        mpsc::Receiver<PlaybackEvent>,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(FakeBackend::default());
        let (engine, rx) = PlaybackEngine::spawn_with_backend(backend.clone(), 0.0)
            .await
            .expect("spawn");
        (dir, backend, engine, rx)
    }

    #[tokio::test]
    async fn genuine_end_reports_completion() {
        let (dir, backend, engine, mut rx) = setup().await;
        let path = dir.path().join("1.bin");
        std::fs::write(&path, vec![0u8; 100]).expect("write");

        engine.send(PlaybackCommand::Play(spec(path.clone(), 100))).await.expect("send");
        assert_eq!(
            next_event(&mut rx).await,
            PlaybackEvent::Started {
                path: path.clone(),
                streaming: false
            }
        );
        let h = backend.handle(0);
        assert!(h.playing.load(Ordering::SeqCst));

        h.consumed.store(100, Ordering::SeqCst);
        h.end();
        assert_eq!(next_event(&mut rx).await, PlaybackEvent::Completed { path });
        engine.quit().await;
    }

    #[tokio::test]
    async fn underrun_reopens_at_last_position() {
        let (dir, backend, engine, mut rx) = setup().await;
        let path = dir.path().join("2.bin");
        std::fs::write(&path, vec![0u8; 50]).expect("write");

        engine.send(PlaybackCommand::Play(spec(path.clone(), 100))).await.expect("send");
        assert!(matches!(
            next_event(&mut rx).await,
            PlaybackEvent::Started { streaming: true, .. }
        ));

        let h = backend.handle(0);
        h.position_ms.store(3_000, Ordering::SeqCst);
        h.consumed.store(50, Ordering::SeqCst);
        h.end();

        match next_event(&mut rx).await {
            PlaybackEvent::Error { message, .. } => assert!(message.contains("重新打开")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            next_event(&mut rx).await,
            PlaybackEvent::Started { streaming: true, .. }
        ));
        let reopened = &backend.prepared()[1];
        assert_eq!(reopened.start_ms, 3_000);
        assert!(reopened.streaming);

        // 文件下载完成后再次提前结束，切换到完整文件
        std::fs::write(&path, vec![0u8; 100]).expect("write");
        let h = backend.handle(1);
        h.position_ms.store(4_000, Ordering::SeqCst);
        h.consumed.store(60, Ordering::SeqCst);
        h.end();

        match next_event(&mut rx).await {
            PlaybackEvent::Error { message, .. } => assert!(message.contains("完整文件")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            next_event(&mut rx).await,
            PlaybackEvent::Started { streaming: false, .. }
        ));
        let switched = &backend.prepared()[2];
        assert_eq!(switched.start_ms, 4_000);
        assert!(!switched.streaming);
        engine.quit().await;
    }

    #[tokio::test]
    async fn repeated_stalls_hand_back_the_position() {
        let (dir, backend, engine, mut rx) = setup().await;
        let path = dir.path().join("6.bin");
        std::fs::write(&path, vec![0u8; 50]).expect("write");

        engine.send(PlaybackCommand::Play(spec(path.clone(), 100))).await.expect("send");
        next_event(&mut rx).await;

        // 第一次推进到 3 秒，之后每次都卡在同一位置
        let endings = MAX_UNDERRUN_STALLS as usize + 2;
        for i in 0..endings {
            let h = backend.handle(i);
            h.position_ms.store(3_000, Ordering::SeqCst);
            h.consumed.store(50, Ordering::SeqCst);
            h.end();

            assert!(matches!(next_event(&mut rx).await, PlaybackEvent::Error { .. }));
            if i + 1 < endings {
                assert!(matches!(
                    next_event(&mut rx).await,
                    PlaybackEvent::Started { streaming: true, .. }
                ));
            }
        }
        assert_eq!(
            next_event(&mut rx).await,
            PlaybackEvent::Stalled {
                path: path.clone(),
                position_ms: 3_000,
            }
        );
        assert_eq!(backend.prepared().len(), endings);

        // 数据补齐后从交回的位置继续
        std::fs::write(&path, vec![0u8; 100]).expect("write");
        let mut resume = spec(path.clone(), 100);
        resume.start_ms = 3_000;
        engine.send(PlaybackCommand::Play(resume)).await.expect("send");
        assert!(matches!(
            next_event(&mut rx).await,
            PlaybackEvent::Started { streaming: false, .. }
        ));
        let last = backend.prepared().pop().expect("prepared");
        assert_eq!(last.start_ms, 3_000);
        engine.quit().await;
    }

    #[tokio::test]
    async fn clear_queued_drops_prepared_unit() {
        let (dir, backend, engine, mut rx) = setup().await;
        let path = dir.path().join("7.bin");
        std::fs::write(&path, vec![0u8; 8]).expect("write");

        engine.send(PlaybackCommand::Queue(spec(path.clone(), 8))).await.expect("send");
        for _ in 0..100 {
            if !backend.prepared().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        engine.send(PlaybackCommand::ClearQueued).await.expect("send");
        engine.send(PlaybackCommand::Play(spec(path.clone(), 8))).await.expect("send");
        assert!(matches!(next_event(&mut rx).await, PlaybackEvent::Started { .. }));
        assert_eq!(backend.prepared().len(), 2);
        assert!(backend.handle(0).stopped.load(Ordering::SeqCst));
        assert!(backend.handle(1).playing.load(Ordering::SeqCst));
        engine.quit().await;
    }

    #[tokio::test]
    async fn unpause_switches_to_complete_file_once() {
        let (dir, backend, engine, mut rx) = setup().await;
        let path = dir.path().join("3.bin");
        std::fs::write(&path, vec![0u8; 10]).expect("write");

        engine.send(PlaybackCommand::Play(spec(path.clone(), 20))).await.expect("send");
        next_event(&mut rx).await;
        engine.send(PlaybackCommand::Pause).await.expect("send");
        assert_eq!(next_event(&mut rx).await, PlaybackEvent::PauseChanged(true));

        std::fs::write(&path, vec![0u8; 20]).expect("write");
        backend.handle(0).position_ms.store(1_500, Ordering::SeqCst);
        engine.send(PlaybackCommand::Unpause).await.expect("send");
        assert!(matches!(
            next_event(&mut rx).await,
            PlaybackEvent::Started { streaming: false, .. }
        ));
        assert_eq!(next_event(&mut rx).await, PlaybackEvent::PauseChanged(false));
        assert!(backend.handle(0).stopped.load(Ordering::SeqCst));
        assert_eq!(backend.prepared()[1].start_ms, 1_500);

        // 已是完整文件，再次暂停/恢复不会重新打开
        engine.send(PlaybackCommand::TogglePause).await.expect("send");
        next_event(&mut rx).await;
        engine.send(PlaybackCommand::TogglePause).await.expect("send");
        assert_eq!(next_event(&mut rx).await, PlaybackEvent::PauseChanged(false));
        assert_eq!(backend.prepared().len(), 2);
        engine.quit().await;
    }

    #[tokio::test]
    async fn play_promotes_queued_unit() {
        let (dir, backend, engine, mut rx) = setup().await;
        let path = dir.path().join("4.bin");
        std::fs::write(&path, vec![0u8; 8]).expect("write");

        engine.send(PlaybackCommand::Queue(spec(path.clone(), 8))).await.expect("send");
        engine.send(PlaybackCommand::Queue(spec(path.clone(), 8))).await.expect("send");
        for _ in 0..100 {
            if !backend.prepared().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // 等准备结果回到引擎
        tokio::time::sleep(Duration::from_millis(50)).await;

        engine.send(PlaybackCommand::Play(spec(path.clone(), 8))).await.expect("send");
        assert!(matches!(next_event(&mut rx).await, PlaybackEvent::Started { .. }));
        assert_eq!(backend.prepared().len(), 1);
        assert!(backend.handle(0).playing.load(Ordering::SeqCst));
        engine.quit().await;
    }

    #[tokio::test]
    async fn prepare_failure_reports_error() {
        let (dir, backend, engine, mut rx) = setup().await;
        backend.fail.store(true, Ordering::SeqCst);
        let path = dir.path().join("5.bin");

        engine.send(PlaybackCommand::Play(spec(path.clone(), 8))).await.expect("send");
        match next_event(&mut rx).await {
            PlaybackEvent::Error { path: p, .. } => assert_eq!(p, Some(path)),
            other => panic!("unexpected {other:?}"),
        }
        engine.send(PlaybackCommand::Stop).await.expect("send");
        assert_eq!(next_event(&mut rx).await, PlaybackEvent::Stopped);
        engine.quit().await;
    }
}
