use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::backend::{MediaBackend, MediaHandle, PrepareRequest};
use super::volume::Volume;
use crate::error::AudioError;

/// 时长未知时按这个长度模拟
const DEFAULT_LENGTH_MS: u64 = 1_000;

/// 不输出声音的后端：只按墙钟模拟播放进度（`--no-audio` 或无声卡环境）
#[derive(Debug, Default)]
pub struct NullBackend;

impl MediaBackend for NullBackend {
    fn prepare(&self, req: &PrepareRequest) -> Result<Box<dyn MediaHandle>, AudioError> {
        if let Err(source) = std::fs::metadata(&req.path) {
            return Err(AudioError::OpenFile {
                path: req.path.clone(),
                source,
            });
        }
        let length_ms = if req.length_ms == 0 {
            DEFAULT_LENGTH_MS
        } else {
            req.length_ms
        };
        Ok(Box::new(NullHandle {
            path: req.path.clone(),
            total_bytes: req.total_bytes,
            length_ms,
            clock: Arc::new(Mutex::new(SimClock {
                played_ms: req.start_ms,
                playing_since: None,
            })),
            cancel: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct SimClock {
    played_ms: u64,
    playing_since: Option<Instant>,
}

impl SimClock {
    fn position_ms(&self) -> u64 {
        self.played_ms
            + self
                .playing_since
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0)
    }
}

struct NullHandle {
    path: PathBuf,
    total_bytes: u64,
    length_ms: u64,
    clock: Arc<Mutex<SimClock>>,
    cancel: Arc<AtomicBool>,
}

impl NullHandle {
    fn with_clock<T>(&self, f: impl FnOnce(&mut SimClock) -> T) -> T {
        let mut c = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut c)
    }
}

impl MediaHandle for NullHandle {
    fn play(&self) {
        self.with_clock(|c| {
            if c.playing_since.is_none() {
                c.playing_since = Some(Instant::now());
            }
        });
    }

    fn pause(&self) {
        self.with_clock(|c| {
            c.played_ms = c.position_ms();
            c.playing_since = None;
        });
    }

    fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.pause();
    }

    fn set_volume(&self, _v: Volume) {}

    fn position_ms(&self) -> u64 {
        self.with_clock(|c| c.position_ms()).min(self.length_ms)
    }

    fn bytes_consumed(&self) -> u64 {
        std::fs::metadata(&self.path)
            .map(|m| m.len().min(self.total_bytes))
            .unwrap_or(0)
    }

    fn watch_end(&mut self, on_end: Box<dyn FnOnce() + Send>) {
        let clock = Arc::clone(&self.clock);
        let cancel = Arc::clone(&self.cancel);
        let length_ms = self.length_ms;

        let spawned = thread::Builder::new()
            .name("null-playback-end".to_owned())
            .spawn(move || {
                loop {
                    if cancel.load(Ordering::Relaxed) {
                        return;
                    }
                    let pos = clock.lock().unwrap_or_else(|e| e.into_inner()).position_ms();
                    if pos >= length_ms {
                        break;
                    }
                    thread::sleep(Duration::from_millis(20));
                }
                on_end();
            });
        if let Err(e) = spawned {
            tracing::error!(err = %e, "创建播放结束监听线程失败");
        }
    }
}
