use rodio::mixer::Mixer;
use rodio::{Decoder, Sink, Source};
use std::io::BufReader;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use super::backend::{MediaBackend, MediaHandle, PrepareRequest};
use super::growing_file::TrackFile;
use super::volume::Volume;
use crate::error::AudioError;

/// 后级放大系数同步到音频线程的间隔
const POST_AMP_REFRESH: Duration = Duration::from_millis(50);

/// sink 音量不超过 1.0，超出的部分在这里按 `gain` 放大
fn with_post_amp<S>(source: S, gain: Arc<AtomicU32>) -> impl Source + Send + 'static
where
    S: Source + Send + 'static,
{
    source.amplify(1.0).periodic_access(POST_AMP_REFRESH, move |s| {
        s.set_factor(f32::from_bits(gain.load(Ordering::Relaxed)));
    })
}

/// 基于 rodio 的播放后端；输出流由引擎线程持有，这里只保留 mixer
pub struct RodioBackend {
    mixer: Mixer,
}

impl RodioBackend {
    pub fn new(mixer: Mixer) -> Self {
        Self { mixer }
    }
}

impl MediaBackend for RodioBackend {
    fn prepare(&self, req: &PrepareRequest) -> Result<Box<dyn MediaHandle>, AudioError> {
        let file = TrackFile::open(&req.path, req.total_bytes, req.streaming).map_err(|source| {
            AudioError::OpenFile {
                path: req.path.clone(),
                source,
            }
        })?;
        let consumed = file.consumed();
        let reader_cancel = file.cancel_flag();

        let decoder = Decoder::new(BufReader::new(file)).map_err(|e| AudioError::Decode {
            path: req.path.clone(),
            source: Box::new(e),
        })?;
        let source: Box<dyn Source + Send> = if req.start_ms > 0 {
            Box::new(decoder.skip_duration(Duration::from_millis(req.start_ms)))
        } else {
            Box::new(decoder)
        };

        let post_amp = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let sink = Sink::connect_new(&self.mixer);
        sink.pause();
        sink.append(with_post_amp(source, Arc::clone(&post_amp)));
        tracing::debug!(
            path = %req.path.display(),
            streaming = req.streaming,
            start_ms = req.start_ms,
            "sink 已准备"
        );

        Ok(Box::new(RodioHandle {
            sink: Arc::new(sink),
            start_ms: req.start_ms,
            post_amp,
            consumed,
            reader_cancel,
            end_cancel: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct RodioHandle {
    sink: Arc<Sink>,
    start_ms: u64,
    post_amp: Arc<AtomicU32>,
    consumed: Arc<AtomicU64>,
    reader_cancel: Arc<AtomicBool>,
    end_cancel: Arc<AtomicBool>,
}

impl MediaHandle for RodioHandle {
    fn play(&self) {
        self.sink.play();
    }

    fn pause(&self) {
        self.sink.pause();
    }

    fn stop(&self) {
        self.end_cancel.store(true, Ordering::Relaxed);
        self.reader_cancel.store(true, Ordering::Relaxed);
        self.sink.stop();
    }

    fn set_volume(&self, v: Volume) {
        self.sink.set_volume(v.volume);
        self.post_amp.store(v.post_amp.to_bits(), Ordering::Relaxed);
    }

    fn position_ms(&self) -> u64 {
        self.start_ms + self.sink.get_pos().as_millis() as u64
    }

    fn bytes_consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    fn watch_end(&mut self, on_end: Box<dyn FnOnce() + Send>) {
        let sink = Arc::clone(&self.sink);
        let cancel = Arc::clone(&self.end_cancel);

        // 线程创建失败时只是失去自动切歌，不影响当前播放
        let spawned = thread::Builder::new()
            .name("playback-end-check".to_owned())
            .spawn(move || {
                sink.sleep_until_end();
                if !cancel.load(Ordering::Relaxed) {
                    on_end();
                }
            });
        if let Err(e) = spawned {
            tracing::error!(err = %e, "创建播放结束监听线程失败");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodio::buffer::SamplesBuffer;

    #[test]
    fn post_amp_scales_samples() {
        let gain = Arc::new(AtomicU32::new(2.0f32.to_bits()));
        let source = SamplesBuffer::new(1, 44_100, vec![0.25f32; 4]);
        let out = with_post_amp(source, gain).collect::<Vec<f32>>();
        assert_eq!(out, vec![0.5; 4]);
    }
}
