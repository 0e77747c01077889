use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// 读到文件末尾但还没到期望长度时，最多等这么久新数据
pub const UNDERRUN_WAIT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 播放用的文件读取器
///
/// `live` 模式下文件还在被下载任务追加：读到末尾会短暂轮询，等不到数据就返回 EOF，
/// 由引擎按已读字节数判断是否缓冲不足。`SeekFrom::End` 按期望总长计算。
pub struct TrackFile {
    file: File,
    expected_total: u64,
    live: bool,
    pos: u64,
    consumed: Arc<AtomicU64>,
    cancel: Arc<AtomicBool>,
}

impl TrackFile {
    pub fn open(path: &Path, expected_total: u64, live: bool) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
            expected_total,
            live,
            pos: 0,
            consumed: Arc::new(AtomicU64::new(0)),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 最近一次读取结束时的偏移
    pub fn consumed(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.consumed)
    }

    /// 置位后不再等待新数据
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

impl Read for TrackFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut waited = Duration::ZERO;
        loop {
            let n = self.file.read(buf)?;
            if n > 0 {
                self.pos += n as u64;
                self.consumed.store(self.pos, Ordering::Relaxed);
                return Ok(n);
            }
            if !self.live
                || buf.is_empty()
                || self.pos >= self.expected_total
                || waited >= UNDERRUN_WAIT
                || self.cancel.load(Ordering::Relaxed)
            {
                return Ok(0);
            }
            thread::sleep(POLL_INTERVAL);
            waited += POLL_INTERVAL;
        }
    }
}

impl Seek for TrackFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::End(off) if self.live => {
                let to = self.expected_total.checked_add_signed(off).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek before start")
                })?;
                SeekFrom::Start(to)
            }
            other => other,
        };
        self.pos = self.file.seek(target)?;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn complete_file_reads_to_eof() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("1.bin");
        std::fs::write(&path, b"abcdef").expect("write");

        let mut f = TrackFile::open(&path, 6, false).expect("open");
        let mut out = Vec::new();
        f.read_to_end(&mut out).expect("read");
        assert_eq!(out, b"abcdef");
        assert_eq!(f.consumed().load(Ordering::Relaxed), 6);
    }

    #[test]
    fn live_file_waits_for_appended_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("2.bin");
        std::fs::write(&path, b"abc").expect("write");

        let mut f = TrackFile::open(&path, 6, true).expect("open");
        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(120));
            let mut w = std::fs::OpenOptions::new()
                .append(true)
                .open(writer_path)
                .expect("open for append");
            w.write_all(b"def").expect("append");
        });

        let mut out = Vec::new();
        f.read_to_end(&mut out).expect("read");
        writer.join().expect("join");
        assert_eq!(out, b"abcdef");
    }

    #[test]
    fn live_file_gives_up_after_underrun_wait() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("3.bin");
        std::fs::write(&path, b"abc").expect("write");

        let mut f = TrackFile::open(&path, 100, true).expect("open");
        f.cancel_flag().store(true, Ordering::Relaxed);
        let mut out = Vec::new();
        f.read_to_end(&mut out).expect("read");
        assert_eq!(out, b"abc");
        assert_eq!(f.consumed().load(Ordering::Relaxed), 3);
    }

    #[test]
    fn seek_end_uses_expected_total_when_live() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("4.bin");
        std::fs::write(&path, b"abc").expect("write");

        let mut f = TrackFile::open(&path, 10, true).expect("open");
        assert_eq!(f.seek(SeekFrom::End(-2)).expect("seek"), 8);

        let mut done = TrackFile::open(&path, 10, false).expect("open");
        assert_eq!(done.seek(SeekFrom::End(0)).expect("seek"), 3);
    }
}
