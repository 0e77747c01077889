use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn";

/// 持有到进程退出，drop 时把缓冲的日志刷到文件
pub struct LogGuard(#[allow(dead_code)] Option<WorkerGuard>);

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub filter: Option<String>,
    /// 警告及以上同时打到 stderr
    pub console: bool,
}

pub fn init(data_dir: &Path, cfg: LogConfig) -> LogGuard {
    let log_dir = cfg.dir.unwrap_or_else(|| data_dir.join("logs"));

    let log_dir = match fs::create_dir_all(&log_dir) {
        Ok(()) => log_dir,
        Err(_) => std::env::temp_dir().join("cacheplay-logs"),
    };
    let _ = fs::create_dir_all(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, "cacheplay.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = match cfg.filter {
        Some(s) if !s.trim().is_empty() => EnvFilter::new(s),
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(file_writer);

    // 文件里带上 download/coordinator/playback 等 span 字段，终端只看告警
    let console_layer = cfg.console.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .with_filter(LevelFilter::WARN)
    });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer);

    let _ = subscriber.try_init();
    tracing::info!(log_dir = %log_dir.display(), "tracing 已初始化");

    LogGuard(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_log_carries_component_span_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = init(
            dir.path(),
            LogConfig {
                dir: None,
                filter: Some("info".to_owned()),
                console: false,
            },
        );
        tracing::info_span!("download", song_id = 42, attempt = 7).in_scope(|| {
            tracing::info!("调度下载");
        });
        drop(guard);

        let logs = dir.path().join("logs");
        let text = fs::read_dir(&logs)
            .expect("log dir")
            .filter_map(Result::ok)
            .filter_map(|e| fs::read_to_string(e.path()).ok())
            .collect::<String>();
        assert!(text.contains("download{song_id=42 attempt=7}"), "{text}");
    }
}
