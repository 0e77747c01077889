use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "CACHEPLAY_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    // 缓存/下载设置
    #[serde(default = "default_cache_max_mb")]
    pub cache_max_mb: u64,
    /// 0 表示不限速
    #[serde(default)]
    pub max_download_bytes_per_sec: u64,
    #[serde(default = "default_songs_to_prefetch")]
    pub songs_to_prefetch: usize,
    #[serde(default)]
    pub download_all: bool,
    #[serde(default = "default_http_connect_timeout_secs")]
    pub http_connect_timeout_secs: u64,
    #[serde(default = "default_http_read_timeout_secs")]
    pub http_read_timeout_secs: u64,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_keepalive_release_delay_secs")]
    pub keepalive_release_delay_secs: u64,

    // 播放设置
    #[serde(default)]
    pub pre_amp_gain_db: f64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            cache_max_mb: default_cache_max_mb(),
            max_download_bytes_per_sec: 0,
            songs_to_prefetch: default_songs_to_prefetch(),
            download_all: false,
            http_connect_timeout_secs: default_http_connect_timeout_secs(),
            http_read_timeout_secs: default_http_read_timeout_secs(),
            progress_interval_ms: default_progress_interval_ms(),
            keepalive_release_delay_secs: default_keepalive_release_delay_secs(),
            pre_amp_gain_db: 0.0,
        }
    }
}

// 默认值函数（用于 serde default）
fn default_cache_max_mb() -> u64 { 2048 }
fn default_songs_to_prefetch() -> usize { 3 }
fn default_http_connect_timeout_secs() -> u64 { 10 }
fn default_http_read_timeout_secs() -> u64 { 30 }
fn default_progress_interval_ms() -> u64 { 500 }
fn default_keepalive_release_delay_secs() -> u64 { 60 }

impl AppSettings {
    /// 用 `CACHEPLAY_*` 环境变量覆盖配置文件中的值
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
        ) -> Option<T> {
            let key = format!("{ENV_PREFIX}{name}");
            let raw = lookup(&key)?;
            let parsed = raw.trim().parse().ok();
            if parsed.is_none() {
                tracing::warn!(key = %key, value = %raw, "环境变量取值无效，已忽略");
            }
            parsed
        }

        if let Some(v) = parse(&lookup, "CACHE_MAX_MB") {
            self.cache_max_mb = v;
        }
        if let Some(v) = parse(&lookup, "MAX_DOWNLOAD_BYTES_PER_SEC") {
            self.max_download_bytes_per_sec = v;
        }
        if let Some(v) = parse(&lookup, "SONGS_TO_PREFETCH") {
            self.songs_to_prefetch = v;
        }
        if let Some(v) = parse(&lookup, "DOWNLOAD_ALL") {
            self.download_all = v;
        }
        if let Some(v) = parse(&lookup, "HTTP_CONNECT_TIMEOUT_SECS") {
            self.http_connect_timeout_secs = v;
        }
        if let Some(v) = parse(&lookup, "HTTP_READ_TIMEOUT_SECS") {
            self.http_read_timeout_secs = v;
        }
        if let Some(v) = parse(&lookup, "PROGRESS_INTERVAL_MS") {
            self.progress_interval_ms = v;
        }
        if let Some(v) = parse(&lookup, "KEEPALIVE_RELEASE_DELAY_SECS") {
            self.keepalive_release_delay_secs = v;
        }
        if let Some(v) = parse(&lookup, "PRE_AMP_GAIN_DB") {
            self.pre_amp_gain_db = v;
        }
    }
}

pub fn load_settings(data_dir: &Path) -> AppSettings {
    let p = settings_path(data_dir);
    let Ok(bytes) = fs::read(&p) else {
        return AppSettings::default();
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        tracing::warn!(path = %p.display(), err = %e, "配置文件损坏，使用默认配置");
        AppSettings::default()
    })
}

pub fn save_settings(data_dir: &Path, s: &AppSettings) -> std::io::Result<()> {
    fs::create_dir_all(data_dir)?;
    let p = settings_path(data_dir);
    let tmp = p.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(s).map_err(std::io::Error::other)?;
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, &p) {
        let _ = fs::remove_file(&p);
        fs::rename(&tmp, &p).map_err(|_| e)?;
    }
    Ok(())
}

fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}
