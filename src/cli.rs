use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cacheplay", version, about = "边下边播的音乐缓存播放器")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// 覆盖数据目录（默认走系统 data_local_dir）
    #[arg(long, global = true, env = "CACHEPLAY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// 覆盖日志目录（默认 `{data_dir}/logs`）
    #[arg(long, global = true, env = "CACHEPLAY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// 覆盖日志过滤（等价于设置 RUST_LOG）
    #[arg(long, global = true, env = "RUST_LOG")]
    pub log_filter: Option<String>,

    /// 不打开音频设备，只模拟播放时间（也可设置 CACHEPLAY_NO_AUDIO=1）
    #[arg(long, global = true)]
    pub no_audio: bool,
}

impl Cli {
    pub fn no_audio(&self) -> bool {
        self.no_audio || env::var("CACHEPLAY_NO_AUDIO").is_ok_and(|v| parse_flag(&v))
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 播放 JSON 播放列表（歌曲数组）
    Play {
        playlist: PathBuf,

        /// 从第几首开始（从 0 计）
        #[arg(long, default_value_t = 0)]
        start: usize,
    },

    /// 缓存管理
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum CacheAction {
    /// 打印缓存占用
    Stats,
    /// 删除所有缓存文件和记录
    Clear,
}

fn parse_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_start() {
        let cli = Cli::try_parse_from(["cacheplay", "play", "list.json", "--start", "2"])
            .expect("parse");
        match cli.command {
            Command::Play { playlist, start } => {
                assert_eq!(playlist, PathBuf::from("list.json"));
                assert_eq!(start, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_cache_clear_with_global_flags() {
        let cli = Cli::try_parse_from([
            "cacheplay",
            "cache",
            "clear",
            "--data-dir",
            "/tmp/cp",
            "--no-audio",
        ])
        .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheAction::Clear
            }
        ));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/cp")));
        assert!(cli.no_audio);
    }

    #[test]
    fn flag_values() {
        assert!(parse_flag("ON"));
        assert!(parse_flag(" 1 "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("maybe"));
    }
}
