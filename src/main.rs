use cacheplay::app::{self, AppPaths};
use cacheplay::cli::{CacheAction, Cli, Command};
use cacheplay::error::AppError;
use cacheplay::logging;
use cacheplay::playback::AudioBackend;
use cacheplay::settings::load_settings;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let paths = AppPaths::new(cli.data_dir.clone());

    let audio_backend = if cli.no_audio() {
        AudioBackend::Null
    } else {
        AudioBackend::Rodio
    };

    let _log_guard = logging::init(
        paths.data_dir(),
        logging::LogConfig {
            dir: cli.log_dir.clone(),
            filter: cli.log_filter.clone(),
            console: true,
        },
    );
    tracing::info!(data_dir = %paths.data_dir().display(), "cacheplay 启动");

    let mut settings = load_settings(paths.data_dir());
    settings.apply_env_overrides();
    tracing::debug!(?settings, "配置已加载");

    match cli.command {
        Command::Play { playlist, start } => {
            tracing::info!(?audio_backend, "启动模式: Play");
            let songs = app::load_playlist(&playlist)?;
            app::play(&paths, &settings, songs, start, audio_backend).await
        }
        Command::Cache {
            action: CacheAction::Stats,
        } => {
            let stats = app::cache_stats(&paths, &settings).await?;
            println!("缓存条目: {}（完整 {}）", stats.entries, stats.fully_cached);
            println!(
                "占用: {} / {}",
                app::format_bytes(stats.cached_bytes),
                app::format_bytes(stats.max_cache_bytes)
            );
            Ok(())
        }
        Command::Cache {
            action: CacheAction::Clear,
        } => {
            let (files, bytes) = app::cache_clear(&paths, &settings).await?;
            println!("已删除 {files} 个文件，共 {}", app::format_bytes(bytes));
            Ok(())
        }
    }
}
