use cacheplay::settings::{AppSettings, load_settings, save_settings};
use std::fs;

#[test]
fn settings_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path();

    let s = AppSettings {
        cache_max_mb: 512,
        max_download_bytes_per_sec: 64 * 1024,
        songs_to_prefetch: 5,
        download_all: true,
        pre_amp_gain_db: -2.5,
        ..AppSettings::default()
    };
    save_settings(data_dir, &s).expect("save_settings");

    let loaded = load_settings(data_dir);
    assert_eq!(loaded, s);
    assert!(!data_dir.join("settings.json.tmp").exists());
}

#[test]
fn settings_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert_eq!(load_settings(dir.path()), AppSettings::default());
}

#[test]
fn settings_corrupt_file_falls_back_to_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path();
    fs::create_dir_all(data_dir).expect("create_dir_all");
    fs::write(data_dir.join("settings.json"), b"{not-json").expect("write");

    let loaded = load_settings(data_dir);
    assert_eq!(loaded.cache_max_mb, AppSettings::default().cache_max_mb);
    assert_eq!(loaded.songs_to_prefetch, 3);
}
