use serde_json::Value;
use std::path::Path;

use crate::domain::Song;
use crate::error::AppError;

pub fn load_playlist(path: &Path) -> Result<Vec<Song>, AppError> {
    let bytes = std::fs::read(path)?;
    let v: Value = serde_json::from_slice(&bytes)?;
    let songs = parse_songs(&v);
    tracing::info!(path = %path.display(), songs = songs.len(), "播放列表已加载");
    Ok(songs)
}

pub fn parse_songs(v: &Value) -> Vec<Song> {
    // 兼容两种写法：
    // - 直接是歌曲数组: [...]
    // - 包一层: {"songs":[...]}
    let songs = v
        .as_array()
        .or_else(|| v.pointer("/songs").and_then(|x| x.as_array()));
    let Some(songs) = songs else {
        return vec![];
    };

    songs
        .iter()
        .enumerate()
        .filter_map(|(i, s)| match serde_json::from_value::<Song>(s.clone()) {
            Ok(song) if !song.url.trim().is_empty() => Some(song),
            Ok(song) => {
                tracing::warn!(index = i, song_id = %song.id, "歌曲缺少下载地址，已跳过");
                None
            }
            Err(e) => {
                tracing::warn!(index = i, err = %e, "歌曲条目无效，已跳过");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_bare_array_and_wrapped_object() {
        let bare = json!([
            {"id": 1, "artist": "A", "title": "One", "url": "http://x/1", "length_sec": 200},
        ]);
        let wrapped = json!({"songs": bare.clone()});

        assert_eq!(parse_songs(&bare).len(), 1);
        assert_eq!(parse_songs(&wrapped), parse_songs(&bare));
        assert_eq!(parse_songs(&bare)[0].length_sec, 200);
    }

    #[test]
    fn skips_invalid_and_urlless_entries() {
        let v = json!([
            {"id": 1, "artist": "A", "title": "One", "url": "http://x/1"},
            {"id": "bad"},
            {"id": 3, "artist": "C", "title": "Three", "url": "  "},
        ]);
        let songs = parse_songs(&v);
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].id.0, 1);
    }

    #[test]
    fn unknown_shape_is_empty() {
        assert!(parse_songs(&json!({"result": 1})).is_empty());
    }
}
