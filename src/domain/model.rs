use serde::{Deserialize, Serialize};
use std::fmt;

/// 曲库中歌曲的稳定标识
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SongId(pub i64);

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SongId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// 歌曲元数据（与下载状态无关）
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub album: String,
    /// 远端音频地址，支持 `Range: bytes=<offset>-`
    pub url: String,
    #[serde(default)]
    pub length_sec: u32,
    /// ReplayGain 曲目增益（dB）
    #[serde(default)]
    pub track_gain_db: Option<f64>,
    /// 峰值振幅（线性，1.0 为满幅）
    #[serde(default)]
    pub peak_amp: Option<f64>,
}

impl Song {
    pub fn display_title(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }

    pub fn length_ms(&self) -> u64 {
        u64::from(self.length_sec) * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn song_deserializes_with_optional_fields_missing() {
        let s: Song = serde_json::from_str(
            r#"{"id": 7, "artist": "A", "title": "T", "url": "http://x/7"}"#,
        )
        .expect("parse");
        assert_eq!(s.id, SongId(7));
        assert_eq!(s.length_sec, 0);
        assert!(s.track_gain_db.is_none());
        assert_eq!(s.display_title(), "A - T");
    }
}
