/// 降低音量（ducking）时的固定比例
pub const LOW_VOLUME_FRACTION: f64 = 0.2;

/// 实际音量拆成两段：`volume` 不超过 1.0，超过的部分用后级放大实现
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume {
    pub volume: f32,
    pub post_amp: f32,
}

impl Default for Volume {
    fn default() -> Self {
        Self {
            volume: 1.0,
            post_amp: 1.0,
        }
    }
}

/// `pct = 10^((pre + track)/20)`，ducking 时乘以固定比例，并限制 `pct * peak <= 1`
pub fn compute_volume(
    pre_amp_db: f64,
    track_gain_db: Option<f64>,
    peak_amp: Option<f64>,
    low_volume: bool,
) -> Volume {
    let mut pct = 10f64.powf((pre_amp_db + track_gain_db.unwrap_or(0.0)) / 20.0);
    if low_volume {
        pct *= LOW_VOLUME_FRACTION;
    }
    if let Some(peak) = peak_amp.filter(|p| *p > 0.0) {
        pct = pct.min(1.0 / peak);
    }
    if !pct.is_finite() || pct < 0.0 {
        return Volume::default();
    }

    if pct > 1.0 {
        Volume {
            volume: 1.0,
            post_amp: pct as f32,
        }
    } else {
        Volume {
            volume: pct as f32,
            post_amp: 1.0,
        }
    }
}
