//! 播放协调：播放列表、预取窗口、边下边播的开播判断和播放记录上报。

mod actor;
mod messages;
mod policy;
mod recent;
mod report;
mod session;

pub use actor::{CoordinatorConfig, PlaybackCoordinator};
pub use messages::{CoordinatorCommand, UiEvent};
pub use policy::{
    EXTRA_BUFFER_MS, MIN_BYTES_BEFORE_PLAYING, REPORT_THRESHOLD_MS, can_resume_after_stall,
    can_start_playback, report_threshold_ms,
};
pub use recent::{RECENT_CAPACITY, RecentSongs};
pub use report::{ChannelReporter, LogReporter, PlayReporter};
pub use session::{DownloadSlot, PlaybackSession, RemoveOutcome, StalledAt};
