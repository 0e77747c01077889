use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 平台网络保活（例如 Wi-Fi 锁）的获取与释放
pub trait NetworkKeepAlive: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

/// 桌面平台没有需要持有的网络锁，只记录日志
#[derive(Debug, Default)]
pub struct LogKeepAlive;

impl NetworkKeepAlive for LogKeepAlive {
    fn acquire(&self) {
        tracing::debug!("获取网络保活");
    }

    fn release(&self) {
        tracing::debug!("释放网络保活");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    Active,
    Waiting,
    Inactive,
}

struct Inner {
    state: ReservationState,
    generation: u64,
}

/// 网络保活状态机：ACTIVE → WAITING →（延迟后）INACTIVE
///
/// 下载结束后不立即释放，避免连续下载时反复获取/释放。
pub struct NetworkReservation {
    inner: Mutex<Inner>,
    keepalive: Arc<dyn NetworkKeepAlive>,
    release_delay: Duration,
}

impl NetworkReservation {
    pub fn new(keepalive: Arc<dyn NetworkKeepAlive>, release_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: ReservationState::Inactive,
                generation: 0,
            }),
            keepalive,
            release_delay,
        })
    }

    pub fn state(&self) -> ReservationState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// 根据是否有下载在进行更新状态；WAITING 的延迟释放在 tokio 任务里完成
    pub fn update(self: &Arc<Self>, downloading: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if downloading {
            if inner.state == ReservationState::Inactive {
                self.keepalive.acquire();
            }
            if inner.state != ReservationState::Active {
                tracing::debug!(from = ?inner.state, "网络保活 -> ACTIVE");
            }
            inner.state = ReservationState::Active;
            inner.generation = inner.generation.wrapping_add(1);
            return;
        }

        if inner.state != ReservationState::Active {
            return;
        }
        inner.state = ReservationState::Waiting;
        inner.generation = inner.generation.wrapping_add(1);
        let scheduled = inner.generation;
        drop(inner);

        tracing::debug!(delay_ms = self.release_delay.as_millis() as u64, "网络保活 -> WAITING");
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.release_delay).await;
            let mut inner = this.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.generation == scheduled && inner.state == ReservationState::Waiting {
                this.keepalive.release();
                inner.state = ReservationState::Inactive;
                tracing::debug!("网络保活 -> INACTIVE");
            }
        });
    }
}
