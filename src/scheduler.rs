//! Periodic driver that ticks every arena

use crate::manager::ArenaManager;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error};

pub type SharedManager = Arc<Mutex<ArenaManager>>;

/// Runs [`ArenaManager::tick`] once per period on the tokio runtime.
///
/// A late tick is delayed, never followed by a catch-up burst, so each arena
/// sees exactly one tick per period. Ticks extract and delete worlds on disk,
/// so they run on the blocking pool.
pub struct ArenaScheduler {
    handle: JoinHandle<()>,
}

impl ArenaScheduler {
    /// Spawn the tick loop
    pub fn start(manager: SharedManager, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let mut guard = manager.clone().lock_owned().await;
                if let Err(e) = tokio::task::spawn_blocking(move || guard.tick()).await {
                    error!("Arena tick failed: {}", e);
                }
            }
        });

        debug!("Arena scheduler started ({:?} period)", period);
        Self { handle }
    }

    /// Start with the period from the manager's config
    pub async fn from_config(manager: SharedManager) -> Self {
        let ms = manager.lock().await.context().config.tick_interval_ms;
        Self::start(manager, Duration::from_millis(ms.max(1)))
    }

    /// Check if the tick loop is alive
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Abort the tick loop
    pub fn stop(self) {
        self.handle.abort();
        debug!("Arena scheduler stopped");
    }
}
