//! Provider throttle state shared by all workers.
//!
//! When one worker sees an explicit rate-limit response, every worker holds
//! its next attempt until the pause expires instead of each discovering the
//! limit on its own.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

pub struct Throttle {
    paused_until: Mutex<Option<Instant>>,
    default_pause: Duration,
}

impl Throttle {
    pub fn new(default_pause: Duration) -> Self {
        Self {
            paused_until: Mutex::new(None),
            default_pause,
        }
    }

    /// Extend the shared pause to at least `retry_after_secs` (or the
    /// default) from now. Never shortens an existing pause.
    pub fn pause(&self, retry_after_secs: Option<u64>) {
        let pause = retry_after_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_pause);
        let until = Instant::now() + pause;
        let mut guard = self
            .paused_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.map_or(true, |current| current < until) {
            *guard = Some(until);
            tracing::warn!("Provider throttling; pausing transfers for {}s", pause.as_secs());
        }
    }

    fn deadline(&self) -> Option<Instant> {
        let guard = self
            .paused_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.filter(|until| *until > Instant::now())
    }

    pub fn is_paused(&self) -> bool {
        self.deadline().is_some()
    }

    /// Wait out the current pause, if any.
    pub async fn wait(&self) {
        while let Some(until) = self.deadline() {
            tokio::time::sleep_until(until).await;
        }
    }
}
