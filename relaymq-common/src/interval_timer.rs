use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::TimerError;

/// Callback fired on every tick. Errors are logged; a periodic schedule
/// keeps running through them.
pub type TimerCallback = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// Cancellable periodic trigger with a single active schedule.
///
/// Each [`IntervalTimer::start`] supersedes the previous schedule; the
/// instance scope cancels everything.
#[derive(Debug)]
pub struct IntervalTimer {
    name: String,
    scope: CancellationToken,
    schedule: Mutex<Option<CancellationToken>>,
}

impl IntervalTimer {
    pub fn new(name: &str, scope: CancellationToken) -> Self {
        Self {
            name: name.to_string(),
            scope,
            schedule: Mutex::new(None),
        }
    }

    /// Schedule `callback` to fire every `period`, starting one `period`
    /// from now. With `fire_once` the schedule ends after the first tick.
    /// Any prior schedule is cancelled first; overlapping calls are
    /// serialized and the most recent schedule wins.
    pub async fn start(
        &self,
        period: Duration,
        mut callback: TimerCallback,
        fire_once: bool,
    ) -> Result<JoinHandle<()>, TimerError> {
        if self.scope.is_cancelled() {
            return Err(TimerError::Cancelled);
        }

        let mut slot = self.schedule.lock().await;
        if let Some(prior) = slot.take() {
            debug!(target: "interval_timer", timer = %self.name, "superseding active schedule");
            prior.cancel();
        }
        let schedule = self.scope.child_token();
        *slot = Some(schedule.clone());

        let name = self.name.clone();
        let handle = tokio::spawn(async move {
            info!(target: "interval_timer", timer = %name, period = ?period, fire_once, "schedule started");
            let mut ticker = interval_at(Instant::now() + period, period);
            // Keep the inter-fire gap at least one period even after a slow callback.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = schedule.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = callback() {
                            warn!(target: "interval_timer", timer = %name, error = %error, "timer callback failed");
                        }
                        if fire_once {
                            break;
                        }
                    }
                }
            }
            info!(target: "interval_timer", timer = %name, "schedule stopped");
        });
        Ok(handle)
    }
}

#[cfg(test)]
#[path = "interval_timer_test.rs"]
mod tests;
