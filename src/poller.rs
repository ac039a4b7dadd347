//! Lifecycle-bound refresh timer.
//!
//! A [`PollingController`] owns at most one repeating timer task. Views call
//! [`PollingController::ensure_polling`] every time they render with the
//! entity's current `needs_polling` flag; the controller starts or stops the
//! timer accordingly. Dropping the controller stops the timer.

use crate::storage::StorageClient;
use crate::{Result, log_debug, log_warn};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Something that can be asked to refresh itself.
#[async_trait]
pub trait PollTarget: Send + Sync + 'static {
    async fn poll(&self) -> Result<()>;
    fn describe(&self) -> String;
}

/// Polls one volume group through a storage backend.
pub struct VolumeGroupPoll {
    client: Arc<dyn StorageClient>,
    vgroup: String,
}

impl VolumeGroupPoll {
    pub fn new(client: Arc<dyn StorageClient>, vgroup: impl Into<String>) -> Self {
        Self {
            client,
            vgroup: vgroup.into(),
        }
    }
}

#[async_trait]
impl PollTarget for VolumeGroupPoll {
    async fn poll(&self) -> Result<()> {
        self.client.poll(&self.vgroup).await
    }

    fn describe(&self) -> String {
        format!("volume group {}", self.vgroup)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingState {
    Idle,
    Polling,
}

pub struct PollingController {
    runtime: Handle,
    period: Duration,
    target: Arc<dyn PollTarget>,
    timer: Option<JoinHandle<()>>,
}

impl PollingController {
    pub fn new(runtime: Handle, period: Duration, target: Arc<dyn PollTarget>) -> Self {
        Self {
            runtime,
            period,
            target,
            timer: None,
        }
    }

    pub fn state(&self) -> PollingState {
        if self.timer.is_some() {
            PollingState::Polling
        } else {
            PollingState::Idle
        }
    }

    pub fn is_polling(&self) -> bool {
        self.state() == PollingState::Polling
    }

    /// Start the timer when polling is needed and none is running; stop it
    /// when polling is no longer needed. Anything else is a no-op.
    pub fn ensure_polling(&mut self, needs_polling: bool) {
        match (needs_polling, self.timer.is_some()) {
            (true, false) => self.start(),
            (false, true) => self.stop(),
            _ => {}
        }
    }

    /// Force the idle state. Called on view teardown.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            log_debug!("Stopping poll timer for {}", self.target.describe());
            timer.abort();
        }
    }

    fn start(&mut self) {
        let target = Arc::clone(&self.target);
        let period = self.period;
        log_debug!(
            "Polling {} every {} ms",
            target.describe(),
            period.as_millis()
        );

        self.timer = Some(self.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = target.poll().await {
                    log_warn!("Polling {} failed: {}", target.describe(), err);
                }
            }
        }));
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    #[async_trait]
    impl PollTarget for Counter {
        async fn poll(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn describe(&self) -> String {
            "counter".to_string()
        }
    }

    fn controller(counter: &Arc<Counter>) -> PollingController {
        PollingController::new(
            Handle::current(),
            DEFAULT_POLL_INTERVAL,
            Arc::clone(counter) as Arc<dyn PollTarget>,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_interval_while_needed() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut poller = controller(&counter);

        poller.ensure_polling(true);
        assert_eq!(poller.state(), PollingState::Polling);

        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);

        poller.ensure_polling(false);
        assert_eq!(poller.state(), PollingState::Idle);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_requests_keep_a_single_timer() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut poller = controller(&counter);

        for _ in 0..5 {
            poller.ensure_polling(true);
        }
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_the_timer() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        {
            let mut poller = controller(&counter);
            poller.ensure_polling(true);
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_request_without_timer_is_a_no_op() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut poller = controller(&counter);
        poller.ensure_polling(false);
        assert!(!poller.is_polling());
        poller.stop();
        assert!(!poller.is_polling());
    }
}
