use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Result;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

type SweepFn = Arc<dyn Fn() -> Result<usize> + Send + Sync>;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodically runs the invite expiry sweep on a tokio task.
///
/// The sweep runs once immediately on [`start`](Self::start) and then every
/// `interval`. [`stop`](Self::stop) cancels future ticks; a sweep already in
/// flight on the blocking pool runs to completion.
pub struct InviteExpirationScheduler {
    sweep: SweepFn,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl InviteExpirationScheduler {
    pub fn new<F>(interval: Duration, sweep: F) -> Self
    where
        F: Fn() -> Result<usize> + Send + Sync + 'static,
    {
        Self {
            sweep: Arc::new(sweep),
            interval,
            running: Mutex::new(None),
        }
    }

    /// Starts the timer. Calling it while already running is a no-op.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());

        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Invite expiry scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sweeps(
            Arc::clone(&self.sweep),
            self.interval,
            cancel.clone(),
        ));

        info!(
            interval_secs = self.interval.as_secs(),
            "Starting invite expiry scheduler"
        );
        *running = Some(Running { cancel, handle });
    }

    pub fn stop(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(r) = running.take() {
            r.cancel.cancel();
            info!("Stopping invite expiry scheduler");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for InviteExpirationScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_sweeps(sweep: SweepFn, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let sweep = Arc::clone(&sweep);
        match tokio::task::spawn_blocking(move || sweep()).await {
            Ok(Ok(count)) => debug!(count, "Invite expiry sweep finished"),
            Ok(Err(e)) => error!(error = %e, "Invite expiry sweep failed"),
            Err(e) => error!(error = %e, "Invite expiry sweep task panicked"),
        }
    }

    debug!("Invite expiry scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::Error;

    fn counting(calls: &Arc<AtomicUsize>, fail: bool) -> impl Fn() -> Result<usize> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            if fail {
                Err(Error::Internal("sweep failed".to_string()))
            } else {
                Ok(0)
            }
        }
    }

    #[tokio::test]
    async fn test_sweeps_immediately_on_start() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = InviteExpirationScheduler::new(DEFAULT_SWEEP_INTERVAL, counting(&calls, false));

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_running());

        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_second_start_is_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = InviteExpirationScheduler::new(DEFAULT_SWEEP_INTERVAL, counting(&calls, false));

        scheduler.start();
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_timer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler =
            InviteExpirationScheduler::new(Duration::from_millis(20), counting(&calls, true));

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(scheduler.is_running());
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_stop_cancels_future_ticks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler =
            InviteExpirationScheduler::new(Duration::from_millis(20), counting(&calls, false));

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(70)).await;
        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let after_stop = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(calls.load(Ordering::SeqCst) > after_stop);
        scheduler.stop();
    }
}
