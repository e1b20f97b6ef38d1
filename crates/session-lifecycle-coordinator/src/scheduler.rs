//! Side effects that only exist while authenticated.

use crate::AuthState;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Callback fired on every tick of the authenticated-only timer.
pub type SideEffectCallback = Arc<dyn Fn() + Send + Sync>;

/// Owns the repeating timer tied to the `Authenticated` state.
///
/// [`arm`](Self::arm) is called on every transition: entering or staying in
/// `Authenticated` keeps exactly one timer running, anything else cancels it.
pub struct SideEffectScheduler {
    period: Duration,
    callback: Arc<Mutex<Option<SideEffectCallback>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SideEffectScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            callback: Arc::new(Mutex::new(None)),
            timer: Mutex::new(None),
        }
    }

    /// Register the callback. Applies to ticks from now on, including those
    /// of an already running timer.
    pub fn set_callback(&self, callback: SideEffectCallback) {
        *self.callback.lock() = Some(callback);
    }

    /// Start or stop the timer to match `state`.
    pub fn arm(&self, state: &AuthState) {
        let mut timer = self.timer.lock();

        if !state.is_authenticated() {
            if let Some(handle) = timer.take() {
                handle.abort();
                debug!(state = %state.phase(), "Side-effect timer cancelled");
            }
            return;
        }

        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let period = self.period;
        let callback = Arc::clone(&self.callback);
        *timer = Some(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let current = callback.lock().clone();
                if let Some(callback) = current {
                    callback();
                }
            }
        }));
        info!(period_secs = period.as_secs(), "Side-effect timer armed");
    }

    /// Cancel the timer regardless of state.
    pub fn cancel(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for SideEffectScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity_backend::Session;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PERIOD: Duration = Duration::from_secs(600);

    fn authenticated() -> AuthState {
        let session = Session::new("t1", "u1");
        AuthState::Authenticated {
            user: session.minimal_user(),
            session,
        }
    }

    fn counting(scheduler: &SideEffectScheduler) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        scheduler.set_callback(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        count
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_every_period_while_authenticated() {
        let scheduler = SideEffectScheduler::new(PERIOD);
        let count = counting(&scheduler);

        scheduler.arm(&authenticated());
        tokio::time::sleep(PERIOD / 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(PERIOD * 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_keeps_a_single_timer() {
        let scheduler = SideEffectScheduler::new(PERIOD);
        let count = counting(&scheduler);

        scheduler.arm(&authenticated());
        scheduler.arm(&authenticated());
        scheduler.arm(&authenticated());

        tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_authenticated_cancels() {
        let scheduler = SideEffectScheduler::new(PERIOD);
        let count = counting(&scheduler);

        scheduler.arm(&authenticated());
        assert!(scheduler.is_armed());

        scheduler.arm(&AuthState::SigningOut);
        assert!(!scheduler.is_armed());

        tokio::time::sleep(PERIOD * 3).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_reentering_authenticated() {
        let scheduler = SideEffectScheduler::new(PERIOD);
        let count = counting(&scheduler);

        scheduler.arm(&authenticated());
        scheduler.arm(&AuthState::Unauthenticated);
        scheduler.arm(&authenticated());

        tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
