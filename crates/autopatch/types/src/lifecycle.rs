//! Cooperative stop flags and owned background tasks
//!
//! Every long-lived loop in the pipeline is a [`BackgroundTask`]: a tokio
//! task paired with the sender side of a `watch<bool>` stop flag. Shutting
//! a task down signals the flag and awaits the task, so no loop outlives
//! the component that started it. In-flight operations that suspend (poll
//! waits, health sampling, limiter waits) hold a [`StopSignal`] and return
//! early once it fires.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

// ── Stop Flag ──────────────────────────────────────────────────────────

/// Owning side of a stop flag.
#[derive(Debug)]
pub struct StopSource {
    tx: watch::Sender<bool>,
}

impl StopSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Clear the flag so the owner can be started again.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Clonable receiving side of a stop flag.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is set. Never resolves if the source is
    /// dropped without stopping.
    pub async fn stopped(&mut self) {
        let observed = self.rx.wait_for(|stopped| *stopped).await.map(|_| ());
        if observed.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration`; returns `false` if stopped before or during
    /// the wait.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_stopped() {
            return false;
        }
        let mut waiter = self.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = waiter.stopped() => return false,
        }
        !self.is_stopped()
    }
}

// ── Background Task ────────────────────────────────────────────────────

/// A named tokio task owned together with its stop flag.
#[derive(Debug)]
pub struct BackgroundTask {
    name: String,
    stop: StopSource,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Run `f` with a stop signal; `f` is expected to return once stopped.
    pub fn spawn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let stop = StopSource::new();
        let handle = tokio::spawn(f(stop.signal()));
        debug!(task = %name, "Background task spawned");
        Self { name, stop, handle }
    }

    /// Run `tick` once per `period` until stopped. The first tick fires
    /// immediately; a tick that is already running finishes before the
    /// loop observes the stop.
    pub fn spawn_periodic<F, Fut>(name: impl Into<String>, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        Self::spawn(name, move |mut stop| async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => tick().await,
                    _ = stop.stopped() => break,
                }
                if stop.is_stopped() {
                    break;
                }
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal stop and wait for the task to finish.
    pub async fn shutdown(self) {
        self.stop.stop();
        match self.handle.await {
            Ok(()) => debug!(task = %self.name, "Background task stopped"),
            Err(e) if e.is_panic() => error!(task = %self.name, "Background task panicked"),
            Err(_) => debug!(task = %self.name, "Background task cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn periodic_task_ticks_until_shutdown() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let task = BackgroundTask::spawn_periodic("ticker", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        task.shutdown().await;
        let seen = ticks.load(Ordering::SeqCst);
        assert_eq!(seen, 4);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_returns_false_when_stopped() {
        let source = StopSource::new();
        let mut signal = source.signal();
        let waiter = tokio::spawn(async move { signal.sleep(Duration::from_secs(3600)).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        source.stop();
        assert!(!waiter.await.unwrap());

        source.reset();
        let mut signal = source.signal();
        assert!(signal.sleep(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn spawn_hands_out_working_signal() {
        let task = BackgroundTask::spawn("waiter", |mut stop| async move {
            stop.stopped().await;
        });
        assert_eq!(task.name(), "waiter");
        task.shutdown().await;
    }
}
