//! Clock variants and the deterministic replay driver (spec §4.10).
//!
//! The set-clock's `Until`/`Set` pair is implemented on top of
//! `tokio::sync::watch`, which is exactly the broadcast-on-write /
//! wait-on-condition protocol spec §4.10 calls for (a shared mutex-protected
//! `now` that every `Until` waits on and every `Set` broadcasts): a `watch`
//! channel *is* that protocol, just without us hand-rolling the mutex.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

pub mod replay;
pub use replay::{replay_batch_from_io, replay_stream_from_io, ReplayError};

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("clock inversion: attempted to set time to {attempted} which is before current time {current}")]
    Inversion { current: i64, attempted: i64 },
}

/// Nanosecond-precision virtual time.
#[async_trait]
pub trait Clock: Send + Sync {
    /// The clock's start instant.
    fn zero(&self) -> i64;

    /// The clock's current instant, best-effort (for logging/diagnostics;
    /// don't build correctness on its exact value for `FastClock`).
    fn now(&self) -> i64;

    /// Block until clock time >= `t`. Returns immediately if `t` is already
    /// in the past.
    async fn until(&self, t: i64);
}

/// Real wall-clock time, in nanoseconds since `zero`.
pub struct WallClock {
    start_instant: std::time::Instant,
    zero_nanos: i64,
}

impl WallClock {
    pub fn new(zero_nanos: i64) -> Self {
        Self {
            start_instant: std::time::Instant::now(),
            zero_nanos,
        }
    }
}

#[async_trait]
impl Clock for WallClock {
    fn zero(&self) -> i64 {
        self.zero_nanos
    }

    fn now(&self) -> i64 {
        self.zero_nanos + self.start_instant.elapsed().as_nanos() as i64
    }

    async fn until(&self, t: i64) {
        let now = self.now();
        if t <= now {
            return;
        }
        let delta = (t - now) as u64;
        tokio::time::sleep(std::time::Duration::from_nanos(delta)).await;
    }
}

/// A clock that is always ahead of whatever's asked of it: `until` never
/// blocks. Used to drive batched replays through at full speed.
pub struct FastClock {
    zero_nanos: i64,
}

impl FastClock {
    pub fn new(zero_nanos: i64) -> Self {
        Self { zero_nanos }
    }
}

#[async_trait]
impl Clock for FastClock {
    fn zero(&self) -> i64 {
        self.zero_nanos
    }

    fn now(&self) -> i64 {
        i64::MAX
    }

    async fn until(&self, _t: i64) {}
}

/// A clock externally driven by `set`: the deterministic path used by tests
/// and replay (§8 "Replay determinism", Scenario E).
pub struct SetClock {
    zero_nanos: i64,
    tx: watch::Sender<i64>,
    rx: watch::Receiver<i64>,
}

impl SetClock {
    pub fn new(zero_nanos: i64) -> Self {
        let (tx, rx) = watch::channel(zero_nanos);
        Self { zero_nanos, tx, rx }
    }

    /// Advance clock time to `t`. Must be monotonic non-decreasing.
    pub fn set(&self, t: i64) -> Result<(), ClockError> {
        let current = *self.tx.borrow();
        if t < current {
            return Err(ClockError::Inversion { current, attempted: t });
        }
        // `send` is a no-op (and fine) if t == current: it still notifies
        // waiters, which matters for `until(t)` called with t == current.
        let _ = self.tx.send(t);
        Ok(())
    }
}

#[async_trait]
impl Clock for SetClock {
    fn zero(&self) -> i64 {
        self.zero_nanos
    }

    fn now(&self) -> i64 {
        *self.rx.borrow()
    }

    async fn until(&self, t: i64) {
        let mut rx = self.rx.clone();
        if *rx.borrow() >= t {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() >= t {
                return;
            }
        }
        // Sender dropped: nothing more will ever advance time. Treat the
        // clock as permanently stalled at its last value (the task is
        // shutting down).
    }
}

impl Clone for SetClock {
    fn clone(&self) -> Self {
        Self {
            zero_nanos: self.zero_nanos,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn fast_clock_until_never_blocks() {
        let c = FastClock::new(0);
        tokio::time::timeout(Duration::from_millis(50), c.until(i64::MAX / 2))
            .await
            .expect("fast clock must not block");
    }

    #[tokio::test]
    async fn set_clock_rejects_inversion() {
        let c = SetClock::new(0);
        c.set(100).unwrap();
        assert!(matches!(c.set(50), Err(ClockError::Inversion { .. })));
    }

    #[tokio::test]
    async fn set_clock_until_returns_immediately_for_past_time() {
        let c = SetClock::new(0);
        c.set(100).unwrap();
        tokio::time::timeout(Duration::from_millis(20), c.until(50))
            .await
            .expect("until(t) for past t must return immediately");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scenario_e_until_unblocks_on_set() {
        // Spec §8 Scenario E: Until(t0+10ms) spawned before Set(t0+9ms) does
        // not return; after Set(t0+10ms) it returns within the test timeout.
        let clock = Arc::new(SetClock::new(0));
        let waiter = {
            let clock = clock.clone();
            tokio::spawn(async move {
                clock.until(10_000_000).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        clock.set(9_000_000).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "must not unblock before t is reached");

        clock.set(10_000_000).unwrap();
        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("must unblock once t is reached")
            .unwrap();
    }
}
