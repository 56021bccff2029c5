//! One-shot start-of-game barrier for Catwire.
//!
//! When every client of a game runs inside one process, the clients check
//! in to completion before any task plays the server's part, so the game
//! could open its first day with whole populations absent. The
//! [`StartBarrier`] is the rendezvous that prevents that: every locally
//! launched client counts itself in and blocks, and the game controller
//! blocks the first day-opening until the expected population has arrived
//! or a timeout elapses.
//!
//! The barrier is strictly one-shot. Once released it never re-arms;
//! counting in after release is accepted and ignored, and a second
//! [`sync`](StartBarrier::sync) fails immediately. The intended usage
//! drops the barrier once the game has started, since its only job is
//! this single rendezvous.
//!
//! # Integration
//!
//! ```ignore
//! // each client task, after a successful check-in:
//! barrier.count_me();
//! barrier.wait_for_clients().await;
//!
//! // the game controller, before opening day 1:
//! if let Err(e) = barrier.sync().await {
//!     tracing::warn!(error = %e, "opening the game without full population");
//! }
//! ```

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Configuration for the start barrier.
#[derive(Debug, Clone)]
pub struct BarrierConfig {
    /// How long [`StartBarrier::sync`] waits for the expected population
    /// before opening the game anyway.
    pub timeout: Duration,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

/// Errors surfaced by the barrier.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BarrierError {
    /// The timeout elapsed before the expected population arrived. The
    /// barrier is released anyway; the caller decides whether to proceed.
    #[error("start barrier timed out: {arrived}/{expected} clients checked in")]
    TimedOut {
        /// Clients that had counted in when the timeout fired.
        arrived: usize,
        /// The population the barrier was waiting for.
        expected: usize,
    },

    /// The one-shot barrier has already been released; a second
    /// rendezvous cannot be run on the same instance.
    #[error("start barrier already released")]
    AlreadyReleased,
}

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    released: bool,
    /// Set when a `sync` call has claimed the barrier.
    claimed: bool,
}

/// A one-shot counting barrier between locally launched clients and the
/// game controller.
#[derive(Debug)]
pub struct StartBarrier {
    expected: usize,
    timeout: Duration,
    state: Mutex<BarrierState>,
    notify: Notify,
}

impl StartBarrier {
    /// Creates a barrier waiting for `expected` clients, with the default
    /// 60-second timeout.
    pub fn new(expected: usize) -> Self {
        Self::with_config(expected, BarrierConfig::default())
    }

    /// Creates a barrier with an explicit configuration.
    pub fn with_config(expected: usize, config: BarrierConfig) -> Self {
        Self {
            expected,
            timeout: config.timeout,
            state: Mutex::new(BarrierState {
                arrived: 0,
                released: false,
                claimed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Counts the calling client into the barrier.
    ///
    /// Accepted at any time; arrivals after release are counted but can
    /// never trigger a second release.
    pub fn count_me(&self) {
        let arrived = {
            let mut state = self.state.lock().expect("barrier state lock poisoned");
            state.arrived += 1;
            state.arrived
        };
        tracing::debug!(arrived, expected = self.expected, "client counted in");
        self.notify.notify_waiters();
    }

    /// Blocks the calling client until the barrier releases.
    pub async fn wait_for_clients(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register for wakeups before checking, so a release landing
            // in between is not lost.
            notified.as_mut().enable();
            if self.state.lock().expect("barrier state lock poisoned").released {
                return;
            }
            notified.await;
        }
    }

    /// The game controller's wait: returns once the expected population
    /// has counted in, or with [`BarrierError::TimedOut`] after the
    /// timeout. Either way the barrier releases every waiting client
    /// exactly once.
    ///
    /// # Errors
    /// - [`BarrierError::AlreadyReleased`] if the barrier was used before
    /// - [`BarrierError::TimedOut`] if the population never completed
    pub async fn sync(&self) -> Result<(), BarrierError> {
        {
            let mut state = self.state.lock().expect("barrier state lock poisoned");
            if state.claimed || state.released {
                return Err(BarrierError::AlreadyReleased);
            }
            state.claimed = true;
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock().expect("barrier state lock poisoned");
                if state.arrived >= self.expected {
                    state.released = true;
                    drop(state);
                    tracing::info!(expected = self.expected, "all clients started");
                    self.notify.notify_waiters();
                    return Ok(());
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let arrived = {
                    let mut state = self.state.lock().expect("barrier state lock poisoned");
                    state.released = true;
                    state.arrived
                };
                tracing::warn!(
                    arrived,
                    expected = self.expected,
                    "start barrier timed out; releasing waiters"
                );
                self.notify.notify_waiters();
                return Err(BarrierError::TimedOut {
                    arrived,
                    expected: self.expected,
                });
            }
        }
    }

    /// Clients counted in so far.
    pub fn arrived(&self) -> usize {
        self.state.lock().expect("barrier state lock poisoned").arrived
    }

    /// `true` once the barrier has released its waiters.
    pub fn is_released(&self) -> bool {
        self.state.lock().expect("barrier state lock poisoned").released
    }
}
