//! Timer Coalescing
//!
//! Many time-gated feeds wake at the same instant (session open, bar
//! boundaries). The scheduler keeps one timer per distinct timestamp and
//! fans the wake-up out to every callback registered for it.
//!
//! Timers are single-shot. A callback registered against a timestamp whose
//! timer has already fired is dropped rather than run late; callers must not
//! register against a consumed timestamp.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::infrastructure::metrics;

/// Requests closer than this many seconds to "now" run synchronously.
const IMMEDIATE_WINDOW_SECS: f64 = 1.0;

/// Timers fire this much ahead of the requested instant.
const TIMER_LEAD_MS: i64 = 10;

/// An absolute instant the scheduler can wait for.
pub trait Deadline {
    /// Whether the instant has already passed.
    fn is_past(&self) -> bool;

    /// Seconds until the instant (negative once past).
    fn seconds_from_now(&self) -> f64;

    /// Milliseconds until the instant (negative once past).
    fn milliseconds_from_now(&self) -> i64;

    /// Canonical dedup key for the instant.
    fn key(&self) -> i64;
}

impl Deadline for DateTime<Utc> {
    fn is_past(&self) -> bool {
        *self <= Utc::now()
    }

    #[allow(clippy::cast_precision_loss)]
    fn seconds_from_now(&self) -> f64 {
        self.milliseconds_from_now() as f64 / 1_000.0
    }

    fn milliseconds_from_now(&self) -> i64 {
        (*self - Utc::now()).num_milliseconds()
    }

    fn key(&self) -> i64 {
        self.timestamp_millis()
    }
}

type Callback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct PendingWait {
    callbacks: Vec<Callback>,
    fired: bool,
}

/// Coalesces "fire at time T" requests into one timer per timestamp.
///
/// Cheap to clone; clones share the same timer table.
#[derive(Clone, Default)]
pub struct Scheduler {
    timers: Arc<Mutex<HashMap<i64, PendingWait>>>,
    armed: Arc<AtomicU64>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("armed_timers", &self.armed_timers())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler with no timers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` at `time`.
    ///
    /// Runs synchronously, before returning, when `time` is past or less
    /// than a second away. Otherwise the callback joins the pending wait for
    /// that timestamp, arming a timer only if none exists yet. Must be called
    /// from within a Tokio runtime.
    pub fn notify<T, F>(&self, time: &T, callback: F)
    where
        T: Deadline + ?Sized,
        F: FnOnce() + Send + 'static,
    {
        if time.is_past() || time.seconds_from_now() < IMMEDIATE_WINDOW_SECS {
            callback();
            return;
        }

        let key = time.key();
        let mut timers = self.timers.lock();
        match timers.entry(key) {
            Entry::Occupied(mut entry) => {
                let wait = entry.get_mut();
                if wait.fired {
                    tracing::debug!(key, "Timer already fired, dropping late callback");
                } else {
                    wait.callbacks.push(Box::new(callback));
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingWait {
                    callbacks: vec![Box::new(callback)],
                    fired: false,
                });
                drop(timers);
                self.arm(key, time.milliseconds_from_now() - TIMER_LEAD_MS);
            }
        }
    }

    /// Number of timers armed since creation.
    #[must_use]
    pub fn armed_timers(&self) -> u64 {
        self.armed.load(Ordering::Relaxed)
    }

    /// Timestamps whose timer has not fired yet.
    #[must_use]
    pub fn pending(&self) -> Vec<i64> {
        let mut keys: Vec<_> = self
            .timers
            .lock()
            .iter()
            .filter(|(_, wait)| !wait.fired)
            .map(|(key, _)| *key)
            .collect();
        keys.sort_unstable();
        keys
    }

    fn arm(&self, key: i64, delay_ms: i64) {
        self.armed.fetch_add(1, Ordering::Relaxed);
        metrics::record_timer_armed();

        let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));
        let timers = Arc::clone(&self.timers);
        tracing::trace!(key, delay_ms, "Timer armed");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let callbacks = {
                let mut timers = timers.lock();
                timers.get_mut(&key).map_or_else(Vec::new, |wait| {
                    wait.fired = true;
                    std::mem::take(&mut wait.callbacks)
                })
            };

            tracing::trace!(key, callbacks = callbacks.len(), "Timer fired");
            for callback in callbacks {
                callback();
            }
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
