use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use vest_types::Timestamp;

use crate::traits::Clock;

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// A clock that only moves when told to. Never goes backwards.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Move forward by `seconds`, saturating at `Timestamp::MAX`.
    pub fn advance(&self, seconds: u64) -> Timestamp {
        let step = |now: Timestamp| now.saturating_add(seconds);
        match self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| Some(step(now)))
        {
            Ok(previous) | Err(previous) => step(previous),
        }
    }

    /// Jump to `at`. Earlier instants are ignored.
    pub fn set(&self, at: Timestamp) {
        self.now.fetch_max(at, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
