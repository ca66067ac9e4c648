//! Wall-clock abstraction used for every TTL decision.

use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + Debug + 'static {
    /// Get the current UTC datetime
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
