//! Deterministic clocks.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use table_orders_core::environment::Clock;

/// Clock that only moves when told to.
///
/// Clones share the same time, so a ledger and a service built from clones
/// of one clock agree on "now".
///
/// # Example
///
/// ```
/// use table_orders_testing::test_clock;
/// use table_orders_core::environment::Clock;
/// use chrono::Duration;
///
/// let clock = test_clock();
/// let start = clock.now();
/// clock.advance(Duration::minutes(11));
/// assert_eq!(clock.now() - start, Duration::minutes(11));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock stopped at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut time = self.time.lock().unwrap();
        *time += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.time.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap()
    }
}

/// Create a default manual clock for tests (2025-01-01 00:00:00 UTC)
///
/// # Panics
///
/// This function will panic if the hardcoded timestamp fails to parse,
/// which should never happen in practice.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> ManualClock {
    ManualClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}
