//! Per-record retry delays for failed reconcile passes
//!
//! Only the dispatch layer keeps this state. The reconcile decision itself
//! never looks at it. Entries whose last failure is older than twice the cap
//! are dropped, so records deleted while failing do not linger.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::crd::Identity;
use crate::error::Error;

#[derive(Debug)]
struct Attempts {
    count: u32,
    last_failure: Instant,
}

/// Exponential backoff with a cap, tracked per identity
#[derive(Debug)]
pub struct RetryBackoff {
    base: Duration,
    max: Duration,
    attempts: Mutex<HashMap<Identity, Attempts>>,
}

impl RetryBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before retrying `identity` after `error`
    ///
    /// Conflicts retry after the base delay without growing it: the next pass
    /// re-reads the record and usually succeeds.
    pub fn next_delay(&self, identity: &Identity, error: &Error) -> Duration {
        if error.is_conflict() {
            return self.base;
        }
        let now = Instant::now();
        let stale_after = self.max.saturating_mul(2);
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.retain(|_, a| now.saturating_duration_since(a.last_failure) <= stale_after);

        let entry = attempts.entry(identity.clone()).or_insert(Attempts {
            count: 0,
            last_failure: now,
        });
        entry.count = entry.count.saturating_add(1);
        entry.last_failure = now;
        self.delay_for(entry.count)
    }

    /// Forget failures after a successful pass
    pub fn reset(&self, identity: &Identity) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity);
    }

    /// Number of identities with a failure streak
    pub fn tracked(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}
