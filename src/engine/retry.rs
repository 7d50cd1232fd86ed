//! Retry policy and scheduler
//!
//! A failed decision call is retried after a delay taken from the backoff
//! table for the environment. Scheduled retries are kept in a registry keyed
//! by resource id so they can be listed and cancelled; scheduling a retry for
//! a resource that already has one pending replaces it.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::resource::Action;

/// Total decision calls before a resource is marked failed
pub const MAX_ATTEMPTS: u32 = 6;

/// Delays between attempts, indexed by `attempt - 1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffTable {
    delays: Vec<Duration>,
}

impl BackoffTable {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// 30s, 2m, 5m, 10m, 30m
    pub fn production() -> Self {
        Self::from_secs(&[30, 120, 300, 600, 1800])
    }

    /// 3s, 3s (every other environment)
    pub fn short() -> Self {
        Self::from_secs(&[3, 3])
    }

    fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// Delay before retry number `attempt` (1-based). Attempts past the end
    /// of the table reuse the last entry.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = (attempt.max(1) - 1) as usize;
        self.delays
            .get(index)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Record `attempt` and try again after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Attempts exhausted
    GiveUp { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffTable,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffTable) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Decide on the next step after a failure. `previous_attempt` is the
    /// attempt count recorded so far (0 for a first dispatch).
    pub fn next(&self, previous_attempt: u32) -> RetryDecision {
        let attempt = previous_attempt + 1;
        if attempt < self.max_attempts {
            RetryDecision::Retry {
                attempt,
                delay: self.backoff.delay_for(attempt),
            }
        } else {
            RetryDecision::GiveUp { attempts: attempt }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS, BackoffTable::short())
    }
}

/// A retry waiting for its timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRetry {
    pub resource_id: String,
    pub action: Action,
    /// Attempt count recorded before the retry fires
    pub attempt: u32,
    pub fire_at: DateTime<Utc>,
}

struct Scheduled {
    info: PendingRetry,
    token: u64,
    handle: AbortHandle,
}

/// Registry of delayed retries
#[derive(Default)]
pub struct RetryScheduler {
    pending: Arc<DashMap<String, Scheduled>>,
    next_token: AtomicU64,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any retry pending for the same
    /// resource. The entry leaves the registry when the timer fires.
    pub fn schedule<F>(&self, info: PendingRetry, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let key = info.resource_id.clone();

        // Hold the entry while spawning so the task cannot fire before it is
        // registered.
        let entry = self.pending.entry(key.clone());

        let pending = Arc::clone(&self.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.remove_if(&key, |_, scheduled| scheduled.token == token);
            task.await;
        })
        .abort_handle();

        let scheduled = Scheduled { info, token, handle };
        match entry {
            Entry::Occupied(mut occupied) => {
                let replaced = occupied.insert(scheduled);
                debug!(resource = %replaced.info.resource_id, "Replacing pending retry");
                replaced.handle.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(scheduled);
            }
        }
    }

    /// Cancel the pending retry of a resource. Returns true if one existed.
    pub fn cancel(&self, resource_id: &str) -> bool {
        match self.pending.remove(resource_id) {
            Some((_, scheduled)) => {
                scheduled.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending retry, returning how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let keys: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        keys.iter().filter(|key| self.cancel(key)).count()
    }

    /// Snapshot of the registry, soonest first
    pub fn pending(&self) -> Vec<PendingRetry> {
        let mut pending: Vec<PendingRetry> = self.pending.iter().map(|e| e.info.clone()).collect();
        pending.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.resource_id.cmp(&b.resource_id)));
        pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn info(id: &str, attempt: u32) -> PendingRetry {
        PendingRetry {
            resource_id: id.to_string(),
            action: Action::Publish,
            attempt,
            fire_at: Utc::now(),
        }
    }

    #[test]
    fn test_backoff_lookup() {
        let table = BackoffTable::production();
        assert_eq!(table.delay_for(1), Duration::from_secs(30));
        assert_eq!(table.delay_for(5), Duration::from_secs(1800));

        let short = BackoffTable::short();
        assert_eq!(short.delay_for(2), Duration::from_secs(3));
        // clamped to the last entry
        assert_eq!(short.delay_for(5), Duration::from_secs(3));

        assert_eq!(BackoffTable::new(Vec::new()).delay_for(1), Duration::ZERO);
    }

    #[test]
    fn test_policy_gives_up_at_max_attempts() {
        let policy = RetryPolicy::new(MAX_ATTEMPTS, BackoffTable::production());
        assert_eq!(
            policy.next(0),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_secs(30)
            }
        );
        assert_eq!(
            policy.next(4),
            RetryDecision::Retry {
                attempt: 5,
                delay: Duration::from_secs(1800)
            }
        );
        assert_eq!(policy.next(5), RetryDecision::GiveUp { attempts: 6 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_fires_and_leaves_registry() {
        let scheduler = RetryScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        scheduler.schedule(info("r1", 1), Duration::from_secs(3), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending() {
        let scheduler = RetryScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for attempt in 1..=2 {
            let counter = Arc::clone(&fired);
            scheduler.schedule(info("r1", attempt), Duration::from_secs(3), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(scheduler.pending()[0].attempt, 2);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let scheduler = RetryScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for id in ["r1", "r2"] {
            let counter = Arc::clone(&fired);
            scheduler.schedule(info(id, 1), Duration::from_secs(3), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(scheduler.cancel_all(), 2);
        assert!(!scheduler.cancel("r1"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
