/// Login rate limiting
///
/// Fixed-window counter per identifier: the first attempt opens a window of
/// `window_seconds`, every attempt inside it increments the count, and once
/// the count exceeds `max_attempts` the identifier stays limited until the
/// window's reset time passes.
///
/// The counter lives behind [`CounterStore`]. The bundled in-process store is
/// only correct for a single server process; a horizontally scaled
/// deployment needs a shared store implementing the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::configuration::RateLimitSettings;
use crate::error::{AppError, StorageError};

/// Counter state for one identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

/// Key to counter mapping behind the limiter
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count this attempt and return the number of attempts in the current
    /// window, starting a fresh window at 1 when none is open.
    async fn increment(&self, key: &str, window: Duration) -> Result<u32, StorageError>;

    /// Drop records whose window has closed; returns how many were dropped
    async fn sweep_expired(&self) -> Result<usize, StorageError>;
}

/// Process-local counter map
pub struct InMemoryCounterStore {
    records: Arc<Mutex<HashMap<String, RateLimitRecord>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    pub fn record(&self, key: &str) -> Option<RateLimitRecord> {
        self.records.lock().ok().and_then(|r| r.get(key).copied())
    }

    fn poisoned() -> StorageError {
        StorageError::QueryExecution("rate limit store lock poisoned".to_string())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u32, StorageError> {
        let now = self.clock.now();
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;

        let record = records.entry(key.to_string()).or_insert(RateLimitRecord {
            count: 0,
            window_reset_at: now + window,
        });

        // Expiry is checked on access; the sweep is only memory hygiene.
        if now >= record.window_reset_at {
            record.count = 0;
            record.window_reset_at = now + window;
        }

        record.count = record.count.saturating_add(1);
        Ok(record.count)
    }

    async fn sweep_expired(&self) -> Result<usize, StorageError> {
        let now = self.clock.now();
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        let before = records.len();
        records.retain(|_, record| record.window_reset_at > now);
        Ok(before - records.len())
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    max_attempts: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, settings: &RateLimitSettings) -> Self {
        Self {
            store,
            max_attempts: settings.max_attempts,
            window: Duration::seconds(settings.window_seconds),
        }
    }

    /// Count one attempt for `identifier` and report whether it is limited
    pub async fn check_and_increment(&self, identifier: &str) -> Result<bool, AppError> {
        let count = self.store.increment(identifier, self.window).await?;
        let limited = count > self.max_attempts;
        if limited {
            tracing::warn!(
                attempts = count,
                max_attempts = self.max_attempts,
                "Login attempts exceeded for identifier"
            );
        }
        Ok(limited)
    }

    pub async fn sweep(&self) -> Result<usize, AppError> {
        Ok(self.store.sweep_expired().await?)
    }
}

/// Canonical rate-limit key for a login email
pub fn login_identifier(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter() -> (RateLimiter, Arc<InMemoryCounterStore>, ManualClock) {
        let clock = ManualClock::default();
        let store = Arc::new(InMemoryCounterStore::new(Arc::new(clock.clone())));
        let limiter = RateLimiter::new(store.clone(), &RateLimitSettings::default());
        (limiter, store, clock)
    }

    #[tokio::test]
    async fn test_sixth_attempt_in_window_is_limited() {
        let (limiter, _, clock) = limiter();

        for _ in 0..5 {
            assert!(!limiter.check_and_increment("user@example.com").await.unwrap());
            clock.advance(Duration::seconds(5));
        }
        assert!(limiter.check_and_increment("user@example.com").await.unwrap());
        assert!(limiter.check_and_increment("user@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_window_elapsing_resets_count() {
        let (limiter, store, clock) = limiter();

        for _ in 0..6 {
            limiter.check_and_increment("user@example.com").await.unwrap();
        }
        clock.advance(Duration::seconds(60));

        assert!(!limiter.check_and_increment("user@example.com").await.unwrap());
        assert_eq!(store.record("user@example.com").unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_identifiers_are_independent() {
        let (limiter, _, _) = limiter();

        for _ in 0..6 {
            limiter.check_and_increment("a@example.com").await.unwrap();
        }
        assert!(!limiter.check_and_increment("b@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_drops_only_closed_windows() {
        let (limiter, store, clock) = limiter();

        limiter.check_and_increment("old@example.com").await.unwrap();
        clock.advance(Duration::seconds(30));
        limiter.check_and_increment("new@example.com").await.unwrap();
        clock.advance(Duration::seconds(31));

        assert_eq!(limiter.sweep().await.unwrap(), 1);
        assert!(store.record("old@example.com").is_none());
        assert!(store.record("new@example.com").is_some());
    }

    #[test]
    fn test_login_identifier_is_normalized() {
        assert_eq!(login_identifier("  User@Example.COM "), "user@example.com");
    }
}
