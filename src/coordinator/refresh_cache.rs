//! Time-based gate for metadata refreshes.
//!
//! The cache remembers when the last successful refresh happened and
//! answers whether another one is due. It is a plain value: the coordinator
//! owns it and synchronizes access; time comes from an injected [`Clock`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Wall-clock implementation backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Last-refresh timestamp plus a fixed TTL.
#[derive(Debug, Clone, Copy)]
pub struct RefreshCache {
    ttl: Duration,
    last_refresh: Option<Instant>,
}

impl RefreshCache {
    /// Create a cache that has never been refreshed.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_refresh: None,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    /// True iff no refresh has succeeded yet or more than `ttl` has elapsed.
    ///
    /// Exactly `ttl` after the last refresh the cache is still fresh.
    pub fn should_refresh(&self, now: Instant) -> bool {
        match self.last_refresh {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.ttl,
        }
    }

    /// Record a successful refresh at `now`.
    pub fn mark_refreshed(&mut self, now: Instant) {
        self.last_refresh = Some(now);
    }

    /// Force the next [`should_refresh`](Self::should_refresh) to return true.
    pub fn invalidate(&mut self) {
        self.last_refresh = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_never_refreshed_is_stale() {
        let clock = ManualClock::new();
        let cache = RefreshCache::new(TTL);
        assert!(cache.should_refresh(clock.now()));
        assert!(cache.last_refresh().is_none());
    }

    #[test]
    fn test_fresh_within_ttl() {
        let clock = ManualClock::new();
        let mut cache = RefreshCache::new(TTL);
        cache.mark_refreshed(clock.now());

        clock.advance(Duration::from_secs(30));
        assert!(!cache.should_refresh(clock.now()));
    }

    #[test]
    fn test_exactly_ttl_is_still_fresh() {
        let clock = ManualClock::new();
        let mut cache = RefreshCache::new(TTL);
        cache.mark_refreshed(clock.now());

        clock.advance(TTL);
        assert!(!cache.should_refresh(clock.now()));

        clock.advance(Duration::from_millis(1));
        assert!(cache.should_refresh(clock.now()));
    }

    #[test]
    fn test_mark_refreshed_resets_window() {
        let clock = ManualClock::new();
        let mut cache = RefreshCache::new(TTL);
        cache.mark_refreshed(clock.now());
        clock.advance(Duration::from_secs(61));
        assert!(cache.should_refresh(clock.now()));

        cache.mark_refreshed(clock.now());
        assert!(!cache.should_refresh(clock.now()));
        assert_eq!(cache.last_refresh(), Some(clock.now()));
    }

    #[test]
    fn test_invalidate() {
        let clock = ManualClock::new();
        let mut cache = RefreshCache::new(TTL);
        cache.mark_refreshed(clock.now());
        cache.invalidate();
        assert!(cache.should_refresh(clock.now()));
    }

    #[test]
    fn test_zero_ttl_refreshes_once_time_moves() {
        let clock = ManualClock::new();
        let mut cache = RefreshCache::new(Duration::ZERO);
        cache.mark_refreshed(clock.now());
        assert!(!cache.should_refresh(clock.now()));
        clock.advance(Duration::from_nanos(1));
        assert!(cache.should_refresh(clock.now()));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
