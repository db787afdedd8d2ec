//! Active task pointers with time-based expiry.
//!
//! The host remembers which task is active per workspace for a short while.
//! The cache is an ordinary value owned by the caller; time comes from an
//! injected [`Clock`] so expiry is testable.

use crate::config::CacheConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now = *now + by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    source_id: String,
    expires_at: DateTime<Utc>,
}

/// Workspace → active source id, each entry valid for `ttl`.
#[derive(Debug)]
pub struct ActiveTaskCache<C: Clock> {
    clock: C,
    ttl: Duration,
    entries: HashMap<String, Entry>,
}

impl ActiveTaskCache<SystemClock> {
    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(SystemClock, ttl)
    }
}

impl<C: Clock> ActiveTaskCache<C> {
    pub fn new(clock: C, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Cache whose TTL is `config.active_task_ttl_secs`.
    pub fn from_config(config: &CacheConfig, clock: C) -> Self {
        Self::new(clock, config.active_task_ttl())
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Record `source_id` as active for `workspace`, restarting its TTL.
    pub fn set_active(&mut self, workspace: &str, source_id: &str) {
        let expires_at = self.clock.now() + self.ttl;
        self.entries.insert(
            workspace.to_string(),
            Entry {
                source_id: source_id.to_string(),
                expires_at,
            },
        );
    }

    /// Active source id for `workspace`, if set and not expired.
    ///
    /// An expired entry is dropped on lookup.
    pub fn active(&mut self, workspace: &str) -> Option<String> {
        let now = self.clock.now();
        let entry = self.entries.get(workspace)?;
        if entry.expires_at <= now {
            debug!(workspace, source_id = %entry.source_id, "active task expired");
            self.entries.remove(workspace);
            return None;
        }
        Some(entry.source_id.clone())
    }

    pub fn clear(&mut self, workspace: &str) {
        self.entries.remove(workspace);
    }

    /// Drop every expired entry; returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let purged = before - self.entries.len();
        if purged > 0 {
            debug!(purged, "purged expired active tasks");
        }
        purged
    }

    /// Entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cache() -> ActiveTaskCache<ManualClock> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ActiveTaskCache::new(ManualClock::new(start), Duration::seconds(300))
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let mut cache = cache();
        cache.set_active("/work/app", "task-1");
        assert_eq!(cache.active("/work/app").as_deref(), Some("task-1"));

        cache.clock().advance(Duration::seconds(299));
        assert_eq!(cache.active("/work/app").as_deref(), Some("task-1"));

        cache.clock().advance(Duration::seconds(1));
        assert_eq!(cache.active("/work/app"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_active_refreshes_ttl() {
        let mut cache = cache();
        cache.set_active("w", "task-1");
        cache.clock().advance(Duration::seconds(200));
        cache.set_active("w", "task-2");
        cache.clock().advance(Duration::seconds(200));
        assert_eq!(cache.active("w").as_deref(), Some("task-2"));
    }

    #[test]
    fn test_from_config_uses_configured_ttl() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let config = CacheConfig {
            active_task_ttl_secs: 30,
        };
        let mut cache = ActiveTaskCache::from_config(&config, ManualClock::new(start));
        cache.set_active("w", "task-1");

        cache.clock().advance(Duration::seconds(29));
        assert_eq!(cache.active("w").as_deref(), Some("task-1"));
        cache.clock().advance(Duration::seconds(1));
        assert_eq!(cache.active("w"), None);
    }

    #[test]
    fn test_purge_and_clear() {
        let mut cache = cache();
        cache.set_active("a", "1");
        cache.clock().advance(Duration::seconds(400));
        cache.set_active("b", "2");
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear("b");
        assert!(cache.is_empty());
    }
}
