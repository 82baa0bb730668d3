//! In-memory cache.
//!
//! Sets and counters behind `parking_lot` locks; publishing goes through the
//! shared realtime bus.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_bus::{InMemoryRealtimeBus, RealtimePublisher, RealtimeUpdate};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::errors::CacheError;
use crate::ports::outbound::CacheService;

/// In-memory `CacheService`.
pub struct InMemoryCache {
    sets: RwLock<HashMap<String, BTreeSet<String>>>,
    counters: RwLock<HashMap<String, i64>>,
    bus: Arc<InMemoryRealtimeBus>,
    /// When set, every call fails with `Unavailable`.
    failing: AtomicBool,
}

impl InMemoryCache {
    #[must_use]
    pub fn new(bus: Arc<InMemoryRealtimeBus>) -> Self {
        Self {
            sets: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            bus,
            failing: AtomicBool::new(false),
        }
    }

    /// The bus updates are published on.
    #[must_use]
    pub fn bus(&self) -> &Arc<InMemoryRealtimeBus> {
        &self.bus
    }

    /// Simulate an outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("cache is down".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryRealtimeBus::new()))
    }
}

#[async_trait]
impl CacheService for InMemoryCache {
    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        self.check()?;
        self.sets
            .write()
            .entry(key.to_string())
            .or_default()
            .extend(members.iter().cloned());
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Option<Vec<String>>, CacheError> {
        self.check()?;
        Ok(self
            .sets
            .read()
            .get(key)
            .map(|set| set.iter().cloned().collect()))
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.check()?;
        Ok(self
            .sets
            .read()
            .get(key)
            .is_some_and(|set| set.contains(member)))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.check()?;
        Ok(self.sets.read().contains_key(key) || self.counters.read().contains_key(key))
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        self.check()?;
        let mut sets = self.sets.write();
        let mut counters = self.counters.write();
        for key in keys {
            sets.remove(key);
            counters.remove(key);
        }
        Ok(())
    }

    async fn delete_matching(&self, prefix: &str, suffix: &str) -> Result<usize, CacheError> {
        self.check()?;
        let matches = |k: &String| k.starts_with(prefix) && k.ends_with(suffix);
        let mut sets = self.sets.write();
        let mut counters = self.counters.write();
        let before = sets.len() + counters.len();
        sets.retain(|k, _| !matches(k));
        counters.retain(|k, _| !matches(k));
        Ok(before - sets.len() - counters.len())
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.check()?;
        let mut counters = self.counters.write();
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn get_counter(&self, key: &str) -> Result<i64, CacheError> {
        self.check()?;
        Ok(self.counters.read().get(key).copied().unwrap_or(0))
    }

    async fn counters_with_prefix(&self, prefix: &str) -> Result<Vec<(String, i64)>, CacheError> {
        self.check()?;
        let mut out: Vec<(String, i64)> = self
            .counters
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        out.sort();
        Ok(out)
    }

    async fn publish(&self, update: RealtimeUpdate) -> Result<usize, CacheError> {
        self.check()?;
        Ok(self.bus.publish(update).await)
    }
}
