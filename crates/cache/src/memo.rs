//! At-most-once memoization keyed by checksum

use crate::stats::{CacheStatSnapshot, CacheStats};
use bestflags_core::{Checksum, Error, Result};
use bestflags_utils::tracing::cache_event;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;

/// Per-key marker: a key is absent, being computed, or resolved
enum Slot<V> {
    InProgress(Arc<Notify>),
    Resolved(V),
}

/// Observable state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Absent,
    InProgress,
    Resolved,
}

/// Checksum-keyed memoization table.
///
/// The check-and-mark step happens under the map's per-shard lock; the
/// computation itself runs with no lock held, so a slow build never blocks
/// lookups of unrelated keys. There is no eviction.
pub struct MemoCache<V> {
    name: &'static str,
    entries: DashMap<Checksum, Slot<V>>,
    stats: CacheStats,
}

impl<V> MemoCache<V>
where
    V: Clone + Send + Sync,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the value for `key`, running `compute` only if no caller has
    /// resolved or is resolving it.
    ///
    /// Callers that find the key in progress wait for it to resolve. If the
    /// computing caller is dropped before resolving, its marker is withdrawn
    /// and one of the waiters takes over.
    pub async fn get_or_compute<F, Fut>(&self, key: &Checksum, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let notify = loop {
            let in_flight = match self.entries.entry(key.clone()) {
                Entry::Occupied(occupied) => match occupied.get() {
                    Slot::Resolved(value) => {
                        self.stats.record_hit();
                        cache_event(self.name, key.short(), true);
                        return Ok(value.clone());
                    }
                    Slot::InProgress(notify) => Arc::clone(notify),
                },
                Entry::Vacant(vacant) => {
                    let notify = Arc::new(Notify::new());
                    vacant.insert(Slot::InProgress(Arc::clone(&notify)));
                    break notify;
                }
            };

            self.stats.record_wait();
            tracing::debug!(cache = self.name, key = %key.short(), "cache_wait");

            // Register before re-checking so a resolution between the two
            // steps still wakes us.
            let notified = in_flight.notified();
            match self.state_of(key, &in_flight) {
                Observed::StillInFlight => notified.await,
                Observed::Changed => {}
            }
        };

        self.stats.record_miss();
        cache_event(self.name, key.short(), false);

        let mut guard = InFlightGuard {
            cache: self,
            key,
            notify: &notify,
            armed: true,
        };
        let value = compute().await;
        guard.armed = false;

        let outcome = self.resolve(key, &notify, value.clone());
        notify.notify_waiters();
        outcome.map(|()| value)
    }

    /// Resolved value for `key`, without waiting or computing
    pub fn get(&self, key: &Checksum) -> Option<V> {
        match self.entries.get(key).as_deref() {
            Some(Slot::Resolved(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn state(&self, key: &Checksum) -> EntryState {
        match self.entries.get(key).as_deref() {
            None => EntryState::Absent,
            Some(Slot::InProgress(_)) => EntryState::InProgress,
            Some(Slot::Resolved(_)) => EntryState::Resolved,
        }
    }

    /// Number of resolved or in-flight keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatSnapshot {
        self.stats.snapshot()
    }

    fn state_of(&self, key: &Checksum, in_flight: &Arc<Notify>) -> Observed {
        match self.entries.get(key).as_deref() {
            Some(Slot::InProgress(current)) if Arc::ptr_eq(current, in_flight) => {
                Observed::StillInFlight
            }
            _ => Observed::Changed,
        }
    }

    fn resolve(&self, key: &Checksum, notify: &Arc<Notify>, value: V) -> Result<()> {
        let Some(mut slot) = self.entries.get_mut(key) else {
            return Err(Error::cache_invariant(
                key.as_str(),
                format!("{} entry vanished while in progress", self.name),
            ));
        };
        let claimed =
            matches!(&*slot, Slot::InProgress(current) if Arc::ptr_eq(current, notify));
        if claimed {
            *slot = Slot::Resolved(value);
            return Ok(());
        }
        let message = match &*slot {
            Slot::InProgress(_) => "entry was claimed by another computation",
            Slot::Resolved(_) => "entry resolved twice",
        };
        Err(Error::cache_invariant(
            key.as_str(),
            format!("{} {message}", self.name),
        ))
    }
}

enum Observed {
    StillInFlight,
    Changed,
}

/// Withdraws an in-progress marker whose computation was dropped
struct InFlightGuard<'a, V> {
    cache: &'a MemoCache<V>,
    key: &'a Checksum,
    notify: &'a Arc<Notify>,
    armed: bool,
}

impl<V> Drop for InFlightGuard<'_, V> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let notify = self.notify;
        let removed = self.cache.entries.remove_if(self.key, |_, slot| {
            matches!(slot, Slot::InProgress(current) if Arc::ptr_eq(current, notify))
        });
        if removed.is_some() {
            self.cache.stats.record_abandoned();
            tracing::warn!(
                cache = self.cache.name,
                key = %self.key.short(),
                "in-flight computation dropped before resolving"
            );
        }
        notify.notify_waiters();
    }
}
