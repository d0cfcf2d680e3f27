//! Address-keyed records with an idle timeout.
//!
//! Every record gets a generation id and a watcher task. The watcher polls at
//! a fixed interval until the record has been idle longer than its TTL, then
//! removes it, but only if the map still holds the same generation. Replacing
//! a record cancels the old watcher while the map lock is held, before the new
//! generation becomes visible.

use crate::core::address::Address;
use crate::error::constants::ERR_LOCK_POISONED;
use crate::runtime::Executor;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Last-activity timestamp shared between a record and its payload.
#[derive(Debug, Clone)]
pub struct TouchStamp {
    base: Instant,
    last_ms: Arc<AtomicU64>,
}

impl TouchStamp {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            last_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    fn now_ms(&self) -> u64 {
        self.base.elapsed().as_millis() as u64
    }

    pub fn touch(&self) {
        self.last_ms.store(self.now_ms(), Ordering::Release);
    }

    /// Set the last activity `extra` into the future.
    pub fn extend(&self, extra: Duration) {
        self.last_ms
            .store(self.now_ms() + extra.as_millis() as u64, Ordering::Release);
    }

    /// Time since the last activity; zero while an extension is running.
    pub fn idle(&self) -> Duration {
        let last = self.last_ms.load(Ordering::Acquire);
        Duration::from_millis(self.now_ms().saturating_sub(last))
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.idle() > ttl
    }
}

impl Default for TouchStamp {
    fn default() -> Self {
        Self::new()
    }
}

/// TTL and watcher poll interval of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifetimeSettings {
    pub ttl: Duration,
    pub poll: Duration,
}

/// Snapshot of one record.
#[derive(Debug, Clone)]
pub struct RecordInfo<V> {
    pub id: u64,
    pub value: V,
    pub idle: Duration,
}

struct Record<V> {
    id: u64,
    value: V,
    touch: TouchStamp,
    stop: CancellationToken,
}

type EvictHook<V> = Box<dyn Fn(Address, u64, V) + Send + Sync>;

struct ManagerInner<V> {
    name: &'static str,
    settings: LifetimeSettings,
    executor: Executor,
    records: Mutex<HashMap<Address, Record<V>>>,
    next_id: AtomicU64,
    active_watchers: AtomicUsize,
    shutdown: CancellationToken,
    on_evict: Option<EvictHook<V>>,
}

/// Keyed records, one per address, each garbage-collected after idling.
pub struct KeyedLifetimeManager<V> {
    inner: Arc<ManagerInner<V>>,
}

impl<V> Clone for KeyedLifetimeManager<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> KeyedLifetimeManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, settings: LifetimeSettings, executor: Executor) -> Self {
        Self::build(name, settings, executor, None)
    }

    /// `on_evict` runs after an idle record was removed, outside the map lock.
    pub fn with_evict_hook<F>(name: &'static str, settings: LifetimeSettings, executor: Executor, on_evict: F) -> Self
    where
        F: Fn(Address, u64, V) + Send + Sync + 'static,
    {
        Self::build(name, settings, executor, Some(Box::new(on_evict)))
    }

    fn build(
        name: &'static str,
        settings: LifetimeSettings,
        executor: Executor,
        on_evict: Option<EvictHook<V>>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                name,
                settings,
                executor,
                records: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                active_watchers: AtomicUsize::new(0),
                shutdown: CancellationToken::new(),
                on_evict,
            }),
        }
    }

    /// Install a new record for `address`, replacing any existing one.
    ///
    /// `make` receives the new generation id and the record's touch stamp.
    /// Returns the new value and the replaced one, or `None` once disposed.
    pub fn insert_with<F>(&self, address: Address, make: F) -> Option<(V, Option<V>)>
    where
        F: FnOnce(u64, TouchStamp) -> V,
    {
        if self.is_disposed() {
            return None;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let touch = TouchStamp::new();
        touch.touch();
        let stop = self.inner.shutdown.child_token();
        let value = make(id, touch.clone());

        let replaced = {
            let mut records = self.lock();
            let replaced = records.remove(&address).map(|old| {
                old.stop.cancel();
                trace!(manager = self.inner.name, %address, old_id = old.id, new_id = id, "Replacing record");
                old.value
            });
            records.insert(
                address,
                Record {
                    id,
                    value: value.clone(),
                    touch: touch.clone(),
                    stop: stop.clone(),
                },
            );
            replaced
        };

        self.spawn_watcher(address, id, touch, stop);
        Some((value, replaced))
    }

    pub fn get(&self, address: Address) -> Option<V> {
        if self.is_disposed() {
            return None;
        }
        self.lock().get(&address).map(|record| record.value.clone())
    }

    pub fn info(&self, address: Address) -> Option<RecordInfo<V>> {
        if self.is_disposed() {
            return None;
        }
        self.lock().get(&address).map(|record| RecordInfo {
            id: record.id,
            value: record.value.clone(),
            idle: record.touch.idle(),
        })
    }

    /// Refresh the record's idle timer. Returns `false` if there is no record.
    pub fn keep_alive(&self, address: Address) -> bool {
        match self.lock().get(&address) {
            Some(record) => {
                record.touch.touch();
                true
            }
            None => false,
        }
    }

    /// Remove a record without waiting for its TTL.
    pub fn remove(&self, address: Address) -> Option<V> {
        let record = self.lock().remove(&address)?;
        record.stop.cancel();
        Some(record.value)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of watcher tasks that have not finished yet.
    pub fn active_watchers(&self) -> usize {
        self.inner.active_watchers.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop every watcher and reject further use. Returns the dropped values.
    pub fn dispose(&self) -> Vec<V> {
        self.inner.shutdown.cancel();
        let drained: Vec<V> = self.lock().drain().map(|(_, record)| record.value).collect();
        debug!(manager = self.inner.name, records = drained.len(), "Manager disposed");
        drained
    }

    fn spawn_watcher(&self, address: Address, id: u64, touch: TouchStamp, stop: CancellationToken) {
        let manager = Arc::clone(&self.inner);
        let guard = WatcherGuard::new(Arc::clone(&self.inner));
        let settings = self.inner.settings;

        self.inner.executor.spawn_timer(async move {
            let _guard = guard;
            while !stop.is_cancelled() && !touch.is_expired(settings.ttl) {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(settings.poll) => {}
                }
            }

            let evicted = {
                let mut records = manager.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let current = records
                    .get(&address)
                    .is_some_and(|record| record.id == id && !record.stop.is_cancelled());
                if current {
                    records.remove(&address).map(|record| record.value)
                } else {
                    None
                }
            };

            if let Some(value) = evicted {
                debug!(manager = manager.name, %address, id, "Record expired");
                if let Some(on_evict) = &manager.on_evict {
                    on_evict(address, id, value);
                }
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Address, Record<V>>> {
        self.inner.records.lock().unwrap_or_else(|poisoned| {
            warn!(manager = self.inner.name, "{}", ERR_LOCK_POISONED);
            poisoned.into_inner()
        })
    }
}

impl<V> fmt::Debug for KeyedLifetimeManager<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLifetimeManager")
            .field("name", &self.inner.name)
            .field("settings", &self.inner.settings)
            .field("active_watchers", &self.inner.active_watchers.load(Ordering::Relaxed))
            .finish()
    }
}

/// Counts a watcher from spawn until its task ends, however it ends.
struct WatcherGuard<V> {
    manager: Arc<ManagerInner<V>>,
}

impl<V> WatcherGuard<V> {
    fn new(manager: Arc<ManagerInner<V>>) -> Self {
        manager.active_watchers.fetch_add(1, Ordering::AcqRel);
        Self { manager }
    }
}

impl<V> Drop for WatcherGuard<V> {
    fn drop(&mut self) {
        self.manager.active_watchers.fetch_sub(1, Ordering::AcqRel);
    }
}
