use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the model store.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Lookups ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Writes ---
  pub(crate) inserts: CachePadded<AtomicU64>,
  pub(crate) updates: CachePadded<AtomicU64>,
  pub(crate) skipped_writes: CachePadded<AtomicU64>,
  pub(crate) removals: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,

  // --- Events ---
  pub(crate) notifications: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      inserts: CachePadded::new(AtomicU64::new(0)),
      updates: CachePadded::new(AtomicU64::new(0)),
      skipped_writes: CachePadded::new(AtomicU64::new(0)),
      removals: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      notifications: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      inserts: self.inserts.load(Ordering::Relaxed),
      updates: self.updates.load(Ordering::Relaxed),
      skipped_writes: self.skipped_writes.load(Ordering::Relaxed),
      removals: self.removals.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      notifications: self.notifications.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time snapshot of the model store's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Lookups that found a cached entry (fresh or stale).
  pub hits: u64,
  /// Lookups that found nothing.
  pub misses: u64,
  /// The hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// Entries written for an ID that was not cached before.
  pub inserts: u64,
  /// Entries written over an existing entry.
  pub updates: u64,
  /// Writes skipped because `overwrite` was off and the ID already existed.
  pub skipped_writes: u64,
  /// Entries removed by an explicit delete or clear.
  pub removals: u64,
  /// Entries marked stale by hand.
  pub invalidations: u64,
  /// Change notifications raised.
  pub notifications: u64,
  /// The number of seconds the store has existed.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("inserts", &self.inserts)
      .field("updates", &self.updates)
      .field("skipped_writes", &self.skipped_writes)
      .field("removals", &self.removals)
      .field("invalidations", &self.invalidations)
      .field("notifications", &self.notifications)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}

/// Counters kept by the service for backend traffic.
#[derive(Debug, Default)]
pub(crate) struct ServiceMetrics {
  pub(crate) backend_calls: CachePadded<AtomicU64>,
  pub(crate) backend_failures: CachePadded<AtomicU64>,
  pub(crate) refreshes_spawned: CachePadded<AtomicU64>,
  pub(crate) refresh_failures: CachePadded<AtomicU64>,
}

impl ServiceMetrics {
  pub(crate) fn snapshot(&self) -> ServiceMetricsSnapshot {
    ServiceMetricsSnapshot {
      backend_calls: self.backend_calls.load(Ordering::Relaxed),
      backend_failures: self.backend_failures.load(Ordering::Relaxed),
      refreshes_spawned: self.refreshes_spawned.load(Ordering::Relaxed),
      refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
    }
  }
}

/// A point-in-time snapshot of the service's backend counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMetricsSnapshot {
  /// Effects dispatched to the backend (all operations except filtering).
  pub backend_calls: u64,
  /// Dispatched effects that returned an error.
  pub backend_failures: u64,
  /// Background refreshes handed to the spawner.
  pub refreshes_spawned: u64,
  /// Background refreshes that failed and were only logged.
  pub refresh_failures: u64,
}
