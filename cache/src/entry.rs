use crate::time;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A cached model together with its freshness timestamp.
#[derive(Debug)]
pub(crate) struct ModelEntry<T> {
  /// The user's value, wrapped in an Arc for shared ownership.
  value: Arc<T>,
  /// When the entry was last confirmed by the backend, in nanoseconds since
  /// the cache epoch. 0 means stale.
  refreshed_at: AtomicU64,
}

impl<T> ModelEntry<T> {
  /// Creates an entry refreshed right now.
  pub(crate) fn fresh(value: Arc<T>) -> Self {
    Self::with_timestamp(value, time::now_nanos())
  }

  /// Creates an entry carrying over an earlier timestamp.
  pub(crate) fn with_timestamp(value: Arc<T>, refreshed_at: u64) -> Self {
    Self {
      value,
      refreshed_at: AtomicU64::new(refreshed_at),
    }
  }

  /// Returns a clone of the `Arc` containing the value.
  #[inline]
  pub(crate) fn value(&self) -> Arc<T> {
    self.value.clone()
  }

  #[inline]
  pub(crate) fn refreshed_at(&self) -> u64 {
    self.refreshed_at.load(Ordering::Relaxed)
  }

  /// Checks if the entry was refreshed within `ttl`.
  #[inline]
  pub(crate) fn is_valid(&self, ttl: Duration) -> bool {
    time::is_fresh(self.refreshed_at(), ttl)
  }

  /// Marks the entry as stale without dropping its value.
  #[inline]
  pub(crate) fn invalidate(&self) {
    self.refreshed_at.store(0, Ordering::Relaxed);
  }
}
