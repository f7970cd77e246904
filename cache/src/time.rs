use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

// The single, static reference point for all freshness timestamps.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Converts an `Instant` into nanoseconds since the cache's epoch.
#[inline]
pub(crate) fn instant_to_nanos(instant: Instant) -> u64 {
  instant.saturating_duration_since(*CACHE_EPOCH).as_nanos() as u64
}

/// The current time in nanoseconds since the epoch.
///
/// Offset by one so that a stored value of `0` can always mean "never
/// refreshed", even for an entry written in the epoch's first nanosecond.
#[inline]
pub(crate) fn now_nanos() -> u64 {
  instant_to_nanos(Instant::now()).saturating_add(1)
}

/// Returns `true` if `refreshed_at` lies within `ttl` of now.
#[inline]
pub(crate) fn is_fresh(refreshed_at: u64, ttl: Duration) -> bool {
  let ttl = u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX);
  refreshed_at != 0 && now_nanos().saturating_sub(refreshed_at) < ttl
}
