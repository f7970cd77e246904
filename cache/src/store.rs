use crate::builder::ModelStoreBuilder;
use crate::entry::ModelEntry;
use crate::listener::{ChangeListener, Listeners, ModelChanged, SubscriptionId};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::model::{Model, ModelId, ModelType};

use core::fmt;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

/// The default time after which a cached entry is considered stale.
pub const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(15 * 60);

/// Controls how `put` and `put_many` treat existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOptions {
  /// Replace an entry that already exists under the same ID.
  pub overwrite: bool,
  /// Treat the write as an update: refresh the timestamp and always notify.
  pub mark_updated: bool,
}

impl PutOptions {
  /// Overwrite existing entries, do not force a notification.
  pub const OVERWRITE: PutOptions = PutOptions {
    overwrite: true,
    mark_updated: false,
  };
  /// Keep existing entries untouched.
  pub const KEEP_EXISTING: PutOptions = PutOptions {
    overwrite: false,
    mark_updated: false,
  };
  /// Overwrite and report the write as an update.
  pub const UPDATED: PutOptions = PutOptions {
    overwrite: true,
    mark_updated: true,
  };

  pub fn new() -> Self {
    Self::OVERWRITE
  }

  pub fn overwrite(mut self, overwrite: bool) -> Self {
    self.overwrite = overwrite;
    self
  }

  pub fn mark_updated(mut self, mark_updated: bool) -> Self {
    self.mark_updated = mark_updated;
    self
  }
}

impl Default for PutOptions {
  fn default() -> Self {
    Self::OVERWRITE
  }
}

/// The result of writing a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
  /// `overwrite` was off and the ID was already cached.
  Skipped,
  /// The value was stored. `refreshed` is set when the timestamp moved.
  Written { refreshed: bool },
}

/// All cached models of a single type.
struct Partition<T> {
  entries: DashMap<ModelId, ModelEntry<T>, ahash::RandomState>,
}

impl<T> Partition<T> {
  fn new(shards: usize) -> Self {
    Self {
      entries: DashMap::with_capacity_and_hasher_and_shard_amount(
        0,
        ahash::RandomState::new(),
        shards,
      ),
    }
  }
}

/// A type-partitioned, in-memory store of models with a freshness timestamp
/// per entry.
///
/// Entries are never evicted. Once older than the time-to-live they are only
/// reported as invalid, and the next write or backend read refreshes them.
pub struct ModelStore {
  partitions: DashMap<ModelType, Arc<dyn Any + Send + Sync>, ahash::RandomState>,
  time_to_live: Duration,
  shards: usize,
  listeners: Listeners,
  metrics: Metrics,
}

impl fmt::Debug for ModelStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ModelStore")
      .field("partitions", &self.partitions.len())
      .field("time_to_live", &self.time_to_live)
      .field("listeners", &self.listeners)
      .finish_non_exhaustive()
  }
}

impl Default for ModelStore {
  fn default() -> Self {
    Self::new()
  }
}

impl ModelStore {
  /// Creates a store with the default 15 minute time-to-live.
  pub fn new() -> Self {
    Self::with_config(DEFAULT_TIME_TO_LIVE, ModelStoreBuilder::default_shards())
  }

  /// Returns a builder to configure a store.
  pub fn builder() -> ModelStoreBuilder {
    ModelStoreBuilder::new()
  }

  pub(crate) fn with_config(time_to_live: Duration, shards: usize) -> Self {
    Self {
      partitions: DashMap::with_hasher(ahash::RandomState::new()),
      time_to_live,
      shards,
      listeners: Listeners::new(),
      metrics: Metrics::new(),
    }
  }

  /// The duration after which entries are considered stale.
  pub fn time_to_live(&self) -> Duration {
    self.time_to_live
  }

  // --- Partitions ---

  fn partition<T: Model>(&self) -> Option<Arc<Partition<T>>> {
    let erased = self.partitions.get(&ModelType::of::<T>())?.value().clone();
    Some(Self::downcast(erased))
  }

  /// Returns the partition for `T`, creating it on first use.
  ///
  /// Concurrent first access is serialized by the shard lock behind
  /// `entry`, so exactly one partition ever becomes visible.
  fn partition_or_create<T: Model>(&self) -> Arc<Partition<T>> {
    if let Some(partition) = self.partition::<T>() {
      return partition;
    }

    let erased = self
      .partitions
      .entry(ModelType::of::<T>())
      .or_insert_with(|| {
        debug!(model = %ModelType::of::<T>(), "creating model partition");
        Arc::new(Partition::<T>::new(self.shards)) as Arc<dyn Any + Send + Sync>
      })
      .value()
      .clone();
    Self::downcast(erased)
  }

  fn downcast<T: Model>(erased: Arc<dyn Any + Send + Sync>) -> Arc<Partition<T>> {
    // Partitions are keyed by the TypeId of `T`, so the downcast cannot fail.
    erased
      .downcast::<Partition<T>>()
      .expect("model partition stored under a foreign type id")
  }

  /// The number of model types that have a partition.
  pub fn partition_count(&self) -> usize {
    self.partitions.len()
  }

  // --- Reads ---

  /// Returns the cached model, stale or not. `None` if the ID is unknown.
  pub fn get<T: Model>(&self, id: ModelId) -> Option<Arc<T>> {
    let found = self
      .partition::<T>()
      .and_then(|partition| partition.entries.get(&id).map(|entry| entry.value().value()));

    match found {
      Some(_) => Metrics::incr(&self.metrics.hits),
      None => Metrics::incr(&self.metrics.misses),
    }
    found
  }

  /// Returns a snapshot of every cached model of type `T`, in no particular
  /// order. Later writes to the store are not visible through it.
  pub fn get_all<T: Model>(&self) -> Vec<Arc<T>> {
    match self.partition::<T>() {
      Some(partition) => partition
        .entries
        .iter()
        .map(|entry| entry.value().value())
        .collect(),
      None => Vec::new(),
    }
  }

  /// Returns `true` if a model with this ID is cached, stale or not.
  pub fn contains<T: Model>(&self, id: ModelId) -> bool {
    self
      .partition::<T>()
      .is_some_and(|partition| partition.entries.contains_key(&id))
  }

  /// The number of cached models of type `T`.
  pub fn len<T: Model>(&self) -> usize {
    self
      .partition::<T>()
      .map_or(0, |partition| partition.entries.len())
  }

  pub fn is_empty<T: Model>(&self) -> bool {
    self.len::<T>() == 0
  }

  // --- Freshness ---

  /// Returns `true` if the entry exists and was refreshed within the
  /// time-to-live. The nil ID is never valid.
  pub fn is_valid<T: Model>(&self, id: ModelId) -> bool {
    if id.is_nil() {
      return false;
    }
    self.partition::<T>().is_some_and(|partition| {
      partition
        .entries
        .get(&id)
        .is_some_and(|entry| entry.is_valid(self.time_to_live))
    })
  }

  /// Returns `true` if every ID is valid. Vacuously true for no IDs.
  pub fn are_valid<T: Model>(&self, ids: impl IntoIterator<Item = ModelId>) -> bool {
    ids.into_iter().all(|id| self.is_valid::<T>(id))
  }

  /// Returns `true` if every model's ID is valid.
  pub fn are_models_valid<T, I>(&self, models: I) -> bool
  where
    T: Model,
    I: IntoIterator,
    I::Item: AsRef<T>,
  {
    models
      .into_iter()
      .all(|model| self.is_valid::<T>(model.as_ref().id()))
  }

  /// Marks a cached entry as stale while keeping its value. Returns `false`
  /// if the ID is not cached.
  pub fn mark_stale<T: Model>(&self, id: ModelId) -> bool {
    let marked = self.partition::<T>().is_some_and(|partition| {
      partition
        .entries
        .get(&id)
        .map(|entry| entry.invalidate())
        .is_some()
    });
    if marked {
      Metrics::incr(&self.metrics.invalidations);
    }
    marked
  }

  // --- Writes ---

  /// Stores a model with the default options (overwrite, not an update).
  pub fn insert<T: Model>(&self, model: T) {
    self.put_shared(Arc::new(model), PutOptions::OVERWRITE);
  }

  /// Stores many models with the default options.
  pub fn insert_many<T: Model>(&self, models: impl IntoIterator<Item = T>) {
    self.put_many(models, PutOptions::OVERWRITE);
  }

  /// Stores a model.
  ///
  /// With `overwrite` off, an already cached ID is left untouched. The entry's
  /// timestamp moves when it was not valid before or when `mark_updated` is
  /// set. Returns `true` if the value was written.
  pub fn put<T: Model>(&self, model: T, options: PutOptions) -> bool {
    self.put_shared(Arc::new(model), options)
  }

  /// Like [`put`](Self::put), for a model that is already shared.
  pub fn put_shared<T: Model>(&self, model: Arc<T>, options: PutOptions) -> bool {
    let partition = self.partition_or_create::<T>();
    let outcome = self.write_entry(&partition, model, options);
    drop(partition);

    let refreshed = matches!(outcome, WriteOutcome::Written { refreshed: true });
    if refreshed || options.mark_updated {
      self.notify::<T>();
    }
    outcome != WriteOutcome::Skipped
  }

  /// Stores many models, raising at most one change notification. Returns the
  /// number of models written.
  pub fn put_many<T: Model>(&self, models: impl IntoIterator<Item = T>, options: PutOptions) -> usize {
    self.put_many_shared(models.into_iter().map(Arc::new), options)
  }

  /// Like [`put_many`](Self::put_many), for models that are already shared.
  pub fn put_many_shared<T: Model>(
    &self,
    models: impl IntoIterator<Item = Arc<T>>,
    options: PutOptions,
  ) -> usize {
    let partition = self.partition_or_create::<T>();
    let mut written = 0;
    let mut refreshed = false;

    for model in models {
      if let WriteOutcome::Written { refreshed: moved } =
        self.write_entry(&partition, model, options)
      {
        written += 1;
        refreshed |= moved;
      }
    }
    drop(partition);

    trace!(model = %ModelType::of::<T>(), written, refreshed, "stored models");
    if refreshed || options.mark_updated {
      self.notify::<T>();
    }
    written
  }

  fn write_entry<T: Model>(
    &self,
    partition: &Partition<T>,
    value: Arc<T>,
    options: PutOptions,
  ) -> WriteOutcome {
    let id = value.id();
    match partition.entries.entry(id) {
      Entry::Occupied(mut occupied) => {
        if !options.overwrite {
          Metrics::incr(&self.metrics.skipped_writes);
          return WriteOutcome::Skipped;
        }

        let was_valid = !id.is_nil() && occupied.get().is_valid(self.time_to_live);
        let refreshed = !was_valid || options.mark_updated;
        let entry = if refreshed {
          ModelEntry::fresh(value)
        } else {
          ModelEntry::with_timestamp(value, occupied.get().refreshed_at())
        };
        occupied.insert(entry);
        Metrics::incr(&self.metrics.updates);
        WriteOutcome::Written { refreshed }
      }
      Entry::Vacant(vacant) => {
        vacant.insert(ModelEntry::fresh(value));
        Metrics::incr(&self.metrics.inserts);
        WriteOutcome::Written { refreshed: true }
      }
    }
  }

  /// Removes a model from the store, returning it if it was cached.
  ///
  /// Removal does not notify; the caller decides what to announce.
  pub fn remove<T: Model>(&self, id: ModelId) -> Option<Arc<T>> {
    let removed = self
      .partition::<T>()
      .and_then(|partition| partition.entries.remove(&id))
      .map(|(_, entry)| entry.value());
    if removed.is_some() {
      Metrics::incr(&self.metrics.removals);
    }
    removed
  }

  /// Removes every cached model of type `T`, notifying once if anything was
  /// removed. Returns the number of removed entries.
  pub fn clear<T: Model>(&self) -> usize {
    let removed = match self.partition::<T>() {
      Some(partition) => {
        let count = partition.entries.len();
        partition.entries.clear();
        count
      }
      None => 0,
    };

    if removed > 0 {
      self
        .metrics
        .removals
        .fetch_add(removed as u64, std::sync::atomic::Ordering::Relaxed);
      self.notify::<T>();
    }
    removed
  }

  // --- Notifications ---

  /// Subscribes a listener to change notifications for all model types.
  pub fn subscribe(&self, listener: impl ChangeListener + 'static) -> SubscriptionId {
    self.listeners.subscribe(Arc::new(listener))
  }

  pub(crate) fn subscribe_arc(&self, listener: Arc<dyn ChangeListener>) -> SubscriptionId {
    self.listeners.subscribe(listener)
  }

  /// Removes a subscription. Returns `false` if it was already gone.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    self.listeners.unsubscribe(id)
  }

  /// The number of active subscriptions.
  pub fn subscriber_count(&self) -> usize {
    self.listeners.len()
  }

  fn notify<T: Model>(&self) {
    Metrics::incr(&self.metrics.notifications);
    self
      .listeners
      .notify(&ModelChanged::new(ModelType::of::<T>()));
  }

  /// Returns a snapshot of the store's metrics.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.metrics.snapshot()
  }
}
