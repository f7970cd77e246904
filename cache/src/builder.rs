use crate::error::BuildError;
use crate::registry::EffectRegistry;
use crate::runtime::TaskSpawner;
use crate::service::ModelService;
use crate::store::{ModelStore, DEFAULT_TIME_TO_LIVE};

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A builder for creating a [`ModelStore`].
#[derive(Debug, Clone)]
pub struct ModelStoreBuilder {
  time_to_live: Duration,
  shards: usize,
}

impl Default for ModelStoreBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl ModelStoreBuilder {
  /// Creates a builder with a 15 minute time-to-live.
  pub fn new() -> Self {
    Self {
      time_to_live: DEFAULT_TIME_TO_LIVE,
      shards: Self::default_shards(),
    }
  }

  pub(crate) fn default_shards() -> usize {
    (num_cpus::get() * 4).max(2).next_power_of_two()
  }

  /// Sets how long an entry stays valid after it was last refreshed.
  pub fn time_to_live(mut self, duration: Duration) -> Self {
    self.time_to_live = duration;
    self
  }

  /// Sets the number of lock shards used by each model partition.
  ///
  /// Rounded up to a power of two of at least 2 when building.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = shards;
    self
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.time_to_live.is_zero() {
      return Err(BuildError::ZeroTimeToLive);
    }
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    Ok(())
  }

  /// Builds the store.
  pub fn build(self) -> Result<ModelStore, BuildError> {
    self.validate()?;
    let shards = self.shards.max(2).next_power_of_two();
    Ok(ModelStore::with_config(self.time_to_live, shards))
  }
}

/// A builder for creating a [`ModelService`].
pub struct ModelServiceBuilder<C = ()> {
  registry: Arc<EffectRegistry<C>>,
  store: Option<Arc<ModelStore>>,
  store_builder: ModelStoreBuilder,
  spawner: Option<Arc<dyn TaskSpawner>>,
}

impl<C> fmt::Debug for ModelServiceBuilder<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ModelServiceBuilder")
      .field("has_store", &self.store.is_some())
      .field("store_builder", &self.store_builder)
      .field("has_spawner", &self.spawner.is_some())
      .finish_non_exhaustive()
  }
}

impl<C: Send + Sync + 'static> ModelServiceBuilder<C> {
  pub fn new(registry: EffectRegistry<C>) -> Self {
    Self::with_registry(Arc::new(registry))
  }

  /// Creates a builder around a registry that is shared elsewhere.
  pub fn with_registry(registry: Arc<EffectRegistry<C>>) -> Self {
    Self {
      registry,
      store: None,
      store_builder: ModelStoreBuilder::new(),
      spawner: None,
    }
  }

  /// Uses an existing store instead of creating one. The store keeps its own
  /// time-to-live and shard settings.
  pub fn store(mut self, store: Arc<ModelStore>) -> Self {
    self.store = Some(store);
    self
  }

  /// Sets the time-to-live of the store this builder creates.
  pub fn time_to_live(mut self, duration: Duration) -> Self {
    self.store_builder = self.store_builder.time_to_live(duration);
    self
  }

  /// Sets the shard count of the store this builder creates.
  pub fn shards(mut self, shards: usize) -> Self {
    self.store_builder = self.store_builder.shards(shards);
    self
  }

  /// Sets the spawner that runs background refreshes.
  ///
  /// Defaults to the Tokio runtime the service is built in.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Builds the service.
  pub fn build(mut self) -> Result<ModelService<C>, BuildError> {
    let store = match self.store.take() {
      Some(store) => store,
      None => Arc::new(self.store_builder.clone().build()?),
    };

    let spawner = match self.spawner.take() {
      Some(spawner) => spawner,
      None => Self::default_spawner()?,
    };

    Ok(ModelService::from_parts(store, self.registry, spawner))
  }

  fn default_spawner() -> Result<Arc<dyn TaskSpawner>, BuildError> {
    #[cfg(feature = "tokio")]
    {
      crate::runtime::TokioSpawner::try_current()
        .map(|spawner| Arc::new(spawner) as Arc<dyn TaskSpawner>)
        .ok_or(BuildError::SpawnerRequired)
    }
    #[cfg(not(feature = "tokio"))]
    {
      Err(BuildError::SpawnerRequired)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn store_builder_rejects_zero_values() {
    let err = ModelStoreBuilder::new()
      .time_to_live(Duration::ZERO)
      .build()
      .unwrap_err();
    assert_eq!(err, BuildError::ZeroTimeToLive);

    let err = ModelStoreBuilder::new().shards(0).build().unwrap_err();
    assert_eq!(err, BuildError::ZeroShards);
  }

  #[test]
  fn store_builder_applies_time_to_live() {
    let store = ModelStore::builder()
      .time_to_live(Duration::from_secs(5))
      .shards(3)
      .build()
      .unwrap();
    assert_eq!(store.time_to_live(), Duration::from_secs(5));
  }

  #[test]
  fn service_outside_runtime_needs_a_spawner() {
    let err = ModelServiceBuilder::new(EffectRegistry::new(())).build().unwrap_err();
    assert_eq!(err, BuildError::SpawnerRequired);
  }
}
