//! Read/write coordination between the cache and the backend effects.

use crate::builder::ModelServiceBuilder;
use crate::error::{BuildError, Error, Operation, Result};
use crate::listener::{ChangeListener, Listeners, ModelChanged, SubscriptionId};
use crate::metrics::{Metrics, ServiceMetrics, ServiceMetricsSnapshot};
use crate::model::{Model, ModelId, ModelType};
use crate::options::{ReadArgs, SearchOptions};
use crate::refresh::{self, RefreshHandle, RefreshStatus};
use crate::registry::EffectRegistry;
use crate::runtime::TaskSpawner;
use crate::store::{ModelStore, PutOptions};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, trace, warn};

/// Re-publishes store notifications to the service's own subscribers.
///
/// Holds only the subscriber list, so the store never keeps the service
/// alive.
struct Forward(Arc<Listeners>);

impl ChangeListener for Forward {
  fn on_change(&self, event: &ModelChanged) {
    self.0.notify(event);
  }
}

/// What a background refresh needs. Cloned into every detached task.
struct Core<C> {
  store: Arc<ModelStore>,
  registry: Arc<EffectRegistry<C>>,
  metrics: Arc<ServiceMetrics>,
}

impl<C> Clone for Core<C> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      registry: self.registry.clone(),
      metrics: self.metrics.clone(),
    }
  }
}

impl<C: Send + Sync + 'static> Core<C> {
  /// Runs an effect call and keeps the backend counters.
  async fn dispatch<R>(&self, call: impl Future<Output = Result<R>>) -> Result<R> {
    let result = call.await;
    match &result {
      Err(Error::UnimplementedOperation { .. }) => {}
      Err(_) => {
        Metrics::incr(&self.metrics.backend_calls);
        Metrics::incr(&self.metrics.backend_failures);
      }
      Ok(_) => Metrics::incr(&self.metrics.backend_calls),
    }
    result
  }

  /// Serves a valid cached entry, otherwise loads it from the backend and
  /// caches it. A backend miss is not cached.
  async fn read_one<T: Model>(&self, id: ModelId, args: ReadArgs) -> Result<Option<Arc<T>>> {
    if self.store.is_valid::<T>(id) {
      if let Some(cached) = self.store.get::<T>(id) {
        trace!(model = %ModelType::of::<T>(), %id, "serving fresh cached model");
        return Ok(Some(cached));
      }
    }

    let loaded = self.dispatch(self.registry.read_one::<T>(id, args)).await?;
    Ok(loaded.map(|model| {
      let model = Arc::new(model);
      self.store.put_shared(model.clone(), PutOptions::OVERWRITE);
      model
    }))
  }

  /// Snapshots the cache, filters it and cuts out the requested page.
  fn read_cached<T: Model>(&self, options: &SearchOptions) -> Result<Vec<Arc<T>>> {
    let snapshot = self.store.get_all::<T>();
    let filtered = self.registry.read_many_filter::<T>(snapshot, options)?;
    Ok(options.paginate(filtered))
  }

  /// A cached page is only trusted when a bounded page came back complete
  /// and fresh.
  fn needs_refresh<T: Model>(&self, options: &SearchOptions, page: &[Arc<T>]) -> bool {
    match options.limit() {
      None => true,
      Some(take) => page.len() < take || !self.store.are_models_valid::<T, _>(page),
    }
  }

  /// Replaces the cached models with the backend's authoritative list.
  async fn refresh_many<T: Model>(&self, options: SearchOptions) -> Result<usize> {
    let models = self.dispatch(self.registry.read_many::<T>(options)).await?;
    Ok(self.store.put_many(models, PutOptions::OVERWRITE))
  }
}

struct ServiceShared<C> {
  core: Core<C>,
  spawner: Arc<dyn TaskSpawner>,
  listeners: Arc<Listeners>,
  store_subscription: SubscriptionId,
}

impl<C> Drop for ServiceShared<C> {
  fn drop(&mut self) {
    self.core.store.unsubscribe(self.store_subscription);
  }
}

/// Coordinates reads and writes of models between the [`ModelStore`] and the
/// backend effects in an [`EffectRegistry`].
///
/// Reads come in two flavours. The plain methods (`read_one`, `read_many`)
/// answer from the cache right away and refresh it in a detached background
/// task. The `_async` methods wait for the backend whenever the cache cannot
/// be trusted. Writes go through the backend first and are cached on success.
///
/// The service is a cheap handle; clones share the same state. When the last
/// handle is dropped the service's subscription on the store is released.
pub struct ModelService<C = ()> {
  shared: Arc<ServiceShared<C>>,
}

impl<C> Clone for ModelService<C> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<C> fmt::Debug for ModelService<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ModelService")
      .field("store", &self.shared.core.store)
      .field("registry", &self.shared.core.registry)
      .field("metrics", &self.shared.core.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<C: Send + Sync + 'static> ModelService<C> {
  /// Creates a service with a fresh default store, spawning background
  /// refreshes on the current Tokio runtime.
  pub fn new(registry: EffectRegistry<C>) -> Result<Self, BuildError> {
    Self::builder(registry).build()
  }

  /// Returns a builder to configure the service.
  pub fn builder(registry: EffectRegistry<C>) -> ModelServiceBuilder<C> {
    ModelServiceBuilder::new(registry)
  }

  pub(crate) fn from_parts(
    store: Arc<ModelStore>,
    registry: Arc<EffectRegistry<C>>,
    spawner: Arc<dyn TaskSpawner>,
  ) -> Self {
    let listeners = Arc::new(Listeners::new());
    let store_subscription = store.subscribe_arc(Arc::new(Forward(listeners.clone())));

    Self {
      shared: Arc::new(ServiceShared {
        core: Core {
          store,
          registry,
          metrics: Arc::new(ServiceMetrics::default()),
        },
        spawner,
        listeners,
        store_subscription,
      }),
    }
  }

  /// The cache this service reads from and writes to.
  pub fn store(&self) -> &Arc<ModelStore> {
    &self.shared.core.store
  }

  /// The effects this service dispatches to.
  pub fn registry(&self) -> &Arc<EffectRegistry<C>> {
    &self.shared.core.registry
  }

  /// Returns a snapshot of the backend counters.
  pub fn metrics(&self) -> ServiceMetricsSnapshot {
    self.shared.core.metrics.snapshot()
  }

  // --- Notifications ---

  /// Subscribes to change notifications for all model types.
  pub fn subscribe(&self, listener: impl ChangeListener + 'static) -> SubscriptionId {
    self.shared.listeners.subscribe(Arc::new(listener))
  }

  /// Removes a subscription. Returns `false` if it was already gone.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    self.shared.listeners.unsubscribe(id)
  }

  fn notify<T: Model>(&self) {
    self
      .shared
      .listeners
      .notify(&ModelChanged::new(ModelType::of::<T>()));
  }

  // --- Background work ---

  fn ensure_supported<T: Model>(&self, operation: Operation) -> Result<()> {
    if self.shared.core.registry.supports::<T>(operation) {
      Ok(())
    } else {
      Err(Error::UnimplementedOperation {
        model: ModelType::of::<T>().name(),
        operation,
      })
    }
  }

  /// Hands a refresh to the spawner. Failures are logged, never returned.
  fn spawn_refresh<F>(&self, model: ModelType, operation: Operation, task: F) -> RefreshHandle
  where
    F: Future<Output = Result<()>> + Send + 'static,
  {
    let (completer, handle) = refresh::channel();
    let metrics = self.shared.core.metrics.clone();
    Metrics::incr(&metrics.refreshes_spawned);
    debug!(%model, %operation, "scheduling background refresh");

    self.shared.spawner.spawn(Box::pin(async move {
      let status = match task.await {
        Ok(()) => RefreshStatus::Completed,
        Err(error) => {
          Metrics::incr(&metrics.refresh_failures);
          warn!(%model, %operation, %error, "background refresh failed");
          RefreshStatus::Failed
        }
      };
      completer.complete(status);
    }));
    handle
  }

  // --- Single model reads ---

  /// Returns the cached model right away, stale or absent, and refreshes it
  /// in the background.
  ///
  /// The refresh runs even for a fresh entry, where it finishes without
  /// contacting the backend. Use [`read_one_async`](Self::read_one_async)
  /// when the answer must be fresh.
  pub fn read_one<T: Model>(&self, id: ModelId) -> Result<Option<Arc<T>>> {
    self.read_one_detached(id).map(|(cached, _)| cached)
  }

  /// Like [`read_one`](Self::read_one), also returning a handle to the
  /// scheduled refresh.
  pub fn read_one_detached<T: Model>(
    &self,
    id: ModelId,
  ) -> Result<(Option<Arc<T>>, RefreshHandle)> {
    self.ensure_supported::<T>(Operation::ReadOne)?;
    let cached = self.shared.core.store.get::<T>(id);

    let core = self.shared.core.clone();
    let handle = self.spawn_refresh(ModelType::of::<T>(), Operation::ReadOne, async move {
      core.read_one::<T>(id, ReadArgs::new()).await.map(drop)
    });
    Ok((cached, handle))
  }

  /// Returns the cached model if it is valid, otherwise waits for the
  /// backend. `None` if the backend does not know the ID.
  pub async fn read_one_async<T: Model>(&self, id: ModelId) -> Result<Option<Arc<T>>> {
    self.shared.core.read_one::<T>(id, ReadArgs::new()).await
  }

  /// Like [`read_one_async`](Self::read_one_async), forwarding extra
  /// arguments to the read effect on a cache miss.
  pub async fn read_one_with_args<T: Model>(
    &self,
    id: ModelId,
    args: ReadArgs,
  ) -> Result<Option<Arc<T>>> {
    self.shared.core.read_one::<T>(id, args).await
  }

  // --- Collection reads ---

  /// Returns a page from the cache right away. If the page cannot be trusted
  /// (unbounded, short, or holding stale entries) the backend list is
  /// reloaded in the background.
  pub fn read_many<T: Model>(&self, options: SearchOptions) -> Result<Vec<Arc<T>>> {
    self.read_many_detached(options).map(|(page, _)| page)
  }

  /// Like [`read_many`](Self::read_many), also returning a handle to the
  /// refresh if one was scheduled.
  pub fn read_many_detached<T: Model>(
    &self,
    options: SearchOptions,
  ) -> Result<(Vec<Arc<T>>, Option<RefreshHandle>)> {
    let core = &self.shared.core;
    let page = core.read_cached::<T>(&options)?;
    if !core.needs_refresh::<T>(&options, &page) {
      return Ok((page, None));
    }

    self.ensure_supported::<T>(Operation::ReadMany)?;
    let core = core.clone();
    let handle = self.spawn_refresh(ModelType::of::<T>(), Operation::ReadMany, async move {
      core.refresh_many::<T>(options).await.map(drop)
    });
    Ok((page, Some(handle)))
  }

  /// Returns a page, reloading the backend list first whenever the cached
  /// page cannot be trusted.
  pub async fn read_many_async<T: Model>(&self, options: SearchOptions) -> Result<Vec<Arc<T>>> {
    let core = &self.shared.core;
    let page = core.read_cached::<T>(&options)?;
    if !core.needs_refresh::<T>(&options, &page) {
      return Ok(page);
    }

    core.refresh_many::<T>(options.clone()).await?;
    core.read_cached::<T>(&options)
  }

  /// Every model of type `T`. Always schedules a background reload.
  pub fn read_all<T: Model>(&self) -> Result<Vec<Arc<T>>> {
    self.read_many(SearchOptions::new())
  }

  /// Every model of type `T`, after reloading the backend list.
  pub async fn read_all_async<T: Model>(&self) -> Result<Vec<Arc<T>>> {
    self.read_many_async(SearchOptions::new()).await
  }

  pub fn read_page<T: Model>(&self, skip: usize, take: usize) -> Result<Vec<Arc<T>>> {
    self.read_many(SearchOptions::page(skip, take))
  }

  pub async fn read_page_async<T: Model>(&self, skip: usize, take: usize) -> Result<Vec<Arc<T>>> {
    self.read_many_async(SearchOptions::page(skip, take)).await
  }

  // --- Writes ---

  /// Creates a model in the backend and caches what the backend returned.
  ///
  /// A create effect answering `None` yields `Ok(None)` and caches nothing.
  pub async fn create<T: Model>(&self, model: T) -> Result<Option<Arc<T>>> {
    let core = &self.shared.core;
    let created = core.dispatch(core.registry.create(model)).await?;
    Ok(created.map(|model| {
      let model = Arc::new(model);
      core.store.put_shared(model.clone(), PutOptions::OVERWRITE);
      model
    }))
  }

  /// Creates models one by one and caches the created ones in a single
  /// write that keeps existing entries.
  ///
  /// If an effect fails, the models created before it are still cached and
  /// the error is returned.
  pub async fn create_many<T: Model>(
    &self,
    models: impl IntoIterator<Item = T>,
  ) -> Result<Vec<Arc<T>>> {
    let core = &self.shared.core;
    let mut created = Vec::new();
    let mut failure = None;

    for model in models {
      match core.dispatch(core.registry.create(model)).await {
        Ok(Some(model)) => created.push(Arc::new(model)),
        Ok(None) => {}
        Err(error) => {
          failure = Some(error);
          break;
        }
      }
    }

    if !created.is_empty() {
      core
        .store
        .put_many_shared(created.iter().cloned(), PutOptions::KEEP_EXISTING);
    }
    match failure {
      Some(error) => Err(error),
      None => Ok(created),
    }
  }

  /// Writes a model to the backend and caches the result as an update,
  /// which always notifies subscribers.
  pub async fn update<T: Model>(&self, model: T) -> Result<Option<Arc<T>>> {
    let core = &self.shared.core;
    let updated = core.dispatch(core.registry.update(model)).await?;
    Ok(updated.map(|model| {
      let model = Arc::new(model);
      core.store.put_shared(model.clone(), PutOptions::UPDATED);
      model
    }))
  }

  /// Updates models one by one and caches the results in a single update
  /// write. Failure handling matches [`create_many`](Self::create_many).
  ///
  /// Subscribers are only notified when at least one model was updated.
  pub async fn update_many<T: Model>(
    &self,
    models: impl IntoIterator<Item = T>,
  ) -> Result<Vec<Arc<T>>> {
    let core = &self.shared.core;
    let mut updated = Vec::new();
    let mut failure = None;

    for model in models {
      match core.dispatch(core.registry.update(model)).await {
        Ok(Some(model)) => updated.push(Arc::new(model)),
        Ok(None) => {}
        Err(error) => {
          failure = Some(error);
          break;
        }
      }
    }

    if !updated.is_empty() {
      core
        .store
        .put_many_shared(updated.iter().cloned(), PutOptions::UPDATED);
    }
    match failure {
      Some(error) => Err(error),
      None => Ok(updated),
    }
  }

  /// Deletes a model that is currently cached, from the backend and then
  /// from the cache. Subscribers are notified either way.
  ///
  /// An ID the cache does not know never reaches the backend.
  pub async fn delete<T: Model>(&self, id: ModelId) -> Result<()> {
    let core = &self.shared.core;
    if core.store.contains::<T>(id) {
      core.dispatch(core.registry.delete::<T>(id)).await?;
      core.store.remove::<T>(id);
    } else {
      debug!(model = %ModelType::of::<T>(), %id, "skipping delete of uncached model");
    }

    self.notify::<T>();
    Ok(())
  }

  /// Deletes a model by its ID.
  pub async fn delete_model<T: Model>(&self, model: &T) -> Result<()> {
    self.delete::<T>(model.id()).await
  }
}
