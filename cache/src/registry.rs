//! The per-type effect dispatch table.

use crate::effects::{
  erase, CreateFn, DeleteFn, EffectModule, ReadManyFilterFn, ReadManyFn, ReadOneFn, UpdateFn,
};
use crate::error::{BoxError, Error, Operation, Result};
use crate::model::{Model, ModelId, ModelType};
use crate::options::{ReadArgs, SearchOptions};

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::FutureExt;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EffectKey {
  model: ModelType,
  operation: Operation,
}

impl EffectKey {
  fn of<T: Model>(operation: Operation) -> Self {
    Self {
      model: ModelType::of::<T>(),
      operation,
    }
  }
}

/// Holds the backend effects for every model type and dispatches to them.
///
/// At most one effect exists per model type and operation. Registration is
/// expected once at startup; a second registration for the same pair fails
/// with [`Error::DuplicateRegistration`] and keeps the first effect. Calling
/// an operation nobody registered fails with [`Error::UnimplementedOperation`].
///
/// Every effect receives the shared backend context `C`, e.g. a database pool
/// or an API client.
pub struct EffectRegistry<C = ()> {
  context: Arc<C>,
  effects: DashMap<EffectKey, Box<dyn Any + Send + Sync>, ahash::RandomState>,
}

impl<C> fmt::Debug for EffectRegistry<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EffectRegistry")
      .field("effects", &self.effects.len())
      .finish_non_exhaustive()
  }
}

impl Default for EffectRegistry<()> {
  fn default() -> Self {
    Self::new(())
  }
}

impl<C: Send + Sync + 'static> EffectRegistry<C> {
  /// Creates an empty registry around a backend context.
  pub fn new(context: C) -> Self {
    Self::with_context(Arc::new(context))
  }

  /// Creates an empty registry around an already shared context.
  pub fn with_context(context: Arc<C>) -> Self {
    Self {
      context,
      effects: DashMap::with_hasher(ahash::RandomState::new()),
    }
  }

  /// The backend context handed to every effect.
  pub fn context(&self) -> &Arc<C> {
    &self.context
  }

  /// Registers all effects of a module.
  pub fn install(&self, module: impl EffectModule<C>) -> Result<()> {
    module.register(self)
  }

  /// Returns `true` if an effect is registered for `T` and `operation`.
  pub fn supports<T: Model>(&self, operation: Operation) -> bool {
    self.effects.contains_key(&EffectKey::of::<T>(operation))
  }

  /// The operations registered for `T`.
  pub fn operations<T: Model>(&self) -> Vec<Operation> {
    Operation::ALL
      .into_iter()
      .filter(|&operation| self.supports::<T>(operation))
      .collect()
  }

  /// The total number of registered effects.
  pub fn len(&self) -> usize {
    self.effects.len()
  }

  pub fn is_empty(&self) -> bool {
    self.effects.is_empty()
  }

  // --- Registration ---

  fn register<T: Model, H>(&self, operation: Operation, handler: H) -> Result<()>
  where
    H: Any + Send + Sync,
  {
    let key = EffectKey::of::<T>(operation);
    match self.effects.entry(key) {
      Entry::Occupied(_) => Err(Error::DuplicateRegistration {
        model: key.model.name(),
        operation,
      }),
      Entry::Vacant(vacant) => {
        vacant.insert(Box::new(handler));
        debug!(model = %key.model, %operation, "registered effect");
        Ok(())
      }
    }
  }

  /// Registers the effect that creates a model in the backend. It may return
  /// a transformed model (e.g. with server-assigned fields) or `None`.
  pub fn add_create_effect<T, F, Fut, E>(&self, effect: F) -> Result<()>
  where
    T: Model,
    F: Fn(Arc<C>, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
  {
    let handler: CreateFn<C, T> =
      Arc::new(move |context: Arc<C>, model: T| erase(effect(context, model)).boxed());
    self.register::<T, _>(Operation::Create, handler)
  }

  /// Registers the effect that loads a single model by ID. `None` means the
  /// backend does not know the ID.
  pub fn add_read_effect<T, F, Fut, E>(&self, effect: F) -> Result<()>
  where
    T: Model,
    F: Fn(Arc<C>, ModelId, ReadArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
  {
    let handler: ReadOneFn<C, T> =
      Arc::new(move |context: Arc<C>, id: ModelId, args: ReadArgs| {
        erase(effect(context, id, args)).boxed()
      });
    self.register::<T, _>(Operation::ReadOne, handler)
  }

  /// Registers the effect that loads the authoritative list of models
  /// matching some search options.
  pub fn add_read_many_effect<T, F, Fut, E>(&self, effect: F) -> Result<()>
  where
    T: Model,
    F: Fn(Arc<C>, SearchOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
  {
    let handler: ReadManyFn<C, T> =
      Arc::new(move |context: Arc<C>, options: SearchOptions| {
        erase(effect(context, options)).boxed()
      });
    self.register::<T, _>(Operation::ReadMany, handler)
  }

  /// Registers the pure filter applied to cached models before pagination.
  /// It must not perform I/O.
  pub fn add_read_many_filter_effect<T, F>(&self, effect: F) -> Result<()>
  where
    T: Model,
    F: Fn(Vec<Arc<T>>, &SearchOptions) -> Vec<Arc<T>> + Send + Sync + 'static,
  {
    let handler: ReadManyFilterFn<T> = Arc::new(effect);
    self.register::<T, _>(Operation::ReadManyFilter, handler)
  }

  /// Registers the effect that writes a changed model to the backend.
  pub fn add_update_effect<T, F, Fut, E>(&self, effect: F) -> Result<()>
  where
    T: Model,
    F: Fn(Arc<C>, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
  {
    let handler: UpdateFn<C, T> =
      Arc::new(move |context: Arc<C>, model: T| erase(effect(context, model)).boxed());
    self.register::<T, _>(Operation::Update, handler)
  }

  /// Registers the effect that deletes a model from the backend.
  pub fn add_delete_effect<T, F, Fut, E>(&self, effect: F) -> Result<()>
  where
    T: Model,
    F: Fn(Arc<C>, ModelId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
  {
    let handler: DeleteFn<C> =
      Arc::new(move |context: Arc<C>, id: ModelId| erase(effect(context, id)).boxed());
    self.register::<T, _>(Operation::Delete, handler)
  }

  // --- Dispatch ---

  /// Clones the handler out of the map so no shard lock is held while the
  /// effect runs.
  fn handler<T: Model, H>(&self, operation: Operation) -> Result<H>
  where
    H: Any + Clone,
  {
    let key = EffectKey::of::<T>(operation);
    trace!(model = %key.model, %operation, "dispatching effect");
    self
      .effects
      .get(&key)
      .and_then(|entry| entry.value().downcast_ref::<H>().cloned())
      .ok_or(Error::UnimplementedOperation {
        model: key.model.name(),
        operation,
      })
  }

  fn backend<T: Model>(operation: Operation) -> impl FnOnce(BoxError) -> Error {
    move |source| Error::Backend {
      model: ModelType::of::<T>().name(),
      operation,
      source,
    }
  }

  /// Creates a model through the registered create effect.
  pub async fn create<T: Model>(&self, model: T) -> Result<Option<T>> {
    let effect = self.handler::<T, CreateFn<C, T>>(Operation::Create)?;
    effect(self.context.clone(), model)
      .await
      .map_err(Self::backend::<T>(Operation::Create))
  }

  /// Reads one model through the registered read effect.
  pub async fn read_one<T: Model>(&self, id: ModelId, args: ReadArgs) -> Result<Option<T>> {
    let effect = self.handler::<T, ReadOneFn<C, T>>(Operation::ReadOne)?;
    effect(self.context.clone(), id, args)
      .await
      .map_err(Self::backend::<T>(Operation::ReadOne))
  }

  /// Reads the authoritative list of models through the read-many effect.
  pub async fn read_many<T: Model>(&self, options: SearchOptions) -> Result<Vec<T>> {
    let effect = self.handler::<T, ReadManyFn<C, T>>(Operation::ReadMany)?;
    effect(self.context.clone(), options)
      .await
      .map_err(Self::backend::<T>(Operation::ReadMany))
  }

  /// Filters cached models through the read-many filter effect.
  pub fn read_many_filter<T: Model>(
    &self,
    cached: Vec<Arc<T>>,
    options: &SearchOptions,
  ) -> Result<Vec<Arc<T>>> {
    let effect = self.handler::<T, ReadManyFilterFn<T>>(Operation::ReadManyFilter)?;
    Ok(effect(cached, options))
  }

  /// Writes a model through the registered update effect.
  pub async fn update<T: Model>(&self, model: T) -> Result<Option<T>> {
    let effect = self.handler::<T, UpdateFn<C, T>>(Operation::Update)?;
    effect(self.context.clone(), model)
      .await
      .map_err(Self::backend::<T>(Operation::Update))
  }

  /// Deletes a model through the registered delete effect.
  pub async fn delete<T: Model>(&self, id: ModelId) -> Result<()> {
    let effect = self.handler::<T, DeleteFn<C>>(Operation::Delete)?;
    effect(self.context.clone(), id)
      .await
      .map_err(Self::backend::<T>(Operation::Delete))
  }
}
