//! Handler shapes for backend effects.
//!
//! Effects are stored type-erased in the [`EffectRegistry`]; the aliases here
//! are the concrete types the registry boxes and downcasts to.

use crate::error::{BoxError, Result};
use crate::model::ModelId;
use crate::options::{ReadArgs, SearchOptions};
use crate::registry::EffectRegistry;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

pub(crate) type CreateFn<C, T> =
  Arc<dyn Fn(Arc<C>, T) -> BoxFuture<'static, Result<Option<T>, BoxError>> + Send + Sync>;

pub(crate) type ReadOneFn<C, T> = Arc<
  dyn Fn(Arc<C>, ModelId, ReadArgs) -> BoxFuture<'static, Result<Option<T>, BoxError>>
    + Send
    + Sync,
>;

pub(crate) type ReadManyFn<C, T> =
  Arc<dyn Fn(Arc<C>, SearchOptions) -> BoxFuture<'static, Result<Vec<T>, BoxError>> + Send + Sync>;

pub(crate) type ReadManyFilterFn<T> =
  Arc<dyn Fn(Vec<Arc<T>>, &SearchOptions) -> Vec<Arc<T>> + Send + Sync>;

pub(crate) type UpdateFn<C, T> = CreateFn<C, T>;

pub(crate) type DeleteFn<C> =
  Arc<dyn Fn(Arc<C>, ModelId) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Awaits an effect's future and erases its error type.
pub(crate) async fn erase<T, E, Fut>(future: Fut) -> Result<T, BoxError>
where
  Fut: Future<Output = Result<T, E>>,
  E: Into<BoxError>,
{
  future.await.map_err(Into::into)
}

/// A bundle of effects that registers itself in one call.
///
/// This is the startup convenience for backends that implement several model
/// types: the module calls the `add_*_effect` methods of the registry it is
/// given and nothing else.
///
/// ```
/// use fibre_model_cache::{EffectModule, EffectRegistry, Model, ModelId, Result};
///
/// struct Tag { id: ModelId }
/// impl Model for Tag {
///   fn id(&self) -> ModelId { self.id }
/// }
///
/// struct TagBackend;
///
/// impl EffectModule<()> for TagBackend {
///   fn register(self, registry: &EffectRegistry<()>) -> Result<()> {
///     registry.add_read_effect(|_, id, _| async move {
///       Ok::<_, std::io::Error>(Some(Tag { id }))
///     })?;
///     registry.add_delete_effect::<Tag, _, _, std::io::Error>(|_, _| async { Ok(()) })
///   }
/// }
///
/// let registry = EffectRegistry::new(());
/// registry.install(TagBackend).unwrap();
/// ```
pub trait EffectModule<C> {
  /// Registers every effect of this module.
  fn register(self, registry: &EffectRegistry<C>) -> Result<()>;
}

impl<C, F> EffectModule<C> for F
where
  F: FnOnce(&EffectRegistry<C>) -> Result<()>,
{
  fn register(self, registry: &EffectRegistry<C>) -> Result<()> {
    self(registry)
  }
}
