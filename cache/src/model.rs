use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// The identifier type shared by every cached model.
pub type ModelId = uuid::Uuid;

/// A domain object that can be cached and synchronized.
///
/// The only requirement is a stable, unique identifier. The same ID across
/// create, read, update and delete calls always denotes the same logical
/// instance. Values are stored behind an `Arc`, so `Clone` is not required.
pub trait Model: Send + Sync + 'static {
  /// Returns the immutable identifier of this model.
  fn id(&self) -> ModelId;
}

/// A runtime tag identifying a model type.
///
/// Used as the partition key in the store and as the dispatch key in the
/// effect registry. Equality and hashing only consider the `TypeId`; the name
/// is carried for diagnostics.
#[derive(Clone, Copy)]
pub struct ModelType {
  type_id: TypeId,
  name: &'static str,
}

impl ModelType {
  /// Returns the tag for `T`.
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      name: std::any::type_name::<T>(),
    }
  }

  /// The `TypeId` this tag wraps.
  pub fn type_id(&self) -> TypeId {
    self.type_id
  }

  /// The fully qualified type name, as reported by `std::any::type_name`.
  pub fn name(&self) -> &'static str {
    self.name
  }

  /// The last path segment of the type name, e.g. `User` for `app::model::User`.
  pub fn short_name(&self) -> &'static str {
    let base = self.name.split('<').next().unwrap_or(self.name);
    base.rsplit("::").next().unwrap_or(base)
  }

  /// Returns `true` if this tag was created for `T`.
  pub fn is<T: ?Sized + Any>(&self) -> bool {
    self.type_id == TypeId::of::<T>()
  }
}

impl PartialEq for ModelType {
  fn eq(&self, other: &Self) -> bool {
    self.type_id == other.type_id
  }
}

impl Eq for ModelType {}

impl Hash for ModelType {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.type_id.hash(state);
  }
}

impl fmt::Debug for ModelType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ModelType({})", self.name)
  }
}

impl fmt::Display for ModelType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.short_name())
  }
}
