use std::fmt;

use thiserror::Error;

/// A type-erased error raised by a backend effect.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The backend operations an effect can implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
  Create,
  ReadOne,
  ReadMany,
  ReadManyFilter,
  Update,
  Delete,
}

impl Operation {
  /// All operations, in registration order.
  pub const ALL: [Operation; 6] = [
    Operation::Create,
    Operation::ReadOne,
    Operation::ReadMany,
    Operation::ReadManyFilter,
    Operation::Update,
    Operation::Delete,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Operation::Create => "create",
      Operation::ReadOne => "read_one",
      Operation::ReadMany => "read_many",
      Operation::ReadManyFilter => "read_many_filter",
      Operation::Update => "update",
      Operation::Delete => "delete",
    }
  }
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The main error type for model cache operations.
#[derive(Debug, Error)]
pub enum Error {
  /// No effect is registered for this model type and operation. This points
  /// at missing backend wiring and is never retried.
  #[error("no {operation} effect registered for model type {model}")]
  UnimplementedOperation {
    model: &'static str,
    operation: Operation,
  },

  /// A second effect was registered for the same model type and operation.
  #[error("a {operation} effect is already registered for model type {model}")]
  DuplicateRegistration {
    model: &'static str,
    operation: Operation,
  },

  /// A backend effect returned an error.
  #[error("{operation} effect for model type {model} failed: {source}")]
  Backend {
    model: &'static str,
    operation: Operation,
    #[source]
    source: BoxError,
  },
}

impl Error {
  /// Returns the operation this error relates to.
  pub fn operation(&self) -> Operation {
    match self {
      Error::UnimplementedOperation { operation, .. }
      | Error::DuplicateRegistration { operation, .. }
      | Error::Backend { operation, .. } => *operation,
    }
  }

  /// Returns `true` if the error was raised by a backend effect.
  pub fn is_backend(&self) -> bool {
    matches!(self, Error::Backend { .. })
  }
}

/// A specialized `Result` type for model cache operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur when building a store or service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// The time-to-live was set to zero, which would make every entry stale
  /// the moment it is stored.
  ZeroTimeToLive,
  /// The store was configured with zero shards.
  ZeroShards,
  /// No `TaskSpawner` was configured and no Tokio runtime is available to
  /// run background refreshes on.
  SpawnerRequired,
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroTimeToLive => write!(f, "time-to-live cannot be zero"),
      BuildError::ZeroShards => write!(f, "shard count cannot be zero"),
      BuildError::SpawnerRequired => write!(
        f,
        "background refresh requires a task spawner or a running tokio runtime"
      ),
    }
  }
}

impl std::error::Error for BuildError {}
