//! A type-partitioned model cache with stale-while-revalidate reads.
//!
//! Application code asks a [`ModelService`] for models of any type
//! implementing [`Model`]. The service answers from an in-memory
//! [`ModelStore`] and keeps it current through the backend effects
//! registered in an [`EffectRegistry`].
//!
//! # Features
//! - **Per-Type Partitions**: Every model type lives in its own concurrent
//!   map, created on first use.
//! - **Freshness**: Entries older than the time-to-live (15 minutes by
//!   default) are served but reported as invalid.
//! - **Stale-While-Revalidate**: Non-blocking reads return what is cached and
//!   refresh it in the background; `_async` reads wait for the backend.
//! - **Change Notifications**: Subscribers hear about every write that made
//!   data fresh and every delete.
//! - **Observability**: Atomic counters for the store and the backend.

// Public modules that form the API
pub mod builder;
pub mod effects;
pub mod error;
pub mod listener;
pub mod metrics;
pub mod model;
pub mod options;
pub mod refresh;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod store;

// Internal, crate-only modules
mod entry;
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::{ModelServiceBuilder, ModelStoreBuilder};
pub use effects::EffectModule;
pub use error::{BoxError, BuildError, Error, Operation, Result};
pub use listener::{ChangeListener, ModelChanged, SubscriptionId};
pub use metrics::{MetricsSnapshot, ServiceMetricsSnapshot};
pub use model::{Model, ModelId, ModelType};
pub use options::{ExtraOptions, ReadArgs, SearchOptions};
pub use refresh::{RefreshHandle, RefreshStatus};
pub use registry::EffectRegistry;
pub use runtime::TaskSpawner;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
pub use service::ModelService;
pub use store::{ModelStore, PutOptions, DEFAULT_TIME_TO_LIVE};
