#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use fibre_model_cache::{
  EffectRegistry, Model, ModelChanged, ModelId, ModelService, ModelStore, Result,
};
use parking_lot::Mutex;

// Creating an item with this name fails in the backend.
pub const REJECTED: &str = "rejected";

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
  pub id: ModelId,
  pub name: String,
  pub version: u32,
}

impl Item {
  pub fn new(name: &str) -> Self {
    Self {
      id: ModelId::new_v4(),
      name: name.to_string(),
      version: 0,
    }
  }
}

impl Model for Item {
  fn id(&self) -> ModelId {
    self.id
  }
}

/// An in-memory stand-in for a remote API that counts every call.
#[derive(Default)]
pub struct Backend {
  pub rows: Mutex<HashMap<ModelId, Item>>,
  pub creates: AtomicUsize,
  pub read_ones: AtomicUsize,
  pub read_manys: AtomicUsize,
  pub updates: AtomicUsize,
  pub deletes: AtomicUsize,
}

impl Backend {
  pub fn with_rows(items: impl IntoIterator<Item = Item>) -> Self {
    let backend = Self::default();
    backend
      .rows
      .lock()
      .extend(items.into_iter().map(|item| (item.id, item)));
    backend
  }

  pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
  }
}

/// Registers every effect for `Item` against the backend.
///
/// The backend bumps `version` on create and update. `read_many` returns all
/// rows matching the query; the cache-side filter sorts by name.
pub fn item_effects(registry: &EffectRegistry<Backend>) -> Result<()> {
  registry.add_create_effect(|backend: Arc<Backend>, item: Item| async move {
    backend.creates.fetch_add(1, Ordering::SeqCst);
    if item.name == REJECTED {
      return Err(io::Error::new(io::ErrorKind::InvalidInput, "name rejected"));
    }
    let created = Item { version: 1, ..item };
    backend.rows.lock().insert(created.id, created.clone());
    Ok(Some(created))
  })?;

  registry.add_read_effect(|backend: Arc<Backend>, id, _args| async move {
    backend.read_ones.fetch_add(1, Ordering::SeqCst);
    let row = backend.rows.lock().get(&id).cloned();
    Ok::<_, io::Error>(row)
  })?;

  registry.add_read_many_effect(|backend: Arc<Backend>, options| async move {
    backend.read_manys.fetch_add(1, Ordering::SeqCst);
    let rows: Vec<Item> = backend
      .rows
      .lock()
      .values()
      .filter(|item| item.name.contains(options.query.as_str()))
      .cloned()
      .collect();
    Ok::<_, io::Error>(rows)
  })?;

  registry.add_read_many_filter_effect(|items: Vec<Arc<Item>>, options| {
    let mut items: Vec<_> = items
      .into_iter()
      .filter(|item| item.name.contains(options.query.as_str()))
      .collect();
    items.sort_by(|a, b| a.name.cmp(&b.name));
    items
  })?;

  registry.add_update_effect(|backend: Arc<Backend>, item: Item| async move {
    backend.updates.fetch_add(1, Ordering::SeqCst);
    let updated = Item {
      version: item.version + 1,
      ..item
    };
    backend.rows.lock().insert(updated.id, updated.clone());
    Ok::<_, io::Error>(Some(updated))
  })?;

  registry.add_delete_effect::<Item, _, _, io::Error>(|backend: Arc<Backend>, id| async move {
    backend.deletes.fetch_add(1, Ordering::SeqCst);
    backend.rows.lock().remove(&id);
    Ok(())
  })
}

pub fn item_registry(backend: Backend) -> EffectRegistry<Backend> {
  let registry = EffectRegistry::new(backend);
  registry.install(item_effects).unwrap();
  registry
}

/// Builds a service on the current Tokio runtime.
pub fn item_service(backend: Backend) -> ModelService<Backend> {
  ModelService::new(item_registry(backend)).unwrap()
}

pub fn backend(service: &ModelService<Backend>) -> &Backend {
  service.registry().context()
}

pub fn count_changes_on_store(store: &ModelStore) -> Arc<AtomicUsize> {
  let count = Arc::new(AtomicUsize::new(0));
  let inner = count.clone();
  store.subscribe(move |_: &ModelChanged| {
    inner.fetch_add(1, Ordering::SeqCst);
  });
  count
}

pub fn count_changes(service: &ModelService<Backend>) -> Arc<AtomicUsize> {
  let count = Arc::new(AtomicUsize::new(0));
  let inner = count.clone();
  service.subscribe(move |_: &ModelChanged| {
    inner.fetch_add(1, Ordering::SeqCst);
  });
  count
}
