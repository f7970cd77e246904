mod common;

use common::{item_effects, item_registry, Backend, Item, REJECTED};
use fibre_model_cache::{EffectRegistry, Error, ModelId, Operation, SearchOptions};
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn test_installed_module_supports_every_operation() {
  let registry = item_registry(Backend::default());

  assert_eq!(registry.operations::<Item>(), Operation::ALL.to_vec());
  assert_eq!(registry.len(), 6);
}

#[tokio::test]
async fn test_installing_twice_fails_on_first_duplicate() {
  let registry = item_registry(Backend::default());

  let err = registry.install(item_effects).unwrap_err();
  assert!(matches!(
    err,
    Error::DuplicateRegistration {
      operation: Operation::Create,
      ..
    }
  ));
  assert_eq!(registry.len(), 6);
}

#[tokio::test]
async fn test_create_failure_is_a_backend_error() {
  let registry = item_registry(Backend::default());

  let err = registry.create(Item::new(REJECTED)).await.unwrap_err();
  assert!(err.is_backend());
  assert_eq!(err.operation(), Operation::Create);

  let source = std::error::Error::source(&err).unwrap();
  assert_eq!(source.to_string(), "name rejected");
}

#[tokio::test]
async fn test_read_many_passes_search_options() {
  let backend = Backend::with_rows([Item::new("red chair"), Item::new("blue chair"), Item::new("desk")]);
  let registry = item_registry(backend);

  let rows = registry
    .read_many::<Item>(SearchOptions::new().query("chair"))
    .await
    .unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(registry.context().read_manys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unregistered_type_is_unimplemented() {
  #[derive(Debug)]
  struct Unknown;
  impl fibre_model_cache::Model for Unknown {
    fn id(&self) -> ModelId {
      ModelId::nil()
    }
  }

  let registry = item_registry(Backend::default());
  let err = registry.delete::<Unknown>(ModelId::new_v4()).await.unwrap_err();
  assert!(matches!(
    err,
    Error::UnimplementedOperation {
      operation: Operation::Delete,
      ..
    }
  ));
}

#[tokio::test]
async fn test_closure_module_registers_partial_effects() {
  let registry = EffectRegistry::new(());
  registry
    .install(|registry: &EffectRegistry<()>| {
      registry.add_read_effect(|_: Arc<()>, id, _| async move {
        Ok::<_, io::Error>(Some(Item {
          id,
          name: "from closure".into(),
          version: 0,
        }))
      })
    })
    .unwrap();

  let id = ModelId::new_v4();
  let item = registry.read_one::<Item>(id, Vec::new()).await.unwrap().unwrap();
  assert_eq!(item.id, id);
  assert!(!registry.supports::<Item>(Operation::Update));
}
