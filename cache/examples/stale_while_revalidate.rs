use fibre_model_cache::{EffectRegistry, Model, ModelChanged, ModelId, ModelService};
use std::convert::Infallible;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Profile {
  id: ModelId,
  version: usize,
}

impl Model for Profile {
  fn id(&self) -> ModelId {
    self.id
  }
}

#[tokio::main]
async fn main() {
  let registry = EffectRegistry::new(AtomicUsize::new(0));
  registry
    .add_read_effect(|loads: Arc<AtomicUsize>, id, _| async move {
      let version = loads.fetch_add(1, Ordering::SeqCst) + 1;
      println!("[Backend] Loading version {} of {}...", version, id);
      tokio::time::sleep(Duration::from_millis(300)).await; // Simulate slow load
      Ok::<_, Infallible>(Some(Profile { id, version }))
    })
    .unwrap();

  let service = ModelService::builder(registry)
    .time_to_live(Duration::from_secs(1))
    .build()
    .unwrap();
  service.subscribe(|event: &ModelChanged| println!("[Listener] {}", event));

  let id = ModelId::new_v4();

  println!("--- Step 1: Initial Load ---");
  let profile = service.read_one_async::<Profile>(id).await.unwrap().unwrap();
  println!("Received: {:?}", profile);
  assert_eq!(profile.version, 1);

  println!("\n--- Step 2: Cache Hit (Fresh) ---");
  let profile = service.read_one_async::<Profile>(id).await.unwrap().unwrap();
  println!("Received: {:?}", profile);
  assert_eq!(profile.version, 1);

  println!("\n--- Step 3: Wait for TTL to expire (2 seconds) ---");
  tokio::time::sleep(Duration::from_secs(2)).await;
  assert!(!service.store().is_valid::<Profile>(id));

  println!("\n--- Step 4: Stale Read ---");
  let (profile, refresh) = service.read_one_detached::<Profile>(id).unwrap();
  println!("IMMEDIATELY Received (stale): {:?}", profile);
  assert_eq!(profile.unwrap().version, 1);

  println!("\n--- Step 5: Wait for Background Refresh to Complete ---");
  println!("Refresh finished: {:?}", refresh.await);

  let profile = service.read_one::<Profile>(id).unwrap().unwrap();
  println!("Received (fresh): {:?}", profile);
  assert_eq!(profile.version, 2);
  println!("\nService metrics: {:?}", service.metrics());
}
