use fibre_model_cache::{
  EffectModule, EffectRegistry, Model, ModelId, ModelService, Result, SearchOptions,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Book {
  id: ModelId,
  title: String,
}

impl Model for Book {
  fn id(&self) -> ModelId {
    self.id
  }
}

#[derive(Default)]
struct Library {
  shelf: Mutex<HashMap<ModelId, Book>>,
}

/// Wires every book effect against the library in one call.
struct BookEffects;

impl EffectModule<Library> for BookEffects {
  fn register(self, registry: &EffectRegistry<Library>) -> Result<()> {
    registry.add_create_effect(|library: Arc<Library>, book: Book| async move {
      library.shelf.lock().insert(book.id, book.clone());
      Ok::<_, Infallible>(Some(book))
    })?;
    registry.add_read_many_effect(|library: Arc<Library>, _| async move {
      let books: Vec<Book> = library.shelf.lock().values().cloned().collect();
      Ok::<_, Infallible>(books)
    })?;
    registry.add_read_many_filter_effect(|books: Vec<Arc<Book>>, options: &SearchOptions| {
      let mut books: Vec<_> = books
        .into_iter()
        .filter(|book| book.title.contains(options.query.as_str()))
        .collect();
      books.sort_by(|a, b| a.title.cmp(&b.title));
      books
    })?;
    registry.add_delete_effect::<Book, _, _, Infallible>(|library: Arc<Library>, id| async move {
      library.shelf.lock().remove(&id);
      Ok(())
    })
  }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
  let registry = EffectRegistry::new(Library::default());
  registry.install(BookEffects)?;
  println!("Registered operations: {:?}", registry.operations::<Book>());

  let service = ModelService::new(registry)?;

  let titles = ["Dune", "Hyperion", "Foundation", "Dune Messiah"];
  let created = service
    .create_many(titles.iter().map(|title| Book {
      id: ModelId::new_v4(),
      title: title.to_string(),
    }))
    .await?;
  println!("Created {} books", created.len());

  let dune = service
    .read_many_async::<Book>(SearchOptions::page(0, 10).query("Dune"))
    .await?;
  println!("Books matching 'Dune': {:?}", dune);

  service.delete_model(&*created[0]).await?;
  let remaining = service.read_all_async::<Book>().await?;
  println!("{} books left after deleting '{}'", remaining.len(), created[0].title);
  println!("Store metrics: {:?}", service.store().metrics());
  Ok(())
}
