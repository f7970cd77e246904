mod common;

use common::Item;
use fibre_model_cache::{ModelStore, PutOptions};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_first_puts_create_one_partition() {
  let store = Arc::new(ModelStore::new());
  let num_threads = 16;
  let barrier = Arc::new(Barrier::new(num_threads));
  let mut handles = vec![];

  for i in 0..num_threads {
    let store = store.clone();
    let barrier = barrier.clone();
    handles.push(thread::spawn(move || {
      barrier.wait();
      store.insert(Item::new(&format!("item-{i}")));
    }));
  }

  for handle in handles {
    handle.join().unwrap();
  }

  assert_eq!(store.partition_count(), 1);
  assert_eq!(store.len::<Item>(), num_threads);
}

#[test]
fn test_concurrent_keep_existing_writes_one_winner() {
  let store = Arc::new(ModelStore::new());
  let id = Item::new("contested").id;
  let num_threads = 8;
  let barrier = Arc::new(Barrier::new(num_threads));
  let mut handles = vec![];

  for i in 0..num_threads {
    let store = store.clone();
    let barrier = barrier.clone();
    handles.push(thread::spawn(move || {
      barrier.wait();
      let item = Item {
        id,
        name: format!("writer-{i}"),
        version: i as u32,
      };
      store.put(item, PutOptions::KEEP_EXISTING)
    }));
  }

  let written = handles
    .into_iter()
    .map(|handle| handle.join().unwrap())
    .filter(|&written| written)
    .count();

  assert_eq!(written, 1, "exactly one writer should win");
  assert_eq!(store.len::<Item>(), 1);
  assert_eq!(store.metrics().skipped_writes, num_threads as u64 - 1);
}

#[test]
fn test_readers_see_whole_values_during_writes() {
  let store = Arc::new(ModelStore::new());
  let id = Item::new("seed").id;
  store.insert(Item {
    id,
    name: "v0".into(),
    version: 0,
  });

  let writer = {
    let store = store.clone();
    thread::spawn(move || {
      for version in 1..=500u32 {
        store.insert(Item {
          id,
          name: format!("v{version}"),
          version,
        });
      }
    })
  };

  let reader = {
    let store = store.clone();
    thread::spawn(move || {
      for _ in 0..500 {
        let item = store.get::<Item>(id).unwrap();
        assert_eq!(item.name, format!("v{}", item.version));
      }
    })
  };

  writer.join().unwrap();
  reader.join().unwrap();
  assert_eq!(store.get::<Item>(id).unwrap().version, 500);
}
