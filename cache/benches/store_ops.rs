use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fibre_model_cache::{Model, ModelId, ModelStore, PutOptions};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Row {
  id: ModelId,
  value: u64,
}

impl Model for Row {
  fn id(&self) -> ModelId {
    self.id
  }
}

fn rows(count: usize) -> Vec<Row> {
  (0..count as u64)
    .map(|value| Row {
      id: ModelId::new_v4(),
      value,
    })
    .collect()
}

fn populated(count: usize) -> (ModelStore, Vec<ModelId>) {
  let store = ModelStore::new();
  let rows = rows(count);
  let ids = rows.iter().map(|row| row.id).collect();
  store.put_many(rows, PutOptions::OVERWRITE);
  (store, ids)
}

fn bench_single_thread(c: &mut Criterion) {
  let mut group = c.benchmark_group("SingleThread");
  let num_items = 10_000;
  group.throughput(Throughput::Elements(num_items as u64));

  let (store, ids) = populated(num_items);
  group.bench_function("GetHit", |b| {
    b.iter(|| {
      for id in &ids {
        black_box(store.get::<Row>(*id).map(|row| row.value));
      }
    })
  });

  group.bench_function("IsValid", |b| {
    b.iter(|| {
      for id in &ids {
        black_box(store.is_valid::<Row>(*id));
      }
    })
  });

  let fresh = rows(num_items);
  group.bench_function("PutOverwrite", |b| {
    b.iter_batched(
      ModelStore::new,
      |store| {
        for row in &fresh {
          store.put(row.clone(), PutOptions::OVERWRITE);
        }
        store
      },
      criterion::BatchSize::LargeInput,
    )
  });

  group.bench_function("PutMany", |b| {
    b.iter_batched(
      || (ModelStore::new(), fresh.clone()),
      |(store, batch)| {
        black_box(store.put_many(batch, PutOptions::OVERWRITE));
        store
      },
      criterion::BatchSize::LargeInput,
    )
  });

  group.bench_function("GetAll", |b| b.iter(|| black_box(store.get_all::<Row>().len())));
  group.finish();
}

fn bench_concurrent_reads(c: &mut Criterion) {
  let mut group = c.benchmark_group("ConcurrentGet");
  let num_items = 10_000;

  for concurrency in [2usize, 4, 8] {
    group.throughput(Throughput::Elements(num_items as u64));
    let (store, ids) = populated(num_items);
    let store = Arc::new(store);
    let ids = Arc::new(ids);

    group.bench_with_input(
      BenchmarkId::from_parameter(concurrency),
      &concurrency,
      |b, &concurrency| {
        b.iter_custom(|iters| {
          let mut total = Duration::ZERO;
          for _ in 0..iters {
            let barrier = Arc::new(Barrier::new(concurrency + 1));
            let handles: Vec<_> = (0..concurrency)
              .map(|t| {
                let store = store.clone();
                let ids = ids.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                  barrier.wait();
                  for id in ids.iter().skip(t).step_by(concurrency) {
                    black_box(store.get::<Row>(*id));
                  }
                })
              })
              .collect();

            barrier.wait();
            let start = Instant::now();
            for handle in handles {
              handle.join().unwrap();
            }
            total += start.elapsed();
          }
          total
        })
      },
    );
  }
  group.finish();
}

criterion_group!(benches, bench_single_thread, bench_concurrent_reads);
criterion_main!(benches);
