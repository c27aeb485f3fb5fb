use std::hint::black_box;

use criterion::{
  BenchmarkId,
  Criterion,
  criterion_group,
  criterion_main,
};
use dmapool::{
  BlockPool,
  PoolConfig,
  RegisterFn,
};

fn registrar() -> RegisterFn {
  Box::new(|_, _| 1)
}

fn bench_cfg() -> PoolConfig {
  PoolConfig::new()
    .with_initial_size_mb(64)
    .with_increase_size_mb(64)
}

fn bench_alloc_dealloc(c: &mut Criterion) {
  let mut group = c.benchmark_group("pool_alloc_dealloc");

  for size in [8192usize, 16384, 65536] {
    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &sz| {
      let pool = BlockPool::new(bench_cfg(), registrar()).unwrap();

      b.iter(|| {
        let ptr = pool.alloc(sz).unwrap();
        black_box(ptr);
        pool.dealloc(ptr).unwrap();
      });
    });
  }

  group.finish();
}

fn bench_region_lookup(c: &mut Criterion) {
  let pool = BlockPool::new(bench_cfg(), registrar()).unwrap();
  let ptr = pool.alloc(8192).unwrap();

  c.bench_function("region_id_of", |b| {
    b.iter(|| black_box(pool.region_id_of(black_box(ptr.as_ptr()))));
  });

  pool.dealloc(ptr).unwrap();
}

criterion_group!(benches, bench_alloc_dealloc, bench_region_lookup);
criterion_main!(benches);
