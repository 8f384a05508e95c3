use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use shrink_map::{Batch, BatchOp, Config, ShrinkMap};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> String {
    format!("k{:016x}", n)
}

// No worker and no cap so the numbers measure the map itself.
fn manual_config() -> Config {
    Config::default()
        .with_auto_shrink_enabled(false)
        .with_max_map_size(0)
        .with_min_shrink_interval(Duration::ZERO)
}

fn filled(seed: u64, n: usize) -> (ShrinkMap<String, u64>, Vec<String>) {
    let m = ShrinkMap::new(manual_config());
    let keys: Vec<_> = lcg(seed).take(n).map(key).collect();
    for (i, k) in keys.iter().enumerate() {
        m.set(k.clone(), i as u64).unwrap();
    }
    (m, keys)
}

fn bench_set_fresh_100k(c: &mut Criterion) {
    c.bench_function("shrink_map::set_fresh_100k", |b| {
        b.iter_batched(
            || ShrinkMap::<String, u64>::new(manual_config()),
            |m| {
                for (i, x) in lcg(1).take(100_000).enumerate() {
                    m.set(key(x), i as u64).unwrap();
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_get_hit_10k(c: &mut Criterion) {
    c.bench_function("shrink_map::get_hit_10k_on_100k", |b| {
        let (m, keys) = filled(7, 100_000);
        let n = keys.len();
        let mut s = 0x9e3779b97f4a7c15u64;
        let queries: Vec<String> = (0..10_000)
            .map(|_| {
                s = s.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
                keys[(s as usize) % n].clone()
            })
            .collect();
        b.iter(|| {
            for k in &queries {
                black_box(m.get(k.as_str()));
            }
        })
    });
}

fn bench_delete_90_percent(c: &mut Criterion) {
    c.bench_function("shrink_map::delete_90k_of_100k", |b| {
        b.iter_batched(
            || filled(5, 100_000),
            |(m, keys)| {
                for k in &keys[..90_000] {
                    black_box(m.delete(k.as_str()));
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_force_shrink_after_deletes(c: &mut Criterion) {
    c.bench_function("shrink_map::force_shrink_10k_live_of_100k", |b| {
        b.iter_batched(
            || {
                let (m, keys) = filled(11, 100_000);
                for k in &keys[..90_000] {
                    m.delete(k.as_str());
                }
                m
            },
            |m| {
                black_box(m.force_shrink());
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_apply_batch_1k(c: &mut Criterion) {
    c.bench_function("shrink_map::apply_batch_1k_mixed", |b| {
        b.iter_batched(
            || {
                let (m, keys) = filled(13, 10_000);
                let batch: Batch<String, u64> = keys[..1_000]
                    .iter()
                    .enumerate()
                    .map(|(i, k)| {
                        if i % 2 == 0 {
                            BatchOp::Delete(k.clone())
                        } else {
                            BatchOp::Set(k.clone(), i as u64)
                        }
                    })
                    .collect();
                (m, batch)
            },
            |(m, batch)| {
                m.apply_batch(batch).unwrap();
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_snapshot_10k(c: &mut Criterion) {
    c.bench_function("shrink_map::snapshot_10k", |b| {
        let (m, _) = filled(17, 10_000);
        b.iter(|| black_box(m.snapshot()))
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(12)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_ops;
    config = bench_config();
    targets = bench_set_fresh_100k,
              bench_get_hit_10k,
              bench_delete_90_percent,
              bench_apply_batch_1k,
              bench_snapshot_10k
}
criterion_group! {
    name = benches_shrink;
    config = bench_config();
    targets = bench_force_shrink_after_deletes
}
criterion_main!(benches_ops, benches_shrink);
