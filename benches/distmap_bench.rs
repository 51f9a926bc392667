use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mesh_redist::comm::NoComm;
use mesh_redist::distmap::DistributionMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn bench_from_destinations(c: &mut Criterion) {
    let comm = NoComm::default();
    let mut group = c.benchmark_group("from_destinations");
    for n in [1usize << 12, 1 << 16, 1 << 20] {
        let dests = vec![0usize; n];
        group.bench_with_input(BenchmarkId::from_parameter(n), &dests, |b, dests| {
            b.iter(|| DistributionMap::from_destinations(&comm, dests).unwrap());
        });
    }
    group.finish();
}

fn bench_distribute_scalar(c: &mut Criterion) {
    let comm = NoComm::default();
    let mut group = c.benchmark_group("distribute_scalar");
    for n in [1usize << 12, 1 << 16, 1 << 20] {
        let dests = vec![0usize; n];
        let map = DistributionMap::from_destinations(&comm, &dests).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let data: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &data, |b, data| {
            b.iter(|| map.distribute(&comm, data.clone()).unwrap());
        });
    }
    group.finish();
}

fn bench_distribute_vector(c: &mut Criterion) {
    let comm = NoComm::default();
    let mut group = c.benchmark_group("distribute_vector");
    for n in [1usize << 12, 1 << 16] {
        let dests = vec![0usize; n];
        let map = DistributionMap::from_destinations(&comm, &dests).unwrap();
        let mut rng = SmallRng::seed_from_u64(2);
        let data: Vec<[f64; 3]> = (0..n).map(|_| [rng.r#gen(), rng.r#gen(), rng.r#gen()]).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &data, |b, data| {
            b.iter(|| map.distribute(&comm, data.clone()).unwrap());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_from_destinations,
    bench_distribute_scalar,
    bench_distribute_vector
);
criterion_main!(benches);
