use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use pca_engine::{DecompositionMethod, PcaConfig, PcaEngine};
use rand::distributions::Uniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const METHODS: [DecompositionMethod; 4] = [
    DecompositionMethod::Exact,
    DecompositionMethod::Randomized,
    DecompositionMethod::RandomizedBlockKrylov,
    DecompositionMethod::Quic,
];

/// Generates random data of shape (n_samples x n_features) with values 0, 1, or 2 (as f64), seeded for reproducibility.
fn generate_random_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let distribution = Uniform::new_inclusive(0, 2);
    Array2::from_shape_fn((n_samples, n_features), |_| rng.sample(distribution) as f64)
}

/// Fewer samples for the slow exact runs on big inputs.
fn determine_sample_size(method: DecompositionMethod, n_samples: usize, n_features: usize) -> usize {
    let work = n_samples * n_features;
    match (method, work) {
        (DecompositionMethod::Exact, w) if w >= 1_000_000 => 10,
        (_, w) if w >= 1_000_000 => 20,
        _ => 50,
    }
}

fn criterion_benchmark_runner(c: &mut Criterion) {
    let scenarios = vec![
        ("Small", 100, 50, 10),
        ("Medium", 1000, 500, 10),
        ("Tall", 5000, 200, 10),
        ("Wide", 200, 2000, 10),
        ("Wide-k50", 200, 2000, 50),
    ];

    for (name, n_samples, n_features, n_components) in scenarios {
        let data = generate_random_data(n_samples, n_features, 1234);
        let input_size_bytes = (n_samples * n_features * std::mem::size_of::<f64>()) as u64;

        for method in METHODS {
            let config = PcaConfig {
                decomposition: method,
                new_dimensionality: n_components,
                ..PcaConfig::default()
            };
            let engine = match PcaEngine::new(config) {
                Ok(engine) => engine,
                Err(e) => {
                    eprintln!("Skipping {} / {}: {}", method, name, e);
                    continue;
                }
            };

            let mut group = c.benchmark_group(format!("{}/{}", method, name));
            group.sample_size(determine_sample_size(method, n_samples, n_features));
            group.throughput(Throughput::Bytes(input_size_bytes));
            let id = BenchmarkId::new(
                method.as_str(),
                format!("{}_s{}_f{}_k{}", name, n_samples, n_features, n_components),
            );
            group.bench_with_input(id, &data, |b, data| {
                b.iter(|| engine.run(data.view()).map(|output| output.new_dimensionality))
            });
            group.finish();
        }
    }
}

criterion_group!(benches, criterion_benchmark_runner);
criterion_main!(benches);
