use ndarray::Array2;
use pca_engine::{DecompositionMethod, PcaConfig, PcaEngine};

fn main() {
    env_logger::init();

    // Three features, the third nearly a copy of the first.
    let data = Array2::from_shape_fn((50, 3), |(i, j)| {
        let t = i as f64 / 10.0;
        match j {
            0 => t,
            1 => (t * 1.7).sin(),
            _ => t + 0.01 * (i % 3) as f64,
        }
    });

    for method in [
        DecompositionMethod::Exact,
        DecompositionMethod::Randomized,
        DecompositionMethod::RandomizedBlockKrylov,
        DecompositionMethod::Quic,
    ] {
        let config = PcaConfig {
            scale: true,
            decomposition: method,
            var_to_retain: 0.95,
            ..PcaConfig::default()
        };
        let output = PcaEngine::new(config)
            .and_then(|engine| engine.run(data.view()))
            .expect("PCA failed");

        println!(
            "{:<24} kept {} of 3 dimensions ({:.2}% variance) in {:?}",
            method.to_string(),
            output.new_dimensionality,
            100.0 * output.retained_variance,
            output.timings.total()
        );
        println!("    eigenvalues: {:?}", output.components.eigenvalues());
    }
}
