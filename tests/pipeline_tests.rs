// In tests/pipeline_tests.rs

use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2, ArrayView1};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use pca_engine::projection::reconstruct;
use pca_engine::{pca, DecompositionMethod, PcaConfig, PcaEngine, PcaError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const ALL_METHODS: [DecompositionMethod; 4] = [
    DecompositionMethod::Exact,
    DecompositionMethod::Randomized,
    DecompositionMethod::RandomizedBlockKrylov,
    DecompositionMethod::Quic,
];

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::random_using((n_samples, n_features), Uniform::new(-1.0, 1.0), &mut rng)
}

/// Four samples `c_i·u + e_i·w + offset` with orthonormal `u`, `w`.
/// The sample covariance has eigenvalues 20/3, 1/3 and 0.
fn dominant_direction_dataset() -> (Array2<f64>, Array1<f64>) {
    let u = array![1.0, 2.0, 2.0] / 3.0;
    let w = array![2.0, 1.0, -2.0] / 3.0;
    let offset = array![10.0, -5.0, 3.0];
    let c = array![-3.0, -1.0, 1.0, 3.0];
    let e = array![0.5, -0.5, -0.5, 0.5];

    let mut data = Array2::<f64>::zeros((4, 3));
    for (i, mut row) in data.rows_mut().into_iter().enumerate() {
        row.assign(&(&u * c[i] + &w * e[i] + &offset));
    }
    (data, c)
}

/// Sylvester-Hadamard matrix of order `n` (a power of two).
fn hadamard(n: usize) -> Array2<f64> {
    Array2::from_shape_fn((n, n), |(i, j)| {
        if (i & j).count_ones() % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    })
}

/// Eight samples whose covariance is exactly `diag(variances)`.
fn dataset_with_spectrum(variances: &[f64]) -> Array2<f64> {
    let h = hadamard(8);
    let mut data = Array2::<f64>::zeros((8, variances.len()));
    for (j, &lambda) in variances.iter().enumerate() {
        // Columns 1.. of H8 are zero-mean with squared norm 8.
        let scale = (7.0 * lambda / 8.0).sqrt();
        data.column_mut(j).assign(&(&h.column(j + 1) * scale));
    }
    data
}

fn assert_columns_match_up_to_sign(a: ArrayView1<f64>, b: ArrayView1<f64>, tolerance: f64) {
    let sign = if a.dot(&b) < 0.0 { -1.0 } else { 1.0 };
    for (x, y) in a.iter().zip(b.iter()) {
        assert_abs_diff_eq!(*x, sign * y, epsilon = tolerance);
    }
}

#[test]
fn test_dominant_direction_keeps_one_dimension() {
    init_logging();
    let (data, c) = dominant_direction_dataset();
    let config = PcaConfig {
        new_dimensionality: 1,
        ..PcaConfig::default()
    };

    let output = PcaEngine::new(config).unwrap().run(data.view()).unwrap();
    assert_eq!(output.transformed.dim(), (4, 1));
    assert_eq!(output.new_dimensionality, 1);
    assert!(output.retained_variance > 0.9);
    assert_abs_diff_eq!(output.retained_variance, 20.0 / 21.0, epsilon = 1e-10);

    let eig = output.components.eigenvalues();
    assert_abs_diff_eq!(eig[0], 20.0 / 3.0, epsilon = 1e-10);
    assert_abs_diff_eq!(eig[1], 1.0 / 3.0, epsilon = 1e-10);
    assert_abs_diff_eq!(eig[2], 0.0, epsilon = 1e-10);

    // The scores along the dominant direction are the planted coefficients.
    assert_columns_match_up_to_sign(output.transformed.column(0), c.view(), 1e-10);
    assert_eq!(pca(data.view(), config).unwrap(), output.transformed);
}

#[test]
fn test_half_variance_on_known_spectrum_keeps_two() {
    init_logging();
    let data = dataset_with_spectrum(&[4.0, 3.0, 2.0, 1.0]);
    let config = PcaConfig {
        var_to_retain: 0.5,
        ..PcaConfig::default()
    };
    let output = PcaEngine::new(config).unwrap().run(data.view()).unwrap();

    assert_eq!(output.transformed.dim(), (8, 2));
    for (got, expected) in output.components.eigenvalues().iter().zip([4.0, 3.0, 2.0, 1.0]) {
        assert_abs_diff_eq!(*got, expected, epsilon = 1e-10);
    }
    assert_abs_diff_eq!(output.retained_variance, 0.7, epsilon = 1e-10);
}

#[test]
fn test_every_method_honours_the_requested_dimensionality() {
    init_logging();
    let data = random_data(60, 12, 3);
    for method in ALL_METHODS {
        let config = PcaConfig {
            decomposition: method,
            new_dimensionality: 4,
            ..PcaConfig::default()
        };
        let transformed = pca(data.view(), config).unwrap();
        assert_eq!(transformed.dim(), (60, 4), "{}", method);
        assert!(transformed.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn test_variance_target_is_measured_against_the_whole_dataset() {
    init_logging();
    let data = random_data(120, 20, 44);
    let exact = pca_engine::DecompositionStrategy::Exact
        .compute(&pca_engine::NdarrayLinAlgBackend, data.view(), 20)
        .unwrap();
    for method in ALL_METHODS {
        let config = PcaConfig {
            decomposition: method,
            var_to_retain: 0.6,
            ..PcaConfig::default()
        };
        let output = PcaEngine::new(config).unwrap().run(data.view()).unwrap();
        let kept: f64 = output.components.eigenvalues().iter().take(output.new_dimensionality).sum();

        assert_abs_diff_eq!(output.components.total_variance(), exact.total_variance(), epsilon = 1e-9);
        assert_abs_diff_eq!(output.retained_variance, kept / exact.total_variance(), epsilon = 1e-12);
        assert!(
            output.retained_variance + 1e-12 >= 0.6
                || output.new_dimensionality == output.components.n_components(),
            "{} kept {} components for {:.4} of the variance",
            method,
            output.new_dimensionality,
            output.retained_variance
        );
    }
}

#[test]
fn test_full_retention_keeps_every_component() {
    let data = random_data(20, 5, 8);
    for config in [
        PcaConfig::default(),
        PcaConfig {
            var_to_retain: 1.0,
            ..PcaConfig::default()
        },
    ] {
        let output = PcaEngine::new(config).unwrap().run(data.view()).unwrap();
        assert_eq!(output.new_dimensionality, 5);
        assert_abs_diff_eq!(output.retained_variance, 1.0, epsilon = 1e-12);
    }
}

#[test]
fn test_scaled_round_trip_restores_the_input() {
    init_logging();
    let data = random_data(25, 6, 13).mapv(|v| 100.0 * v + 7.0);
    let config = PcaConfig {
        scale: true,
        ..PcaConfig::default()
    };
    let output = PcaEngine::new(config).unwrap().run(data.view()).unwrap();

    let scaled = reconstruct(output.transformed.view(), &output.components).unwrap();
    let restored = output.scale_parameters.invert(scaled.view()).unwrap();
    for (a, b) in data.iter().zip(restored.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-8);
    }
}

#[test]
fn test_zero_variance_feature_with_scaling_stays_finite() {
    init_logging();
    let mut data = random_data(15, 4, 21);
    data.column_mut(2).fill(3.5);
    for method in ALL_METHODS {
        let config = PcaConfig {
            scale: true,
            decomposition: method,
            new_dimensionality: 2,
            ..PcaConfig::default()
        };
        let transformed = pca(data.view(), config).unwrap();
        assert!(transformed.iter().all(|v| v.is_finite()), "{}", method);
    }
}

#[test]
fn test_error_kinds() {
    let empty = Array2::<f64>::zeros((0, 4));
    assert!(matches!(pca(empty.view(), PcaConfig::default()), Err(PcaError::InvalidInput(_))));

    let no_features = Array2::<f64>::zeros((3, 0));
    assert!(matches!(pca(no_features.view(), PcaConfig::default()), Err(PcaError::InvalidInput(_))));

    let with_nan = array![[1.0, 2.0], [f64::NAN, 1.0]];
    assert!(matches!(pca(with_nan.view(), PcaConfig::default()), Err(PcaError::InvalidInput(_))));

    let data = random_data(10, 3, 1);
    let too_many = PcaConfig {
        new_dimensionality: 4,
        ..PcaConfig::default()
    };
    assert!(matches!(pca(data.view(), too_many), Err(PcaError::InvalidConfiguration(_))));

    let bad_variance = PcaConfig {
        var_to_retain: 1.5,
        ..PcaConfig::default()
    };
    assert!(matches!(pca(data.view(), bad_variance), Err(PcaError::InvalidConfiguration(_))));

    let negative_variance = PcaConfig {
        var_to_retain: -0.2,
        ..PcaConfig::default()
    };
    assert!(matches!(PcaEngine::new(negative_variance), Err(PcaError::InvalidConfiguration(_))));
}

#[test]
fn test_concurrent_runs_agree_with_sequential_ones() {
    init_logging();
    let data = random_data(80, 16, 5);
    let engines: Vec<PcaEngine> = ALL_METHODS
        .iter()
        .map(|&method| {
            PcaEngine::new(PcaConfig {
                decomposition: method,
                new_dimensionality: 3,
                ..PcaConfig::default()
            })
            .unwrap()
        })
        .collect();
    let sequential: Vec<Array2<f64>> = engines
        .iter()
        .map(|engine| engine.run(data.view()).unwrap().transformed)
        .collect();

    let view = data.view();
    let concurrent: Vec<Array2<f64>> = std::thread::scope(|scope| {
        let handles: Vec<_> = engines
            .iter()
            .map(|engine| scope.spawn(move || engine.run(view).unwrap().transformed))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for ((method, a), b) in ALL_METHODS.iter().zip(&sequential).zip(&concurrent) {
        assert_eq!(a, b, "{} differs between sequential and concurrent runs", method);
    }
}

#[test]
fn test_config_deserializes_with_defaults() {
    let json = r#"{
        "decomposition": "randomized-block-krylov",
        "new_dimensionality": 2,
        "block_krylov": { "krylov_iterations": 4 }
    }"#;
    let config: PcaConfig = serde_json::from_str(json).unwrap();

    assert_eq!(config.decomposition, DecompositionMethod::RandomizedBlockKrylov);
    assert_eq!(config.new_dimensionality, 2);
    assert_eq!(config.block_krylov.krylov_iterations, 4);
    assert_eq!(config.block_krylov.block_oversampling, 10);
    assert_eq!(config.block_krylov.seed, Some(pca_engine::DEFAULT_RANDOM_SEED));
    assert!(!config.scale);
    assert_eq!(config.var_to_retain, 0.0);

    let bad: Result<PcaConfig, _> = serde_json::from_str(r#"{ "decomposition": "lanczos" }"#);
    assert!(bad.is_err());
}
