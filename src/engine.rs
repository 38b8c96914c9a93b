//! The PCA pipeline: preprocess, decompose, select, project.

use crate::config::{DecompositionMethod, PcaConfig};
use crate::decomposition::{ComponentSet, DecompositionStrategy};
use crate::diagnostics::DecompositionDiagnostics;
use crate::error::Result;
use crate::linalg_backends::{LinAlgBackend, NdarrayLinAlgBackend};
use crate::preprocess::{preprocess, validate_dataset, ScaleParameters};
use crate::projection::{project, Projection};
use crate::selection::{select_dimensionality, RetentionCriterion};
use log::{debug, info, warn};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Stages of one pipeline run, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Configured,
    Preprocessed,
    Decomposed,
    Selected,
    Projected,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configured => "configured",
            Self::Preprocessed => "preprocessed",
            Self::Decomposed => "decomposed",
            Self::Selected => "selected",
            Self::Projected => "projected",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Wall-clock time spent in each stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub preprocess: Duration,
    pub decompose: Duration,
    pub select: Duration,
    pub project: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.preprocess + self.decompose + self.select + self.project
    }

    fn record(&mut self, finished: PipelineStage, elapsed: Duration) {
        match finished {
            PipelineStage::Preprocessed => self.preprocess = elapsed,
            PipelineStage::Decomposed => self.decompose = elapsed,
            PipelineStage::Selected => self.select = elapsed,
            PipelineStage::Projected => self.project = elapsed,
            PipelineStage::Configured | PipelineStage::Done => {}
        }
    }
}

/// Everything a run produces.
#[derive(Clone, Debug)]
pub struct PcaOutput {
    /// `n_samples x new_dimensionality` scores.
    pub transformed: Array2<f64>,
    pub components: ComponentSet,
    /// Identity parameters when scaling was off.
    pub scale_parameters: ScaleParameters,
    pub new_dimensionality: usize,
    pub retained_variance: f64,
    /// The method that produced `components`; `Exact` after a fallback.
    pub decomposition: DecompositionMethod,
    pub timings: StageTimings,
    pub diagnostics: DecompositionDiagnostics,
}

/// Per-run state. Each variant holds what the next transition consumes.
enum PipelineState<'a> {
    Configured {
        dataset: ArrayView2<'a, f64>,
    },
    Preprocessed {
        data: Array2<f64>,
        scale: ScaleParameters,
    },
    Decomposed {
        data: Array2<f64>,
        scale: ScaleParameters,
        components: ComponentSet,
        method: DecompositionMethod,
    },
    Selected {
        data: Array2<f64>,
        scale: ScaleParameters,
        components: ComponentSet,
        method: DecompositionMethod,
        k: usize,
    },
    Projected {
        data: Array2<f64>,
        projection: Projection,
        scale: ScaleParameters,
        components: ComponentSet,
        method: DecompositionMethod,
    },
    Done {
        output: PcaOutput,
    },
}

impl PipelineState<'_> {
    fn stage(&self) -> PipelineStage {
        match self {
            Self::Configured { .. } => PipelineStage::Configured,
            Self::Preprocessed { .. } => PipelineStage::Preprocessed,
            Self::Decomposed { .. } => PipelineStage::Decomposed,
            Self::Selected { .. } => PipelineStage::Selected,
            Self::Projected { .. } => PipelineStage::Projected,
            Self::Done { .. } => PipelineStage::Done,
        }
    }
}

/// Runs PCA with a fixed configuration and linear-algebra backend.
///
/// The engine holds no per-run state, so one instance can serve any number
/// of runs, including concurrent ones from several threads.
#[derive(Clone, Debug)]
pub struct PcaEngine<B: LinAlgBackend = NdarrayLinAlgBackend> {
    config: PcaConfig,
    backend: B,
}

impl PcaEngine<NdarrayLinAlgBackend> {
    /// Creates an engine on the default LAPACK backend.
    ///
    /// # Errors
    /// `InvalidConfiguration` if `config` fails [`PcaConfig::validate`].
    pub fn new(config: PcaConfig) -> Result<Self> {
        Self::with_backend(config, NdarrayLinAlgBackend)
    }
}

impl<B: LinAlgBackend> PcaEngine<B> {
    pub fn with_backend(config: PcaConfig, backend: B) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, backend })
    }

    pub fn config(&self) -> &PcaConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Runs the whole pipeline on `dataset` (`n_samples x n_features`).
    ///
    /// # Errors
    /// The first error raised by any stage; nothing partial is returned.
    pub fn run(&self, dataset: ArrayView2<f64>) -> Result<PcaOutput> {
        validate_dataset(dataset)?;
        self.config.validate_for_features(dataset.ncols())?;
        let criterion = self.config.retention_criterion()?;
        info!(
            "PCA on {} samples x {} features: method {}, scale {}, {:?}.",
            dataset.nrows(),
            dataset.ncols(),
            self.config.decomposition,
            self.config.scale,
            criterion
        );

        let mut timings = StageTimings::default();
        let mut state = PipelineState::Configured { dataset };
        loop {
            let started = Instant::now();
            state = match state {
                PipelineState::Done { mut output } => {
                    output.timings = timings;
                    info!(
                        "PCA finished in {:.3?}: kept {} dimensions, {:.4} of the variance.",
                        timings.total(),
                        output.new_dimensionality,
                        output.retained_variance
                    );
                    return Ok(output);
                }
                other => self.advance(other, criterion)?,
            };
            let elapsed = started.elapsed();
            let reached = state.stage();
            timings.record(reached, elapsed);
            if reached != PipelineStage::Done {
                info!("Stage {} completed in {:.3?}.", reached, elapsed);
            }
        }
    }

    fn advance<'a>(
        &self,
        state: PipelineState<'a>,
        criterion: RetentionCriterion,
    ) -> Result<PipelineState<'a>> {
        let next = match state {
            PipelineState::Configured { dataset } => {
                let (data, scale) = preprocess(dataset, self.config.scale)?;
                PipelineState::Preprocessed { data, scale }
            }
            PipelineState::Preprocessed { data, scale } => {
                let (n_samples, n_features) = data.dim();
                let target_rank = match criterion {
                    RetentionCriterion::TargetCount(k) if k > 0 => k,
                    _ => n_samples.min(n_features),
                };
                let (components, method) = self.decompose(data.view(), target_rank)?;
                PipelineState::Decomposed {
                    data,
                    scale,
                    components,
                    method,
                }
            }
            PipelineState::Decomposed {
                data,
                scale,
                components,
                method,
            } => {
                let k = select_dimensionality(&components, criterion)?;
                if let RetentionCriterion::TargetCount(requested) = criterion {
                    if requested > k {
                        warn!(
                            "Requested {} dimensions but the {} decomposition produced only {}.",
                            requested, method, k
                        );
                    }
                }
                PipelineState::Selected {
                    data,
                    scale,
                    components,
                    method,
                    k,
                }
            }
            PipelineState::Selected {
                data,
                scale,
                components,
                method,
                k,
            } => {
                let projection = project(data.view(), &components, k)?;
                PipelineState::Projected {
                    data,
                    projection,
                    scale,
                    components,
                    method,
                }
            }
            PipelineState::Projected {
                data,
                projection,
                scale,
                components,
                method,
            } => {
                let diagnostics = DecompositionDiagnostics::collect(
                    &components,
                    method,
                    data.view(),
                    projection.transformed.view(),
                );
                debug!("Decomposition diagnostics: {:?}", diagnostics);
                PipelineState::Done {
                    output: PcaOutput {
                        transformed: projection.transformed,
                        components,
                        scale_parameters: scale,
                        new_dimensionality: projection.k,
                        retained_variance: projection.retained_variance,
                        decomposition: method,
                        timings: StageTimings::default(),
                        diagnostics,
                    },
                }
            }
            done @ PipelineState::Done { .. } => done,
        };
        Ok(next)
    }

    /// Runs the configured strategy, retrying with `Exact` when allowed.
    fn decompose(
        &self,
        data: ArrayView2<f64>,
        target_rank: usize,
    ) -> Result<(ComponentSet, DecompositionMethod)> {
        let strategy = DecompositionStrategy::from_config(&self.config);
        match strategy.compute(&self.backend, data, target_rank) {
            Ok(components) => Ok((components, strategy.method())),
            Err(err)
                if err.is_numerical_failure()
                    && self.config.fallback_to_exact
                    && strategy.method().is_approximate() =>
            {
                warn!(
                    "{} decomposition failed ({}); falling back to exact.",
                    strategy.method(),
                    err
                );
                DecompositionStrategy::Exact
                    .compute(&self.backend, data, target_rank)
                    .map(|components| (components, DecompositionMethod::Exact))
            }
            Err(err) => Err(err),
        }
    }
}
