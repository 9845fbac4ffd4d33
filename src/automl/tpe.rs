//! Tree-structured Parzen Estimator (TPE) optimizer.
//!
//! TPE is a sequential model-based optimization algorithm that models
//! p(x|y) instead of p(y|x), making it more efficient than random search.
//!
//! # Algorithm
//!
//! 1. Split observations into "good" (l) and "bad" (g) based on gamma quantile
//! 2. Fit Kernel Density Estimators to each group
//! 3. Sample candidates and select by Expected Improvement ratio: l(x) / g(x)
//!
//! All densities live on the unit hypercube: every observation is mapped
//! through [`HyperParam::position_of`](crate::automl::HyperParam::position_of) before it enters the history, so
//! log-scaled and categorical dimensions are modelled on the same footing
//! as linear ones.
//!
//! # References
//!
//! Bergstra et al. (2011). Algorithms for Hyper-Parameter Optimization. `NeurIPS`.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::automl::search::{SearchSpace, SearchStrategy, Trial, TrialResult};

/// TPE optimizer configuration.
#[derive(Debug, Clone)]
pub struct TPEConfig {
    /// Quantile for splitting good/bad observations (default: 0.25)
    pub gamma: f32,
    /// Number of candidates to sample per iteration (default: 24)
    pub n_candidates: usize,
    /// Minimum observations before using the model (default: 10)
    pub n_startup_trials: usize,
}

impl Default for TPEConfig {
    fn default() -> Self {
        Self {
            gamma: 0.25,
            n_candidates: 24,
            n_startup_trials: 10,
        }
    }
}

/// Observation record for TPE history.
#[derive(Debug, Clone)]
struct Observation {
    /// Unit-interval position of each parameter the trial assigned.
    positions: BTreeMap<String, f64>,
    score: f64,
}

/// Tree-structured Parzen Estimator optimizer.
///
/// More sample-efficient than random search once a handful of
/// observations exist.
///
/// # Example
///
/// ```
/// use charcnn::automl::{HyperParam, SearchSpace, SearchStrategy, TPE};
///
/// let space = SearchSpace::new()
///     .add_param("learning_rate", HyperParam::continuous_log(1e-4, 5e-4));
///
/// let mut tpe = TPE::new(8).with_seed(7);
/// let trials = tpe.suggest(&space, 1);
/// assert_eq!(trials.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct TPE {
    config: TPEConfig,
    n_trials: usize,
    history: Vec<Observation>,
    trials_suggested: usize,
    seed: u64,
}

impl TPE {
    /// Create TPE optimizer with n iterations.
    #[must_use]
    pub fn new(n_trials: usize) -> Self {
        Self {
            config: TPEConfig::default(),
            n_trials,
            history: Vec::new(),
            trials_suggested: 0,
            seed: 42,
        }
    }

    /// Set random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set gamma (quantile for good/bad split).
    #[must_use]
    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.config.gamma = gamma.clamp(0.01, 0.5);
        self
    }

    /// Set number of startup trials (random before model).
    #[must_use]
    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.config.n_startup_trials = n;
        self
    }

    /// Set number of candidates scored per suggestion.
    #[must_use]
    pub fn with_candidates(mut self, n: usize) -> Self {
        self.config.n_candidates = n.max(1);
        self
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &TPEConfig {
        &self.config
    }

    /// Number of observations in history.
    #[must_use]
    pub fn n_observations(&self) -> usize {
        self.history.len()
    }

    /// Check if we have enough observations to use the TPE model.
    fn should_use_model(&self) -> bool {
        self.history.len() >= self.config.n_startup_trials.max(2)
    }

    /// Compute Gaussian KDE density at a point.
    fn kde_density(samples: &[f64], point: f64, bandwidth: f64) -> f64 {
        if samples.is_empty() {
            return 1.0; // Uniform prior
        }

        let n = samples.len() as f64;
        let sum: f64 = samples
            .iter()
            .map(|&x| {
                let z = (point - x) / bandwidth;
                (-0.5 * z * z).exp()
            })
            .sum();

        let norm = (2.0 * std::f64::consts::PI).sqrt() * bandwidth * n;
        sum / norm
    }

    /// Bandwidth by Scott's rule: h = n^(-1/5) * std.
    fn compute_bandwidth(samples: &[f64]) -> f64 {
        if samples.len() < 2 {
            return 1.0;
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt().max(0.01);

        std * n.powf(-0.2)
    }

    /// Split observations into good (l) and bad (g) at the gamma quantile.
    fn split_observations(&self) -> (Vec<&Observation>, Vec<&Observation>) {
        if self.history.len() < 2 {
            return (self.history.iter().collect(), Vec::new());
        }

        // NaN sorts last so it never lands in the good group
        let mut sorted: Vec<&Observation> = self.history.iter().collect();
        sorted.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => b.score.total_cmp(&a.score),
        });

        let n_good = ((self.history.len() as f32) * self.config.gamma).ceil() as usize;
        let n_good = n_good.max(1).min(sorted.len() - 1);

        let bad = sorted.split_off(n_good);
        (sorted, bad)
    }

    /// Product over dimensions of the group's KDE density at `candidate`.
    fn group_density(candidate: &[(&str, f64)], group: &[&Observation]) -> f64 {
        candidate
            .iter()
            .map(|&(name, x)| {
                let samples: Vec<f64> = group
                    .iter()
                    .filter_map(|o| o.positions.get(name).copied())
                    .collect();
                let bandwidth = Self::compute_bandwidth(&samples);
                Self::kde_density(&samples, x, bandwidth)
            })
            .product()
    }

    /// Expected Improvement ratio l(x) / g(x) for a candidate.
    fn compute_ei_ratio(
        candidate: &[(&str, f64)],
        good: &[&Observation],
        bad: &[&Observation],
    ) -> f64 {
        if candidate.is_empty() {
            return 0.0;
        }
        let l_density = Self::group_density(candidate, good);
        let g_density = Self::group_density(candidate, bad);
        l_density / (g_density + 1e-10)
    }

    fn model_trial(
        &self,
        space: &SearchSpace,
        dims: &[&str],
        good: &[&Observation],
        bad: &[&Observation],
        rng: &mut StdRng,
    ) -> Trial {
        let mut best: Vec<(&str, f64)> = dims.iter().map(|&d| (d, rng.gen::<f64>())).collect();
        let mut best_ei = Self::compute_ei_ratio(&best, good, bad);

        for _ in 1..self.config.n_candidates {
            let candidate: Vec<(&str, f64)> =
                dims.iter().map(|&d| (d, rng.gen::<f64>())).collect();
            let ei = Self::compute_ei_ratio(&candidate, good, bad);
            if ei > best_ei {
                best_ei = ei;
                best = candidate;
            }
        }

        let mut trial = Trial::empty();
        for (name, param) in space.iter() {
            let value = match best.iter().find(|(d, _)| *d == name) {
                Some(&(_, u)) => param.value_at(u),
                None => param.sample(rng),
            };
            trial.values.insert(name.to_string(), value);
        }
        trial
    }
}

impl SearchStrategy for TPE {
    fn suggest(&mut self, space: &SearchSpace, n: usize) -> Vec<Trial> {
        let n = n.min(self.remaining());
        if n == 0 {
            return Vec::new();
        }

        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.trials_suggested as u64));

        let dims = space.tunable_names();

        let trials: Vec<Trial> = if !self.should_use_model() || dims.is_empty() {
            (0..n).map(|_| space.sample(&mut rng)).collect()
        } else {
            let (good, bad) = self.split_observations();
            debug!(
                good = good.len(),
                bad = bad.len(),
                dims = dims.len(),
                "tpe model-based suggestion"
            );
            (0..n)
                .map(|_| self.model_trial(space, &dims, &good, &bad, &mut rng))
                .collect()
        };

        self.trials_suggested += trials.len();
        trials
    }

    fn update(&mut self, space: &SearchSpace, results: &[TrialResult]) {
        for result in results {
            let positions: BTreeMap<String, f64> = result
                .trial
                .values
                .iter()
                .filter_map(|(name, value)| {
                    let param = space.get(name).filter(|p| p.is_tunable())?;
                    Some((name.clone(), param.position_of(value)?))
                })
                .collect();

            self.history.push(Observation {
                positions,
                score: result.score,
            });
        }
    }

    fn remaining(&self) -> usize {
        self.n_trials.saturating_sub(self.trials_suggested)
    }
}

#[cfg(test)]
#[path = "tpe_tests.rs"]
mod tests;
