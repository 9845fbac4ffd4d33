//! Hyperparameter-aware model builder.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{CharCnnConfig, FitOptions, Model};
use crate::automl::{Execution, Objective, Tuner, TPE};
use crate::classify::OneHot;
use crate::config::QuantizerConfig;
use crate::error::{CharCnnError, Result};
use crate::hyper::{FloatRange, HyperDefaulter, HyperParameters, Sampling, SearchParameters};
use crate::sparse::CsrMatrix;
use crate::text::QuantIndex;

/// Metric the search maximizes.
const SEARCH_OBJECTIVE: &str = "val_accuracy";

/// Trials drawn at random before TPE starts modelling the space.
const STARTUP_TRIALS: usize = 3;

/// Options for [`HyperModel::search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Trial budget.
    pub max_trials: usize,
    /// Build-and-train runs averaged per trial.
    pub executions_per_trial: usize,
    /// Parent of the project directory; nothing is written when unset.
    pub directory: Option<PathBuf>,
    /// Project directory name under `directory`.
    pub project_name: String,
    /// Seed for the search strategy.
    pub seed: Option<u64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_trials: 8,
            executions_per_trial: 2,
            directory: None,
            project_name: "hyper-search".to_string(),
            seed: None,
        }
    }
}

/// Builds the character CNN from a hyperparameter source and holds the
/// most recently built (or best searched) model.
///
/// # Example
///
/// ```
/// use charcnn::hyper::HyperDefaulter;
/// use charcnn::model::{CharCnnConfig, HyperModel};
///
/// let mut hyper = HyperModel::new(60, 69, 4).with_architecture(CharCnnConfig::small());
/// let model = hyper.build(&mut HyperDefaulter)?;
/// assert_eq!(model.learning_rate(), 1.5e-4);
/// assert!(hyper.model().is_some());
/// # Ok::<(), charcnn::CharCnnError>(())
/// ```
#[derive(Debug)]
pub struct HyperModel {
    input_len: usize,
    chars_len: usize,
    class_len: usize,
    architecture: CharCnnConfig,
    quantizer: Option<QuantizerConfig>,
    seed: Option<u64>,
    model: Option<Model>,
}

impl HyperModel {
    /// Builder for `class_len` classes over rows of `input_len` indices
    /// drawn from an alphabet of `chars_len` symbols.
    #[must_use]
    pub fn new(input_len: usize, chars_len: usize, class_len: usize) -> Self {
        Self {
            input_len,
            chars_len,
            class_len,
            architecture: CharCnnConfig::default(),
            quantizer: None,
            seed: None,
            model: None,
        }
    }

    /// Replace the default architecture.
    #[must_use]
    pub fn with_architecture(mut self, architecture: CharCnnConfig) -> Self {
        self.architecture = architecture;
        self
    }

    /// Encoder settings stored with every built model.
    #[must_use]
    pub fn with_quantizer(mut self, quantizer: QuantizerConfig) -> Self {
        self.quantizer = Some(quantizer);
        self
    }

    /// Seed weight initialization.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn input_len(&self) -> usize {
        self.input_len
    }

    #[must_use]
    pub fn chars_len(&self) -> usize {
        self.chars_len
    }

    #[must_use]
    pub fn class_len(&self) -> usize {
        self.class_len
    }

    #[must_use]
    pub fn architecture(&self) -> &CharCnnConfig {
        &self.architecture
    }

    /// Every tunable value of the model, asked of `hp`.
    fn learning_rate<H: HyperParameters + ?Sized>(hp: &mut H) -> f64 {
        hp.float(
            1.5e-4,
            FloatRange::new("learning_rate", 1e-4, 5e-4).sampling(Sampling::Log),
        )
    }

    fn compile<H: HyperParameters + ?Sized>(&self, hp: &mut H, seed: Option<u64>) -> Result<Model> {
        let learning_rate = Self::learning_rate(hp);
        let model = Model::new(
            self.architecture.clone(),
            self.input_len,
            self.chars_len,
            self.class_len,
            learning_rate,
            seed,
        )?;
        Ok(match &self.quantizer {
            Some(quantizer) => model.with_quantizer(quantizer.clone()),
            None => model,
        })
    }

    /// Build a fresh model with values from `hp` and hold it.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::InvalidArchitecture`] when the layer shapes
    /// collapse; the held model is left untouched in that case.
    pub fn build<H: HyperParameters + ?Sized>(&mut self, hp: &mut H) -> Result<&mut Model> {
        let model = self.compile(hp, self.seed)?;
        debug!(
            learning_rate = model.learning_rate(),
            params = model.n_params(),
            "built model"
        );
        Ok(self.model.insert(model))
    }

    /// Bayesian search over the learning rate, keeping the best model.
    ///
    /// Each trial builds a model from the trial's values and trains it with
    /// `fit`. An execution is scored by its best epoch's `val_accuracy` and
    /// keeps that epoch's weights, so `fit` needs a validation split.
    ///
    /// # Errors
    ///
    /// Errors from building, training or writing trial records abort the
    /// search and are returned unchanged. A budget of zero trials returns
    /// [`CharCnnError::NoTrials`].
    pub fn search<T: QuantIndex>(
        &mut self,
        x: &CsrMatrix<T>,
        y: &OneHot,
        options: &SearchOptions,
        fit: &FitOptions,
    ) -> Result<&mut Self> {
        let mut strategy = TPE::new(options.max_trials).with_startup_trials(STARTUP_TRIALS);
        if let Some(seed) = options.seed {
            strategy = strategy.with_seed(seed);
        }
        let objective = Objective::maximize(SEARCH_OBJECTIVE);
        let mut tuner = Tuner::new(strategy, objective.clone())
            .max_trials(options.max_trials)
            .executions_per_trial(options.executions_per_trial)
            .directory(options.directory.clone())
            .project_name(options.project_name.clone());

        let mut declared = SearchParameters::new();
        Self::learning_rate(&mut declared);
        info!("{}", declared.space().summary());

        let mut runs = 0_u64;
        let result = tuner.search(|hp, execution| {
            let seed = self.seed.map(|s| s.wrapping_add(runs));
            runs += 1;
            let mut model = self.compile(hp, seed)?;
            let history = model.fit_best_epoch(x, y, fit, &objective)?;
            debug!(
                execution,
                epochs = history.epochs(),
                best_epoch = history.best_epoch(&objective).map(|e| e + 1),
                "execution trained"
            );
            Ok(Execution {
                metrics: history.best_metrics(&objective),
                model,
            })
        })?;

        info!(
            trials = result.n_trials(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "{}",
            result.summary(tuner.objective(), 10)
        );
        let best = result.best_model.ok_or(CharCnnError::NoTrials)?;
        self.model = Some(best);
        Ok(self)
    }

    /// Build with default hyperparameters and train.
    ///
    /// # Errors
    ///
    /// Returns build errors and [`Model::fit`] errors.
    pub fn fit<T: QuantIndex>(
        &mut self,
        x: &CsrMatrix<T>,
        y: &OneHot,
        summarize: bool,
        options: &FitOptions,
    ) -> Result<&mut Self> {
        let model = self.build(&mut HyperDefaulter)?;
        if summarize {
            info!("\n{}", model.summary());
        }
        model.fit(x, y, options)?;
        Ok(self)
    }

    /// Save the held model into `dir`.
    ///
    /// Class labels are not part of the model; write them with
    /// [`ClassLabels::save`](crate::classify::ClassLabels::save).
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::ModelNotBuilt`] when nothing has been built,
    /// otherwise I/O and serialization errors.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        self.model
            .as_ref()
            .ok_or(CharCnnError::ModelNotBuilt)?
            .save(dir)
    }

    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut Model> {
        self.model.as_mut()
    }

    /// Take the held model out, leaving the slot empty.
    pub fn take_model(&mut self) -> Option<Model> {
        self.model.take()
    }
}

#[cfg(test)]
#[path = "hyper_model_tests.rs"]
mod tests;
