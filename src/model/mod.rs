//! The compiled character CNN and its hyperparameter-aware builder.
//!
//! A [`Model`] bundles the layer stack with categorical cross-entropy,
//! Adam and an accuracy metric. [`HyperModel`] builds models from a
//! [`HyperParameters`](crate::hyper::HyperParameters) source and drives
//! training and search.
//!
//! # Example
//!
//! ```
//! use charcnn::classify::ClassLabels;
//! use charcnn::model::{CharCnnConfig, FitOptions, Model};
//! use charcnn::text::Quantizer;
//! use charcnn::traits::TextTransformer;
//!
//! let quantizer = Quantizer::builder().input_length(40).build();
//! let x = quantizer.transform(&["good", "bad"]);
//! let labels = ClassLabels::new(["neg", "pos"])?;
//! let y = labels.one_hot(&["pos", "neg"])?;
//!
//! let mut model = Model::new(
//!     CharCnnConfig::small(),
//!     40,
//!     quantizer.vocabulary_size(),
//!     labels.len(),
//!     1e-3,
//!     Some(7),
//! )?;
//! let options = FitOptions {
//!     epochs: 2,
//!     verbose: false,
//!     ..FitOptions::default()
//! };
//! let history = model.fit(&x, &y, &options)?;
//! assert_eq!(history.epochs(), 2);
//! # Ok::<(), charcnn::CharCnnError>(())
//! ```

pub mod config;
mod hyper_model;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use config::{CharCnnConfig, ConvBlock};
pub use hyper_model::{HyperModel, SearchOptions};

use crate::automl::Objective;
use crate::classify::OneHot;
use crate::config::QuantizerConfig;
use crate::error::{CharCnnError, Result};
use crate::nn::init::rng_from;
use crate::nn::{categorical_accuracy, Adam, CategoricalCrossentropy, Optimizer, Sequential, Tensor};
use crate::serialization::{save_safetensors, SafeTensors, UserMetadata};
use crate::sparse::CsrMatrix;
use crate::text::QuantIndex;

/// File name of the weights inside a saved model directory.
pub const MODEL_FILE: &str = "model.safetensors";

/// Batch size used by [`Model::evaluate`] and [`Model::predict`].
const INFERENCE_BATCH: usize = 32;

/// Options for [`Model::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Passes over the training rows.
    pub epochs: usize,
    /// Rows per gradient step.
    pub batch_size: usize,
    /// Trailing fraction of rows held out for validation.
    pub validation_split: f64,
    /// Reshuffle the training rows every epoch.
    pub shuffle: bool,
    /// Seed for shuffling the training rows. Dropout masks keep the seed
    /// the model was built with.
    pub seed: Option<u64>,
    /// Log metrics after every epoch.
    pub verbose: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_size: 32,
            validation_split: 0.0,
            shuffle: true,
            seed: None,
            verbose: true,
        }
    }
}

impl FitOptions {
    /// # Errors
    ///
    /// Returns [`CharCnnError::InvalidHyperparameter`] for a zero batch size
    /// or a validation split outside `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CharCnnError::InvalidHyperparameter {
                param: "batch_size".to_string(),
                value: "0".to_string(),
                constraint: "> 0".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(CharCnnError::InvalidHyperparameter {
                param: "validation_split".to_string(),
                value: self.validation_split.to_string(),
                constraint: "in [0, 1)".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-epoch metrics recorded by [`Model::fit`].
///
/// Keys are `loss` and `accuracy`, plus `val_loss` and `val_accuracy`
/// when a validation split is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    metrics: BTreeMap<String, Vec<f64>>,
}

impl History {
    fn record(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    /// Values of `name`, one per epoch.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(Vec::as_slice)
    }

    /// Value of `name` after the last epoch.
    #[must_use]
    pub fn last(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|values| values.last().copied())
    }

    /// Number of completed epochs.
    #[must_use]
    pub fn epochs(&self) -> usize {
        self.metrics.get("loss").map_or(0, Vec::len)
    }

    /// Metric names recorded.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    /// Every metric's last value.
    #[must_use]
    pub fn final_metrics(&self) -> BTreeMap<String, f64> {
        self.metrics
            .iter()
            .filter_map(|(name, values)| values.last().map(|&v| (name.clone(), v)))
            .collect()
    }

    /// Every metric's value after epoch `epoch` (zero-based).
    #[must_use]
    pub fn metrics_at(&self, epoch: usize) -> BTreeMap<String, f64> {
        self.metrics
            .iter()
            .filter_map(|(name, values)| values.get(epoch).map(|&v| (name.clone(), v)))
            .collect()
    }

    /// Zero-based epoch with the best finite value of the objective's
    /// metric; the earliest one wins ties.
    #[must_use]
    pub fn best_epoch(&self, objective: &Objective) -> Option<usize> {
        let values = self.get(&objective.name)?;
        let mut best: Option<(usize, f64)> = None;
        for (epoch, &value) in values.iter().enumerate() {
            if !value.is_finite() {
                continue;
            }
            let score = objective.score(value);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((epoch, score));
            }
        }
        best.map(|(epoch, _)| epoch)
    }

    /// Metrics of the best epoch for `objective`, or the final metrics when
    /// the objective was never recorded.
    #[must_use]
    pub fn best_metrics(&self, objective: &Objective) -> BTreeMap<String, f64> {
        match self.best_epoch(objective) {
            Some(epoch) => self.metrics_at(epoch),
            None => self.final_metrics(),
        }
    }
}

/// Loss and accuracy over a data set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

/// A compiled network ready for training and inference.
#[derive(Debug)]
pub struct Model {
    network: Sequential,
    loss: CategoricalCrossentropy,
    optimizer: Adam,
    config: CharCnnConfig,
    input_len: usize,
    chars_len: usize,
    class_len: usize,
    learning_rate: f64,
    quantizer: Option<QuantizerConfig>,
}

impl Model {
    /// Build and compile a network.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::InvalidArchitecture`] when the configuration
    /// does not fit `input_len`.
    pub fn new(
        config: CharCnnConfig,
        input_len: usize,
        chars_len: usize,
        class_len: usize,
        learning_rate: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        let network = config.build_network(input_len, chars_len, class_len, seed)?;
        debug!(
            input_len,
            chars_len,
            class_len,
            learning_rate,
            params = network.n_params(),
            "compiled model"
        );
        Ok(Self {
            network,
            loss: CategoricalCrossentropy::new(),
            optimizer: Adam::new(learning_rate as f32),
            config,
            input_len,
            chars_len,
            class_len,
            learning_rate,
            quantizer: None,
        })
    }

    /// Record the encoder settings the model is trained with, so that
    /// [`save`](Self::save) persists them alongside the weights.
    #[must_use]
    pub fn with_quantizer(mut self, quantizer: QuantizerConfig) -> Self {
        self.quantizer = Some(quantizer);
        self
    }

    /// Encoder settings, if known.
    #[must_use]
    pub fn quantizer(&self) -> Option<&QuantizerConfig> {
        self.quantizer.as_ref()
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
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    #[must_use]
    pub fn config(&self) -> &CharCnnConfig {
        &self.config
    }

    #[must_use]
    pub fn network(&self) -> &Sequential {
        &self.network
    }

    #[must_use]
    pub fn n_params(&self) -> usize {
        self.network.n_params()
    }

    /// Keras-style layer table.
    #[must_use]
    pub fn summary(&self) -> String {
        self.network.summary("char_cnn")
    }

    fn check_features<T: QuantIndex>(&self, x: &CsrMatrix<T>) -> Result<()> {
        if x.ncols() != self.input_len {
            return Err(CharCnnError::dimension_mismatch(
                "input columns",
                self.input_len,
                x.ncols(),
            ));
        }
        Ok(())
    }

    fn check_targets<T: QuantIndex>(&self, x: &CsrMatrix<T>, y: &OneHot) -> Result<()> {
        self.check_features(x)?;
        if y.n_classes() != self.class_len {
            return Err(CharCnnError::dimension_mismatch(
                "target classes",
                self.class_len,
                y.n_classes(),
            ));
        }
        if y.len() != x.nrows() {
            return Err(CharCnnError::dimension_mismatch("target rows", x.nrows(), y.len()));
        }
        Ok(())
    }

    /// Dense `(rows.len(), input_len)` batch of symbol indices.
    fn batch_input<T: QuantIndex>(&self, x: &CsrMatrix<T>, rows: &[usize]) -> Tensor {
        let width = self.input_len;
        let mut data = vec![0.0; rows.len() * width];
        for (r, &row) in rows.iter().enumerate() {
            let (cols, values) = x.row_entries(row);
            for (&col, &value) in cols.iter().zip(values) {
                data[r * width + col] = value.to_index() as f32;
            }
        }
        Tensor::from_raw(data, vec![rows.len(), width])
    }

    /// Train on `x` against `y`.
    ///
    /// The last `validation_split` fraction of rows is held out and scored
    /// after every epoch.
    ///
    /// # Errors
    ///
    /// - [`CharCnnError::DimensionMismatch`] for inputs that do not match
    ///   the model, or an empty data set;
    /// - [`CharCnnError::InvalidHyperparameter`] for bad options, or a split
    ///   that leaves no training rows;
    /// - [`CharCnnError::ConvergenceFailure`] when the loss stops being
    ///   finite.
    pub fn fit<T: QuantIndex>(
        &mut self,
        x: &CsrMatrix<T>,
        y: &OneHot,
        options: &FitOptions,
    ) -> Result<History> {
        self.train(x, y, options, None)
    }

    /// Train like [`fit`](Self::fit), then roll the weights back to the
    /// epoch with the best value of `monitor`.
    ///
    /// The weights stay at the final epoch when `monitor` is never
    /// recorded, e.g. a validation metric without a validation split.
    ///
    /// # Errors
    ///
    /// As [`fit`](Self::fit).
    pub fn fit_best_epoch<T: QuantIndex>(
        &mut self,
        x: &CsrMatrix<T>,
        y: &OneHot,
        options: &FitOptions,
        monitor: &Objective,
    ) -> Result<History> {
        self.train(x, y, options, Some(monitor))
    }

    fn snapshot(&self) -> BTreeMap<String, Tensor> {
        self.network
            .named_params()
            .into_iter()
            .map(|(name, param)| (name, param.value.clone()))
            .collect()
    }

    fn train<T: QuantIndex>(
        &mut self,
        x: &CsrMatrix<T>,
        y: &OneHot,
        options: &FitOptions,
        monitor: Option<&Objective>,
    ) -> Result<History> {
        options.validate()?;
        self.check_targets(x, y)?;
        let n = x.nrows();
        if n == 0 {
            return Err(CharCnnError::dimension_mismatch("rows >=", 1, 0));
        }
        let n_train = (n as f64 * (1.0 - options.validation_split)).floor() as usize;
        if n_train == 0 {
            return Err(CharCnnError::InvalidHyperparameter {
                param: "validation_split".to_string(),
                value: options.validation_split.to_string(),
                constraint: format!("to leave at least one of {n} rows for training"),
            });
        }
        let validation: Vec<usize> = (n_train..n).collect();
        let mut order: Vec<usize> = (0..n_train).collect();
        let mut rng = rng_from(options.seed);
        let mut history = History::default();
        let mut best: Option<(usize, BTreeMap<String, Tensor>)> = None;

        for epoch in 1..=options.epochs {
            if options.shuffle {
                order.shuffle(&mut rng);
            }
            let mut loss_sum = 0.0;
            let mut hits = 0.0;
            for batch in order.chunks(options.batch_size) {
                let inputs = self.batch_input(x, batch);
                let targets = y.batch(batch);

                self.network.zero_grad();
                let pred = self.network.forward(&inputs, true)?;
                let loss = self.loss.loss(&pred, &targets)?;
                if !loss.is_finite() {
                    return Err(CharCnnError::ConvergenceFailure {
                        iterations: self.optimizer.iterations(),
                        final_loss: f64::from(loss),
                    });
                }
                let grad = self.loss.gradient(&pred, &targets)?;
                self.network.backward(&grad)?;
                self.optimizer.step(&mut self.network.params_mut());

                let rows = batch.len() as f64;
                loss_sum += f64::from(loss) * rows;
                hits += f64::from(categorical_accuracy(&pred, &targets)) * rows;
            }
            let loss = loss_sum / n_train as f64;
            let accuracy = hits / n_train as f64;
            history.record("loss", loss);
            history.record("accuracy", accuracy);

            if validation.is_empty() {
                if options.verbose {
                    info!(epoch, epochs = options.epochs, loss, accuracy, "epoch complete");
                }
            } else {
                let val = self.score_rows(x, y, &validation)?;
                history.record("val_loss", val.loss);
                history.record("val_accuracy", val.accuracy);
                if options.verbose {
                    info!(
                        epoch,
                        epochs = options.epochs,
                        loss,
                        accuracy,
                        val_loss = val.loss,
                        val_accuracy = val.accuracy,
                        "epoch complete"
                    );
                }
            }

            if let Some(monitor) = monitor {
                if history.best_epoch(monitor) == Some(epoch - 1) {
                    best = Some((epoch - 1, self.snapshot()));
                }
            }
        }

        if let Some((epoch, weights)) = best {
            if epoch + 1 < history.epochs() {
                for (name, value) in weights {
                    self.network.set_param(&name, value)?;
                }
                debug!(epoch = epoch + 1, "restored best epoch weights");
            }
        }
        Ok(history)
    }

    fn score_rows<T: QuantIndex>(
        &mut self,
        x: &CsrMatrix<T>,
        y: &OneHot,
        rows: &[usize],
    ) -> Result<Evaluation> {
        if rows.is_empty() {
            return Ok(Evaluation {
                loss: 0.0,
                accuracy: 0.0,
            });
        }
        let mut loss_sum = 0.0;
        let mut hits = 0.0;
        for batch in rows.chunks(INFERENCE_BATCH) {
            let inputs = self.batch_input(x, batch);
            let targets = y.batch(batch);
            let pred = self.network.forward(&inputs, false)?;
            let size = batch.len() as f64;
            loss_sum += f64::from(self.loss.loss(&pred, &targets)?) * size;
            hits += f64::from(categorical_accuracy(&pred, &targets)) * size;
        }
        let n = rows.len() as f64;
        Ok(Evaluation {
            loss: loss_sum / n,
            accuracy: hits / n,
        })
    }

    /// Loss and accuracy on `x` against `y` in inference mode.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] for inputs that do not
    /// match the model.
    pub fn evaluate<T: QuantIndex>(&mut self, x: &CsrMatrix<T>, y: &OneHot) -> Result<Evaluation> {
        self.check_targets(x, y)?;
        let rows: Vec<usize> = (0..x.nrows()).collect();
        self.score_rows(x, y, &rows)
    }

    /// Class probabilities for every row of `x`.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] if the row width is not
    /// the model's input length, or an index is outside the embedding.
    pub fn predict<T: QuantIndex>(&mut self, x: &CsrMatrix<T>) -> Result<Vec<Vec<f32>>> {
        self.check_features(x)?;
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let mut out = Vec::with_capacity(rows.len());
        for batch in rows.chunks(INFERENCE_BATCH) {
            let inputs = self.batch_input(x, batch);
            let pred = self.network.forward(&inputs, false)?;
            out.extend(pred.data().chunks(self.class_len).map(<[f32]>::to_vec));
        }
        Ok(out)
    }

    /// Write weights and architecture to `dir/model.safetensors`.
    ///
    /// # Errors
    ///
    /// Returns I/O or serialization errors.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let tensors: BTreeMap<String, (Vec<f32>, Vec<usize>)> = self
            .network
            .named_params()
            .into_iter()
            .map(|(name, param)| {
                (name, (param.value.data().to_vec(), param.value.shape().to_vec()))
            })
            .collect();
        let mut metadata = UserMetadata::from([
            ("input_len".to_string(), self.input_len.to_string()),
            ("chars_len".to_string(), self.chars_len.to_string()),
            ("class_len".to_string(), self.class_len.to_string()),
            ("architecture".to_string(), serde_json::to_string(&self.config)?),
            ("learning_rate".to_string(), self.learning_rate.to_string()),
        ]);
        if let Some(quantizer) = &self.quantizer {
            metadata.insert("quantizer".to_string(), serde_json::to_string(quantizer)?);
        }

        let path = dir.join(MODEL_FILE);
        save_safetensors(&path, &tensors, &metadata)?;
        debug!(path = %path.display(), tensors = tensors.len(), "saved model");
        Ok(())
    }

    /// Read a model written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::FormatError`] when the file is unreadable,
    /// metadata is missing, or the tensors do not match the architecture.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(MODEL_FILE);
        let file = SafeTensors::read(&path)?;
        let format_error = |message: String| CharCnnError::FormatError {
            path: path.clone(),
            message,
        };

        let meta = file.user_metadata();
        let input_len = parse_metadata::<usize>(meta, "input_len").map_err(format_error)?;
        let chars_len = parse_metadata::<usize>(meta, "chars_len").map_err(format_error)?;
        let class_len = parse_metadata::<usize>(meta, "class_len").map_err(format_error)?;
        let learning_rate = parse_metadata::<f64>(meta, "learning_rate").map_err(format_error)?;
        let architecture = metadata_field(meta, "architecture").map_err(format_error)?;
        let config: CharCnnConfig = serde_json::from_str(architecture)
            .map_err(|e| format_error(format!("metadata 'architecture': {e}")))?;

        let quantizer = meta
            .get("quantizer")
            .map(|raw| serde_json::from_str::<QuantizerConfig>(raw))
            .transpose()
            .map_err(|e| format_error(format!("metadata 'quantizer': {e}")))?;

        let mut model = Self::new(config, input_len, chars_len, class_len, learning_rate, None)?;
        model.quantizer = quantizer;
        let names: Vec<String> = model.network.named_params().into_keys().collect();
        if names.len() != file.len() {
            return Err(format_error(format!(
                "expected {} tensors, found {}",
                names.len(),
                file.len()
            )));
        }
        for name in &names {
            let tensor = file.tensor(name)?;
            model
                .network
                .set_param(name, tensor)
                .map_err(|e| format_error(e.to_string()))?;
        }
        debug!(path = %path.display(), "loaded model");
        Ok(model)
    }
}

fn metadata_field<'a>(meta: &'a UserMetadata, key: &str) -> std::result::Result<&'a str, String> {
    meta.get(key)
        .map(String::as_str)
        .ok_or_else(|| format!("missing metadata '{key}'"))
}

fn parse_metadata<V>(meta: &UserMetadata, key: &str) -> std::result::Result<V, String>
where
    V: std::str::FromStr,
    V::Err: std::fmt::Display,
{
    metadata_field(meta, key)?
        .parse()
        .map_err(|e| format!("metadata '{key}': {e}"))
}

#[cfg(test)]
mod tests;
