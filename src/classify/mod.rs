//! Inference over a saved model.
//!
//! A [`Classifier`] pairs a trained [`Model`] with its [`ClassLabels`] and
//! turns raw strings into ranked class lists. Every prediction carries
//! [`PredictionStats`] measured against the model's answer for the empty
//! string, which serves as the uninformed reference distribution.

pub mod labels;
pub mod stats;

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use labels::{ClassLabels, OneHot, CLASSES_FILE};
pub use stats::{censor, PredictionStats};

use crate::error::{CharCnnError, Result};
use crate::model::Model;
use crate::text::Quantizer;
use crate::traits::TextTransformer;

/// One class in a ranked prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedClass {
    /// Class identifier.
    pub id: String,
    /// Predicted probability.
    pub association: f32,
    /// Position in the ranking, starting at 1.
    pub rank: usize,
}

/// Ranked classes for one input document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Classes by descending probability.
    pub classes: Vec<RankedClass>,
    /// Statistics of the full distribution against the reference.
    pub stats: PredictionStats,
    /// Time from the start of the batch until this prediction was ready.
    pub took: Duration,
}

impl Prediction {
    /// The top-ranked class.
    #[must_use]
    pub fn best(&self) -> Option<&RankedClass> {
        self.classes.first()
    }
}

/// A loaded model with labels, ready to classify text.
#[derive(Debug)]
pub struct Classifier {
    model: Model,
    labels: ClassLabels,
    quantizer: Quantizer,
    reference: Vec<f32>,
}

impl Classifier {
    /// Pair a model with its labels and encoder.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] when the label count,
    /// window width or alphabet size disagree with the model.
    pub fn new(model: Model, labels: ClassLabels, quantizer: Quantizer) -> Result<Self> {
        if labels.len() != model.class_len() {
            return Err(CharCnnError::dimension_mismatch(
                "class labels",
                model.class_len(),
                labels.len(),
            ));
        }
        if quantizer.input_length() != model.input_len() {
            return Err(CharCnnError::dimension_mismatch(
                "input length",
                model.input_len(),
                quantizer.input_length(),
            ));
        }
        if quantizer.vocabulary_size() != model.chars_len() {
            return Err(CharCnnError::dimension_mismatch(
                "alphabet size",
                model.chars_len(),
                quantizer.vocabulary_size(),
            ));
        }

        let mut classifier = Self {
            model,
            labels,
            quantizer,
            reference: Vec::new(),
        };
        let mut empty = classifier.probabilities(&[""])?;
        classifier.reference = empty.pop().unwrap_or_default();
        Ok(classifier)
    }

    /// Load `model.safetensors` and `classes.json` from `dir`.
    ///
    /// Input is encoded with the settings stored in the model file, or with
    /// the default encoder over the model's input width when none are
    /// stored.
    ///
    /// # Errors
    ///
    /// Returns I/O and format errors from either file, and
    /// [`CharCnnError::DimensionMismatch`] as [`new`](Self::new) does.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let model = Model::load(dir)?;
        let labels = ClassLabels::load(dir)?;
        let quantizer = match model.quantizer() {
            Some(settings) => settings.build(),
            None => Quantizer::builder().input_length(model.input_len()).build(),
        };
        debug!(path = %dir.display(), classes = labels.len(), "loaded classifier");
        Self::new(model, labels, quantizer)
    }

    #[must_use]
    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    #[must_use]
    pub fn quantizer(&self) -> &Quantizer {
        &self.quantizer
    }

    /// Prediction for the empty string.
    #[must_use]
    pub fn reference(&self) -> &[f32] {
        &self.reference
    }

    fn probabilities<S: AsRef<str> + Sync>(&mut self, documents: &[S]) -> Result<Vec<Vec<f32>>> {
        let encoded = self.quantizer.transform(documents);
        self.model.predict(&encoded)
    }

    /// Classify each document.
    ///
    /// Classes are ordered by descending probability, ties keeping label
    /// order, and cut to the first `limit` when `0 < limit < n`.
    ///
    /// # Errors
    ///
    /// Propagates model errors.
    pub fn predict<S: AsRef<str> + Sync>(
        &mut self,
        documents: &[S],
        limit: usize,
    ) -> Result<Vec<Prediction>> {
        let start = Instant::now();
        let probabilities = self.probabilities(documents)?;

        let predictions = probabilities
            .iter()
            .map(|p| {
                let mut order: Vec<usize> = (0..p.len()).collect();
                order.sort_by(|&a, &b| p[b].total_cmp(&p[a]));
                if limit > 0 && limit < order.len() {
                    order.truncate(limit);
                }
                let classes = order
                    .into_iter()
                    .enumerate()
                    .map(|(k, j)| RankedClass {
                        id: self.labels.get(j).unwrap_or_default().to_string(),
                        association: p[j],
                        rank: k + 1,
                    })
                    .collect();
                Prediction {
                    classes,
                    stats: PredictionStats::compute(p, &self.reference),
                    took: start.elapsed(),
                }
            })
            .collect();
        Ok(predictions)
    }
}
