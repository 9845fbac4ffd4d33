//! Training losses.

use crate::error::{CharCnnError, Result};
use crate::nn::Tensor;

/// Cross-entropy between one-hot (or soft) targets and predicted
/// probabilities, averaged over the batch.
///
/// Probabilities are clipped to `[epsilon, 1 - epsilon]` before the log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoricalCrossentropy {
    epsilon: f32,
}

impl Default for CategoricalCrossentropy {
    fn default() -> Self {
        Self { epsilon: 1e-7 }
    }
}

impl CategoricalCrossentropy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check(pred: &Tensor, target: &Tensor) -> Result<()> {
        if pred.shape() != target.shape() || pred.shape().len() != 2 {
            return Err(CharCnnError::DimensionMismatch {
                expected: format!("targets of shape {:?}", pred.shape()),
                actual: format!("{:?}", target.shape()),
            });
        }
        Ok(())
    }

    /// Mean loss over the batch; 0 for an empty batch.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] if the shapes differ.
    pub fn loss(&self, pred: &Tensor, target: &Tensor) -> Result<f32> {
        Self::check(pred, target)?;
        let batch = pred.batch_size();
        if batch == 0 {
            return Ok(0.0);
        }
        let total: f32 = pred
            .data()
            .iter()
            .zip(target.data())
            .filter(|(_, &t)| t != 0.0)
            .map(|(&p, &t)| -t * p.clamp(self.epsilon, 1.0 - self.epsilon).ln())
            .sum();
        Ok(total / batch as f32)
    }

    /// Gradient of [`loss`](Self::loss) with respect to `pred`.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] if the shapes differ.
    pub fn gradient(&self, pred: &Tensor, target: &Tensor) -> Result<Tensor> {
        Self::check(pred, target)?;
        let batch = pred.batch_size().max(1) as f32;
        let data = pred
            .data()
            .iter()
            .zip(target.data())
            .map(|(&p, &t)| -t / p.clamp(self.epsilon, 1.0 - self.epsilon) / batch)
            .collect();
        Ok(Tensor::from_raw(data, pred.shape().to_vec()))
    }
}

/// Fraction of rows whose arg-max prediction matches the arg-max target.
#[must_use]
pub fn categorical_accuracy(pred: &Tensor, target: &Tensor) -> f32 {
    let width = pred.shape().last().copied().unwrap_or(0);
    if width == 0 || pred.batch_size() == 0 {
        return 0.0;
    }
    let hits = pred
        .data()
        .chunks(width)
        .zip(target.data().chunks(width))
        .filter(|(p, t)| argmax(p) == argmax(t))
        .count();
    hits as f32 / pred.batch_size() as f32
}

/// Index of the first maximum.
pub(crate) fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}
