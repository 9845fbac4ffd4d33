//! Dense row-major `f32` tensor.
//!
//! Activations flow through the network channels-last: a batch of
//! sequences is `(batch, length, channels)`, a batch of vectors is
//! `(batch, features)`.

use crate::error::{CharCnnError, Result};

/// Dense row-major tensor of `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl Tensor {
    /// Tensor from data and shape.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] if `data.len()` is not the
    /// product of `shape`.
    pub fn new(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(CharCnnError::DimensionMismatch {
                expected: format!("{numel} elements for shape {shape:?}"),
                actual: format!("{} elements", data.len()),
            });
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    /// Shape already checked by the caller.
    pub(crate) fn from_raw(data: Vec<f32>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        Self { data, shape }
    }

    /// All-zero tensor.
    #[must_use]
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// Tensor filled with `value`.
    #[must_use]
    pub fn full(shape: &[usize], value: f32) -> Self {
        let numel = shape.iter().product();
        Self {
            data: vec![value; numel],
            shape: shape.to_vec(),
        }
    }

    /// Flat data.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable flat data.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consume into flat data.
    #[must_use]
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Size of the leading (batch) axis.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Same data under a new shape.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] if the element counts differ.
    pub fn reshape(self, shape: &[usize]) -> Result<Self> {
        Self::new(self.data, shape)
    }

    /// Set every element to zero.
    pub fn fill_zero(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Whether every element is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Check that the shape after the batch axis equals `expected`.
    pub(crate) fn expect_sample_shape(&self, layer: &str, expected: &[usize]) -> Result<()> {
        if self.shape.len() != expected.len() + 1 || self.shape[1..] != *expected {
            return Err(CharCnnError::DimensionMismatch {
                expected: format!("{layer} input (batch, {})", join(expected)),
                actual: format!("{:?}", self.shape),
            });
        }
        Ok(())
    }
}

fn join(dims: &[usize]) -> String {
    dims.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
