//! The layer interface.

use std::fmt;

use crate::error::Result;
use crate::nn::Tensor;

/// A trainable tensor and its accumulated gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Weight name within its layer, e.g. `kernel`.
    pub name: &'static str,
    /// Current value.
    pub value: Tensor,
    /// Gradient accumulated by the last backward pass.
    pub grad: Tensor,
}

impl Param {
    /// Parameter with a zero gradient of matching shape.
    #[must_use]
    pub fn new(name: &'static str, value: Tensor) -> Self {
        let grad = Tensor::zeros(value.shape());
        Self { name, value, grad }
    }

    /// Number of scalar weights.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.value.numel()
    }

    /// Reset the gradient.
    pub fn zero_grad(&mut self) {
        self.grad.fill_zero();
    }
}

/// A network layer with an explicit backward pass.
///
/// `forward` caches whatever `backward` needs; `backward` must follow the
/// `forward` call whose output it differentiates. Gradients are
/// accumulated into the layer's [`Param`]s and the gradient with respect
/// to the input is returned. Shapes exclude the batch axis.
pub trait Layer: fmt::Debug + Send {
    /// Display type, e.g. `Conv1D`.
    fn kind(&self) -> &'static str;

    /// Prefix for generated instance names, e.g. `conv1d`.
    fn prefix(&self) -> &'static str;

    /// Per-sample output shape for a per-sample input shape.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CharCnnError::InvalidArchitecture`] when the layer
    /// cannot accept `input`.
    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>>;

    /// Forward pass. `training` enables stochastic behavior such as dropout.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CharCnnError::DimensionMismatch`] on a shape mismatch.
    fn forward(&mut self, input: &Tensor, training: bool) -> Result<Tensor>;

    /// Backward pass.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CharCnnError::DimensionMismatch`] if `grad_output`
    /// does not match the cached forward output.
    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor>;

    fn params(&self) -> Vec<&Param> {
        Vec::new()
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        Vec::new()
    }

    /// Total trainable weights.
    fn n_params(&self) -> usize {
        self.params().iter().map(|p| p.numel()).sum()
    }
}

/// Forward-pass cache accessor shared by the layers.
pub(crate) fn cached<'a>(cache: &'a Option<Tensor>, layer: &str) -> Result<&'a Tensor> {
    cache.as_ref().ok_or_else(|| crate::CharCnnError::DimensionMismatch {
        expected: format!("{layer} forward before backward"),
        actual: "no cached activation".to_string(),
    })
}

/// Check a gradient against the shape of the activation it differentiates.
pub(crate) fn check_grad(layer: &str, grad: &Tensor, shape: &[usize]) -> Result<()> {
    if grad.shape() != shape {
        return Err(crate::CharCnnError::DimensionMismatch {
            expected: format!("{layer} gradient of shape {shape:?}"),
            actual: format!("{:?}", grad.shape()),
        });
    }
    Ok(())
}
