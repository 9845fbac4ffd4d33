//! Inverted dropout.

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::Result;
use crate::nn::init::rng_from;
use crate::nn::layer::{check_grad, Layer};
use crate::nn::Tensor;

/// Zeroes each element with probability `rate` during training and scales
/// survivors by `1 / (1 - rate)`. Identity at inference.
#[derive(Debug, Clone)]
pub struct Dropout {
    rate: f32,
    rng: StdRng,
    mask: Option<Tensor>,
}

impl Dropout {
    /// `rate` is clamped into `[0, 1)`.
    #[must_use]
    pub fn new(rate: f32, seed: Option<u64>) -> Self {
        Self {
            rate: rate.clamp(0.0, 0.999),
            rng: rng_from(seed),
            mask: None,
        }
    }

    #[must_use]
    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl Layer for Dropout {
    fn kind(&self) -> &'static str {
        "Dropout"
    }

    fn prefix(&self) -> &'static str {
        "dropout"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        Ok(input.to_vec())
    }

    fn forward(&mut self, input: &Tensor, training: bool) -> Result<Tensor> {
        if !training || self.rate == 0.0 {
            self.mask = None;
            return Ok(input.clone());
        }
        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let mask: Vec<f32> = (0..input.numel())
            .map(|_| if self.rng.gen::<f32>() < keep { scale } else { 0.0 })
            .collect();
        let data = input.data().iter().zip(&mask).map(|(x, m)| x * m).collect();
        self.mask = Some(Tensor::from_raw(mask, input.shape().to_vec()));
        Ok(Tensor::from_raw(data, input.shape().to_vec()))
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let Some(mask) = &self.mask else {
            return Ok(grad_output.clone());
        };
        check_grad("dropout", grad_output, mask.shape())?;
        let data = grad_output.data().iter().zip(mask.data()).map(|(g, m)| g * m).collect();
        Ok(Tensor::from_raw(data, mask.shape().to_vec()))
    }
}
