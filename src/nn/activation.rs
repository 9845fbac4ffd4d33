//! Parameter-free activations.

use crate::error::Result;
use crate::nn::layer::{cached, check_grad, Layer};
use crate::nn::Tensor;

/// Rectified linear unit.
#[derive(Debug, Clone, Default)]
pub struct ReLU {
    output: Option<Tensor>,
}

impl ReLU {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for ReLU {
    fn kind(&self) -> &'static str {
        "ReLU"
    }

    fn prefix(&self) -> &'static str {
        "re_lu"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        Ok(input.to_vec())
    }

    fn forward(&mut self, input: &Tensor, _training: bool) -> Result<Tensor> {
        let data = input.data().iter().map(|&v| v.max(0.0)).collect();
        let output = Tensor::from_raw(data, input.shape().to_vec());
        self.output = Some(output.clone());
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let output = cached(&self.output, "re_lu")?;
        check_grad("re_lu", grad_output, output.shape())?;
        let data = grad_output
            .data()
            .iter()
            .zip(output.data())
            .map(|(&g, &y)| if y > 0.0 { g } else { 0.0 })
            .collect();
        Ok(Tensor::from_raw(data, output.shape().to_vec()))
    }
}

/// Softmax over the last axis.
#[derive(Debug, Clone, Default)]
pub struct Softmax {
    output: Option<Tensor>,
}

impl Softmax {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for Softmax {
    fn kind(&self) -> &'static str {
        "Softmax"
    }

    fn prefix(&self) -> &'static str {
        "softmax"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        Ok(input.to_vec())
    }

    fn forward(&mut self, input: &Tensor, _training: bool) -> Result<Tensor> {
        let width = input.shape().last().copied().unwrap_or(0).max(1);
        let mut data = input.data().to_vec();
        for row in data.chunks_mut(width) {
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            row.iter_mut().for_each(|v| *v /= sum);
        }
        let output = Tensor::from_raw(data, input.shape().to_vec());
        self.output = Some(output.clone());
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let output = cached(&self.output, "softmax")?;
        check_grad("softmax", grad_output, output.shape())?;
        let width = output.shape().last().copied().unwrap_or(0).max(1);

        let mut dx = Vec::with_capacity(output.numel());
        for (y, g) in output.data().chunks(width).zip(grad_output.data().chunks(width)) {
            let dot: f32 = y.iter().zip(g).map(|(a, b)| a * b).sum();
            dx.extend(y.iter().zip(g).map(|(yv, gv)| yv * (gv - dot)));
        }
        Ok(Tensor::from_raw(dx, output.shape().to_vec()))
    }
}
