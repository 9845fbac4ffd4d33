//! Weight initialization.
//!
//! - Glorot/Xavier uniform (Glorot & Bengio, 2010) for dense kernels
//! - Normal for convolution kernels
//! - Uniform for embedding tables
//!
//! Every initializer takes an optional seed; `None` draws from entropy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::nn::Tensor;

pub(crate) fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Xavier uniform: U(-a, a) with a = sqrt(6 / (`fan_in` + `fan_out`)).
#[must_use]
pub fn xavier_uniform(shape: &[usize], fan_in: usize, fan_out: usize, seed: Option<u64>) -> Tensor {
    let a = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
    uniform(shape, -a, a, seed)
}

/// Samples from U(low, high).
#[must_use]
pub fn uniform(shape: &[usize], low: f32, high: f32, seed: Option<u64>) -> Tensor {
    let numel: usize = shape.iter().product();
    let mut rng = rng_from(seed);
    let data = (0..numel).map(|_| rng.gen_range(low..high)).collect();
    Tensor::from_raw(data, shape.to_vec())
}

/// Samples from N(mean, std).
#[must_use]
pub fn normal(shape: &[usize], mean: f32, std: f32, seed: Option<u64>) -> Tensor {
    let numel: usize = shape.iter().product();
    let mut rng = rng_from(seed);

    // Box-Muller
    let data = (0..numel)
        .map(|_| {
            let u1: f32 = rng.gen_range(0.0001_f32..1.0_f32);
            let u2: f32 = rng.gen_range(0.0_f32..1.0_f32);
            let z = (-2.0_f32 * u1.ln()).sqrt() * (2.0_f32 * std::f32::consts::PI * u2).cos();
            mean + std * z
        })
        .collect();
    Tensor::from_raw(data, shape.to_vec())
}
