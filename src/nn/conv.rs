//! One-dimensional convolution and pooling over channels-last sequences.
//!
//! Inputs are `(batch, length, channels)`. Convolution uses valid padding
//! and stride 1; pooling uses non-overlapping windows and drops a ragged
//! tail. Batch samples are processed in parallel.
//!
//! # References
//!
//! - Zhang, X., Zhao, J., & `LeCun`, Y. (2015). Character-level
//!   convolutional networks for text classification. `NeurIPS`.

use rayon::prelude::*;

use crate::error::{CharCnnError, Result};
use crate::nn::init::normal;
use crate::nn::layer::{cached, check_grad, Layer, Param};
use crate::nn::Tensor;

/// 1D convolution with a `(kernel_size, in_channels, filters)` kernel.
#[derive(Debug, Clone)]
pub struct Conv1d {
    in_channels: usize,
    filters: usize,
    kernel_size: usize,
    kernel: Param,
    bias: Param,
    input: Option<Tensor>,
}

impl Conv1d {
    /// Kernel drawn from N(0, `init_std`), zero bias.
    #[must_use]
    pub fn new(
        in_channels: usize,
        filters: usize,
        kernel_size: usize,
        init_std: f32,
        seed: Option<u64>,
    ) -> Self {
        let kernel = normal(&[kernel_size, in_channels, filters], 0.0, init_std, seed);
        Self {
            in_channels,
            filters,
            kernel_size,
            kernel: Param::new("kernel", kernel),
            bias: Param::new("bias", Tensor::zeros(&[filters])),
            input: None,
        }
    }

    #[must_use]
    pub fn filters(&self) -> usize {
        self.filters
    }

    #[must_use]
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    fn out_len(&self, length: usize) -> Option<usize> {
        (length >= self.kernel_size && self.kernel_size > 0).then(|| length - self.kernel_size + 1)
    }
}

impl Layer for Conv1d {
    fn kind(&self) -> &'static str {
        "Conv1D"
    }

    fn prefix(&self) -> &'static str {
        "conv1d"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        let [length, channels] = input else {
            return Err(CharCnnError::invalid_architecture(
                self.prefix(),
                format!("expects (length, channels) input, got {input:?}"),
            ));
        };
        if *channels != self.in_channels {
            return Err(CharCnnError::invalid_architecture(
                self.prefix(),
                format!("expects {} channels, got {channels}", self.in_channels),
            ));
        }
        let out = self.out_len(*length).ok_or_else(|| {
            CharCnnError::invalid_architecture(
                self.prefix(),
                format!("kernel {} exceeds sequence length {length}", self.kernel_size),
            )
        })?;
        Ok(vec![out, self.filters])
    }

    fn forward(&mut self, input: &Tensor, _training: bool) -> Result<Tensor> {
        let length = input.shape().get(1).copied().unwrap_or(0);
        let out_shape = self.output_shape(&[length, self.in_channels]).map_err(|_| {
            CharCnnError::DimensionMismatch {
                expected: format!(
                    "conv1d input (batch, >= {}, {})",
                    self.kernel_size, self.in_channels
                ),
                actual: format!("{:?}", input.shape()),
            }
        })?;
        input.expect_sample_shape("conv1d", &[length, self.in_channels])?;

        let (cin, cout, k) = (self.in_channels, self.filters, self.kernel_size);
        let out_len = out_shape[0];
        let kernel = self.kernel.value.data();
        let bias = self.bias.value.data();
        let mut out = vec![0.0; input.batch_size() * out_len * cout];

        out.par_chunks_mut((out_len * cout).max(1))
            .zip(input.data().par_chunks((length * cin).max(1)))
            .for_each(|(y, x)| {
                for t in 0..out_len {
                    let row = &mut y[t * cout..(t + 1) * cout];
                    row.copy_from_slice(bias);
                    for dk in 0..k {
                        let xs = &x[(t + dk) * cin..(t + dk + 1) * cin];
                        for (ci, &xv) in xs.iter().enumerate() {
                            if xv == 0.0 {
                                continue;
                            }
                            let w = &kernel[(dk * cin + ci) * cout..(dk * cin + ci + 1) * cout];
                            for (acc, &wv) in row.iter_mut().zip(w) {
                                *acc += xv * wv;
                            }
                        }
                    }
                }
            });

        self.input = Some(input.clone());
        Ok(Tensor::from_raw(out, vec![input.batch_size(), out_len, cout]))
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let input = cached(&self.input, "conv1d")?;
        let (batch, length) = (input.batch_size(), input.shape()[1]);
        let (cin, cout, k) = (self.in_channels, self.filters, self.kernel_size);
        let out_len = length + 1 - k;
        check_grad("conv1d", grad_output, &[batch, out_len, cout])?;

        let kernel = self.kernel.value.data();
        let x_chunk = (length * cin).max(1);
        let g_chunk = (out_len * cout).max(1);

        // kernel and bias gradients: per-thread partial sums, then reduced
        let (dk_sum, db_sum) = input
            .data()
            .par_chunks(x_chunk)
            .zip(grad_output.data().par_chunks(g_chunk))
            .fold(
                || (vec![0.0_f32; k * cin * cout], vec![0.0_f32; cout]),
                |(mut dk, mut db), (x, g)| {
                    for t in 0..out_len {
                        let gs = &g[t * cout..(t + 1) * cout];
                        for (acc, &gv) in db.iter_mut().zip(gs) {
                            *acc += gv;
                        }
                        for d in 0..k {
                            let xs = &x[(t + d) * cin..(t + d + 1) * cin];
                            for (ci, &xv) in xs.iter().enumerate() {
                                if xv == 0.0 {
                                    continue;
                                }
                                let off = (d * cin + ci) * cout;
                                for (acc, &gv) in dk[off..off + cout].iter_mut().zip(gs) {
                                    *acc += xv * gv;
                                }
                            }
                        }
                    }
                    (dk, db)
                },
            )
            .reduce(
                || (vec![0.0_f32; k * cin * cout], vec![0.0_f32; cout]),
                |(mut a, mut ab), (b, bb)| {
                    a.iter_mut().zip(&b).for_each(|(x, y)| *x += y);
                    ab.iter_mut().zip(&bb).for_each(|(x, y)| *x += y);
                    (a, ab)
                },
            );

        let mut dx = vec![0.0; input.numel()];
        dx.par_chunks_mut(x_chunk)
            .zip(grad_output.data().par_chunks(g_chunk))
            .for_each(|(dxs, g)| {
                for t in 0..out_len {
                    let gs = &g[t * cout..(t + 1) * cout];
                    for d in 0..k {
                        for ci in 0..cin {
                            let w = &kernel[(d * cin + ci) * cout..(d * cin + ci + 1) * cout];
                            dxs[(t + d) * cin + ci] +=
                                w.iter().zip(gs).map(|(wv, gv)| wv * gv).sum::<f32>();
                        }
                    }
                }
            });

        for (acc, v) in self.kernel.grad.data_mut().iter_mut().zip(dk_sum) {
            *acc += v;
        }
        for (acc, v) in self.bias.grad.data_mut().iter_mut().zip(db_sum) {
            *acc += v;
        }
        Ok(Tensor::from_raw(dx, input.shape().to_vec()))
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.kernel, &self.bias]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.kernel, &mut self.bias]
    }
}

/// Max pooling with window and stride `pool_size`.
#[derive(Debug, Clone)]
pub struct MaxPool1d {
    pool_size: usize,
    input_shape: Vec<usize>,
    argmax: Vec<usize>,
}

impl MaxPool1d {
    #[must_use]
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            input_shape: Vec::new(),
            argmax: Vec::new(),
        }
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl Layer for MaxPool1d {
    fn kind(&self) -> &'static str {
        "MaxPooling1D"
    }

    fn prefix(&self) -> &'static str {
        "max_pooling1d"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        let [length, channels] = input else {
            return Err(CharCnnError::invalid_architecture(
                self.prefix(),
                format!("expects (length, channels) input, got {input:?}"),
            ));
        };
        if self.pool_size == 0 || *length < self.pool_size {
            return Err(CharCnnError::invalid_architecture(
                self.prefix(),
                format!("pool {} exceeds sequence length {length}", self.pool_size),
            ));
        }
        Ok(vec![length / self.pool_size, *channels])
    }

    fn forward(&mut self, input: &Tensor, _training: bool) -> Result<Tensor> {
        let [batch, length, channels] = *input.shape() else {
            return Err(CharCnnError::DimensionMismatch {
                expected: "max_pooling1d input (batch, length, channels)".to_string(),
                actual: format!("{:?}", input.shape()),
            });
        };
        let out_len = self
            .output_shape(&[length, channels])
            .map_err(|e| CharCnnError::DimensionMismatch {
                expected: format!("length >= {}", self.pool_size),
                actual: e.to_string(),
            })?[0];

        let p = self.pool_size;
        let x = input.data();
        let mut out = Vec::with_capacity(batch * out_len * channels);
        let mut argmax = Vec::with_capacity(batch * out_len * channels);
        for n in 0..batch {
            for t in 0..out_len {
                for c in 0..channels {
                    let mut best = (n * length + t * p) * channels + c;
                    for w in 1..p {
                        let idx = (n * length + t * p + w) * channels + c;
                        if x[idx] > x[best] {
                            best = idx;
                        }
                    }
                    out.push(x[best]);
                    argmax.push(best);
                }
            }
        }

        self.input_shape = input.shape().to_vec();
        self.argmax = argmax;
        Ok(Tensor::from_raw(out, vec![batch, out_len, channels]))
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        if grad_output.numel() != self.argmax.len() || self.input_shape.is_empty() {
            return Err(CharCnnError::DimensionMismatch {
                expected: format!("{} pooled gradients", self.argmax.len()),
                actual: format!("{:?}", grad_output.shape()),
            });
        }
        let mut dx = Tensor::zeros(&self.input_shape);
        let data = dx.data_mut();
        for (&idx, &g) in self.argmax.iter().zip(grad_output.data()) {
            data[idx] += g;
        }
        Ok(dx)
    }
}

/// Collapses `(batch, ...)` to `(batch, features)`.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    input_shape: Vec<usize>,
}

impl Flatten {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for Flatten {
    fn kind(&self) -> &'static str {
        "Flatten"
    }

    fn prefix(&self) -> &'static str {
        "flatten"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        Ok(vec![input.iter().product()])
    }

    fn forward(&mut self, input: &Tensor, _training: bool) -> Result<Tensor> {
        self.input_shape = input.shape().to_vec();
        let batch = input.batch_size();
        let features = if batch == 0 { 0 } else { input.numel() / batch };
        input.clone().reshape(&[batch, features])
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        grad_output.clone().reshape(&self.input_shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: &[usize]) -> Tensor {
        let n: usize = shape.iter().product();
        Tensor::new((0..n).map(|v| v as f32 * 0.1).collect(), shape).unwrap()
    }

    #[test]
    fn test_conv_output_shape() {
        let conv = Conv1d::new(64, 1024, 7, 0.02, Some(0));
        assert_eq!(conv.output_shape(&[250, 64]).unwrap(), vec![244, 1024]);
        assert!(matches!(
            conv.output_shape(&[6, 64]),
            Err(CharCnnError::InvalidArchitecture { .. })
        ));
        assert!(conv.output_shape(&[250, 32]).is_err());
    }

    #[test]
    fn test_conv_matches_direct_sum() {
        let mut conv = Conv1d::new(2, 3, 2, 0.5, Some(9));
        conv.bias.value = Tensor::new(vec![0.1, -0.2, 0.3], &[3]).unwrap();
        let x = ramp(&[2, 4, 2]);
        let y = conv.forward(&x, false).unwrap();
        assert_eq!(y.shape(), &[2, 3, 3]);

        let w = conv.kernel.value.data();
        let b = conv.bias.value.data();
        for n in 0..2 {
            for t in 0..3 {
                for co in 0..3 {
                    let mut expected = b[co];
                    for d in 0..2 {
                        for ci in 0..2 {
                            expected += x.data()[(n * 4 + t + d) * 2 + ci] * w[(d * 2 + ci) * 3 + co];
                        }
                    }
                    let got = y.data()[(n * 3 + t) * 3 + co];
                    assert!((got - expected).abs() < 1e-5, "{got} vs {expected}");
                }
            }
        }
    }

    #[test]
    fn test_conv_rejects_wrong_channels() {
        let mut conv = Conv1d::new(2, 3, 2, 0.02, Some(1));
        let x = ramp(&[1, 4, 3]);
        assert!(matches!(
            conv.forward(&x, false),
            Err(CharCnnError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_conv_bias_gradient_sums_output_gradient() {
        let mut conv = Conv1d::new(1, 2, 2, 0.02, Some(1));
        conv.forward(&ramp(&[3, 5, 1]), true).unwrap();
        conv.backward(&Tensor::full(&[3, 4, 2], 1.0)).unwrap();
        assert_eq!(conv.bias.grad.data(), &[12.0, 12.0]);
    }

    #[test]
    fn test_maxpool_forward_and_routing() {
        let mut pool = MaxPool1d::new(3);
        let x = Tensor::new(vec![1.0, 5.0, 2.0, 0.0, -1.0, 7.0, 9.0], &[1, 7, 1]).unwrap();
        let y = pool.forward(&x, false).unwrap();
        // ragged tail dropped
        assert_eq!(y.shape(), &[1, 2, 1]);
        assert_eq!(y.data(), &[5.0, 7.0]);

        let dx = pool.backward(&Tensor::new(vec![1.0, 2.0], &[1, 2, 1]).unwrap()).unwrap();
        assert_eq!(dx.data(), &[0.0, 1.0, 0.0, 0.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_maxpool_shape_errors() {
        let pool = MaxPool1d::new(3);
        assert_eq!(pool.output_shape(&[244, 8]).unwrap(), vec![81, 8]);
        assert!(pool.output_shape(&[2, 8]).is_err());
    }

    #[test]
    fn test_flatten_roundtrip() {
        let mut flat = Flatten::new();
        let x = ramp(&[2, 3, 4]);
        let y = flat.forward(&x, false).unwrap();
        assert_eq!(y.shape(), &[2, 12]);
        let dx = flat.backward(&y).unwrap();
        assert_eq!(dx, x);
    }
}
