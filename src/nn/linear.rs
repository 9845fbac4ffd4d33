//! Fully connected layer.

use rayon::prelude::*;

use crate::error::{CharCnnError, Result};
use crate::nn::init::xavier_uniform;
use crate::nn::layer::{cached, check_grad, Layer, Param};
use crate::nn::Tensor;

/// `y = act(x W + b)` with `W` of shape `(in_features, units)`.
///
/// The activation is either identity or ReLU.
#[derive(Debug, Clone)]
pub struct Dense {
    in_features: usize,
    units: usize,
    relu: bool,
    kernel: Param,
    bias: Param,
    input: Option<Tensor>,
    output: Option<Tensor>,
}

impl Dense {
    /// Glorot-uniform kernel, zero bias, no activation.
    #[must_use]
    pub fn new(in_features: usize, units: usize, seed: Option<u64>) -> Self {
        Self {
            in_features,
            units,
            relu: false,
            kernel: Param::new(
                "kernel",
                xavier_uniform(&[in_features, units], in_features, units, seed),
            ),
            bias: Param::new("bias", Tensor::zeros(&[units])),
            input: None,
            output: None,
        }
    }

    /// Apply ReLU to the output.
    #[must_use]
    pub fn with_relu(mut self) -> Self {
        self.relu = true;
        self
    }

    #[must_use]
    pub fn units(&self) -> usize {
        self.units
    }
}

impl Layer for Dense {
    fn kind(&self) -> &'static str {
        "Dense"
    }

    fn prefix(&self) -> &'static str {
        "dense"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        if input != [self.in_features] {
            return Err(CharCnnError::invalid_architecture(
                self.prefix(),
                format!("expects ({}) input, got {input:?}", self.in_features),
            ));
        }
        Ok(vec![self.units])
    }

    fn forward(&mut self, input: &Tensor, _training: bool) -> Result<Tensor> {
        input.expect_sample_shape("dense", &[self.in_features])?;
        let (fin, units, relu) = (self.in_features, self.units, self.relu);
        let kernel = self.kernel.value.data();
        let bias = self.bias.value.data();

        let mut out = vec![0.0; input.batch_size() * units];
        out.par_chunks_mut(units.max(1))
            .zip(input.data().par_chunks(fin.max(1)))
            .for_each(|(y, x)| {
                y.copy_from_slice(bias);
                for (i, &xv) in x.iter().enumerate() {
                    if xv == 0.0 {
                        continue;
                    }
                    for (acc, &w) in y.iter_mut().zip(&kernel[i * units..(i + 1) * units]) {
                        *acc += xv * w;
                    }
                }
                if relu {
                    y.iter_mut().for_each(|v| *v = v.max(0.0));
                }
            });

        let output = Tensor::from_raw(out, vec![input.batch_size(), units]);
        self.input = Some(input.clone());
        self.output = Some(output.clone());
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let input = cached(&self.input, "dense")?;
        let output = cached(&self.output, "dense")?;
        check_grad("dense", grad_output, output.shape())?;
        let (fin, units) = (self.in_features, self.units);

        let mut g = grad_output.data().to_vec();
        if self.relu {
            for (gv, &y) in g.iter_mut().zip(output.data()) {
                if y <= 0.0 {
                    *gv = 0.0;
                }
            }
        }

        let (dw, db) = input
            .data()
            .par_chunks(fin.max(1))
            .zip(g.par_chunks(units.max(1)))
            .fold(
                || (vec![0.0_f32; fin * units], vec![0.0_f32; units]),
                |(mut dw, mut db), (x, gs)| {
                    for (acc, &gv) in db.iter_mut().zip(gs) {
                        *acc += gv;
                    }
                    for (i, &xv) in x.iter().enumerate() {
                        if xv == 0.0 {
                            continue;
                        }
                        for (acc, &gv) in dw[i * units..(i + 1) * units].iter_mut().zip(gs) {
                            *acc += xv * gv;
                        }
                    }
                    (dw, db)
                },
            )
            .reduce(
                || (vec![0.0_f32; fin * units], vec![0.0_f32; units]),
                |(mut a, mut ab), (b, bb)| {
                    a.iter_mut().zip(&b).for_each(|(x, y)| *x += y);
                    ab.iter_mut().zip(&bb).for_each(|(x, y)| *x += y);
                    (a, ab)
                },
            );

        let kernel = self.kernel.value.data();
        let mut dx = vec![0.0; input.numel()];
        dx.par_chunks_mut(fin.max(1))
            .zip(g.par_chunks(units.max(1)))
            .for_each(|(dxs, gs)| {
                for (i, d) in dxs.iter_mut().enumerate() {
                    *d = kernel[i * units..(i + 1) * units]
                        .iter()
                        .zip(gs)
                        .map(|(w, gv)| w * gv)
                        .sum();
                }
            });

        for (acc, v) in self.kernel.grad.data_mut().iter_mut().zip(dw) {
            *acc += v;
        }
        for (acc, v) in self.bias.grad.data_mut().iter_mut().zip(db) {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_dense(relu: bool) -> Dense {
        let mut dense = Dense::new(2, 2, Some(0));
        dense.kernel.value = Tensor::new(vec![1.0, -1.0, 2.0, 0.5], &[2, 2]).unwrap();
        dense.bias.value = Tensor::new(vec![0.5, 0.0], &[2]).unwrap();
        if relu {
            dense.with_relu()
        } else {
            dense
        }
    }

    #[test]
    fn test_forward_affine() {
        let mut dense = fixed_dense(false);
        let x = Tensor::new(vec![1.0, 1.0, -1.0, 0.0], &[2, 2]).unwrap();
        let y = dense.forward(&x, false).unwrap();
        assert_eq!(y.data(), &[3.5, -0.5, -0.5, 1.0]);
    }

    #[test]
    fn test_forward_relu_clamps() {
        let mut dense = fixed_dense(true);
        let x = Tensor::new(vec![1.0, 1.0, -1.0, 0.0], &[2, 2]).unwrap();
        let y = dense.forward(&x, false).unwrap();
        assert_eq!(y.data(), &[3.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_backward_relu_masks_gradient() {
        let mut dense = fixed_dense(true);
        let x = Tensor::new(vec![1.0, 1.0], &[1, 2]).unwrap();
        dense.forward(&x, true).unwrap();
        let dx = dense.backward(&Tensor::new(vec![1.0, 1.0], &[1, 2]).unwrap()).unwrap();
        // only unit 0 is active
        assert_eq!(dx.data(), &[1.0, 2.0]);
        assert_eq!(dense.bias.grad.data(), &[1.0, 0.0]);
        assert_eq!(dense.kernel.grad.data(), &[1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_shape_errors() {
        let mut dense = Dense::new(3, 2, None);
        assert!(dense.output_shape(&[4]).is_err());
        assert!(dense.forward(&Tensor::zeros(&[1, 4]), false).is_err());
        assert!(dense.backward(&Tensor::zeros(&[1, 2])).is_err());
        assert_eq!(dense.n_params(), 3 * 2 + 2);
    }
}
