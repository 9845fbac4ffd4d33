//! Token embedding lookup.

use rayon::prelude::*;

use crate::error::{CharCnnError, Result};
use crate::nn::init::uniform;
use crate::nn::layer::{cached, check_grad, Layer, Param};
use crate::nn::Tensor;

/// Maps integer indices `(batch, length)` to vectors `(batch, length, dim)`.
///
/// Indices arrive as `f32` and must be whole numbers below `vocab_size`.
#[derive(Debug, Clone)]
pub struct Embedding {
    vocab_size: usize,
    dim: usize,
    table: Param,
    input: Option<Tensor>,
}

impl Embedding {
    /// Table initialized U(-0.05, 0.05).
    #[must_use]
    pub fn new(vocab_size: usize, dim: usize, seed: Option<u64>) -> Self {
        Self {
            vocab_size,
            dim,
            table: Param::new("embeddings", uniform(&[vocab_size, dim], -0.05, 0.05, seed)),
            input: None,
        }
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    fn index(&self, raw: f32) -> Result<usize> {
        let index = raw as usize;
        if raw < 0.0 || raw.fract() != 0.0 || index >= self.vocab_size {
            return Err(CharCnnError::DimensionMismatch {
                expected: format!("embedding index in 0..{}", self.vocab_size),
                actual: format!("{raw}"),
            });
        }
        Ok(index)
    }
}

impl Layer for Embedding {
    fn kind(&self) -> &'static str {
        "Embedding"
    }

    fn prefix(&self) -> &'static str {
        "embedding"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        match input {
            [length] => Ok(vec![*length, self.dim]),
            _ => Err(CharCnnError::invalid_architecture(
                self.prefix(),
                format!("expects (length) input, got {input:?}"),
            )),
        }
    }

    fn forward(&mut self, input: &Tensor, _training: bool) -> Result<Tensor> {
        if input.shape().len() != 2 {
            return Err(CharCnnError::DimensionMismatch {
                expected: "embedding input (batch, length)".to_string(),
                actual: format!("{:?}", input.shape()),
            });
        }
        let indices = input
            .data()
            .iter()
            .map(|&raw| self.index(raw))
            .collect::<Result<Vec<usize>>>()?;

        let dim = self.dim;
        let table = self.table.value.data();
        let mut out = vec![0.0; indices.len() * dim];
        out.par_chunks_mut(dim.max(1))
            .zip(indices.par_iter())
            .for_each(|(row, &index)| row.copy_from_slice(&table[index * dim..(index + 1) * dim]));

        self.input = Some(input.clone());
        let mut shape = input.shape().to_vec();
        shape.push(dim);
        Ok(Tensor::from_raw(out, shape))
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let input = cached(&self.input, "embedding")?;
        let mut shape = input.shape().to_vec();
        shape.push(self.dim);
        check_grad("embedding", grad_output, &shape)?;

        let dim = self.dim;
        let grad = self.table.grad.data_mut();
        for (&raw, g) in input.data().iter().zip(grad_output.data().chunks(dim.max(1))) {
            let row = raw as usize * dim;
            for (acc, &v) in grad[row..row + dim].iter_mut().zip(g) {
                *acc += v;
            }
        }
        // indices are not differentiable
        Ok(Tensor::zeros(input.shape()))
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.table]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.table]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_copies_rows() {
        let mut emb = Embedding::new(4, 3, Some(1));
        let x = Tensor::new(vec![0.0, 3.0, 3.0, 1.0], &[2, 2]).unwrap();
        let y = emb.forward(&x, false).unwrap();
        assert_eq!(y.shape(), &[2, 2, 3]);

        let table = emb.table.value.data().to_vec();
        assert_eq!(&y.data()[3..6], &table[9..12]);
        assert_eq!(&y.data()[6..9], &table[9..12]);
        assert_eq!(&y.data()[9..12], &table[3..6]);
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let mut emb = Embedding::new(4, 2, Some(1));
        for bad in [4.0, -1.0, 1.5] {
            let x = Tensor::new(vec![bad], &[1, 1]).unwrap();
            assert!(matches!(
                emb.forward(&x, false),
                Err(CharCnnError::DimensionMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_backward_accumulates_per_index() {
        let mut emb = Embedding::new(3, 2, Some(1));
        let x = Tensor::new(vec![2.0, 2.0, 0.0], &[1, 3]).unwrap();
        emb.forward(&x, true).unwrap();
        let g = Tensor::new(vec![1.0, 2.0, 10.0, 20.0, 0.5, 0.5], &[1, 3, 2]).unwrap();
        let dx = emb.backward(&g).unwrap();

        assert_eq!(dx.shape(), &[1, 3]);
        assert_eq!(emb.table.grad.data(), &[0.5, 0.5, 0.0, 0.0, 11.0, 22.0]);
    }

    #[test]
    fn test_output_shape() {
        let emb = Embedding::new(70, 64, None);
        assert_eq!(emb.output_shape(&[250]).unwrap(), vec![250, 64]);
        assert!(emb.output_shape(&[250, 1]).is_err());
        assert_eq!(emb.n_params(), 70 * 64);
    }
}
