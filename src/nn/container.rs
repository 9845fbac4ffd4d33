//! Sequential layer stack.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{CharCnnError, Result};
use crate::nn::layer::{Layer, Param};
use crate::nn::Tensor;

const RULE_WIDTH: usize = 65;

struct Entry {
    name: String,
    layer: Box<dyn Layer>,
    output_shape: Vec<usize>,
}

/// Layers executed in order, each output feeding the next layer.
///
/// Shapes are checked as layers are added, so a stack that exists always
/// fits together.
///
/// # Example
///
/// ```
/// use charcnn::nn::{Dense, ReLU, Sequential, Tensor};
///
/// let mut net = Sequential::new(&[4])
///     .add(Dense::new(4, 8, Some(0)))?
///     .add(ReLU::new())?
///     .add(Dense::new(8, 2, Some(1)))?;
///
/// let y = net.forward(&Tensor::zeros(&[3, 4]), false)?;
/// assert_eq!(y.shape(), &[3, 2]);
/// # Ok::<(), charcnn::CharCnnError>(())
/// ```
pub struct Sequential {
    input_shape: Vec<usize>,
    entries: Vec<Entry>,
}

impl Sequential {
    /// Empty stack taking per-sample inputs of `input_shape`.
    #[must_use]
    pub fn new(input_shape: &[usize]) -> Self {
        Self {
            input_shape: input_shape.to_vec(),
            entries: Vec::new(),
        }
    }

    /// Append a layer, naming it after its type (`dense`, `dense_1`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::InvalidArchitecture`] if the layer cannot
    /// accept the current output shape.
    pub fn add<L: Layer + 'static>(mut self, layer: L) -> Result<Self> {
        let output_shape = layer.output_shape(self.output_shape())?;
        let prefix = layer.prefix();
        let seen = self
            .entries
            .iter()
            .filter(|e| e.layer.prefix() == prefix)
            .count();
        let name = if seen == 0 {
            prefix.to_string()
        } else {
            format!("{prefix}_{seen}")
        };
        self.entries.push(Entry {
            name,
            layer: Box::new(layer),
            output_shape,
        });
        Ok(self)
    }

    #[must_use]
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Per-sample output shape of the last layer.
    #[must_use]
    pub fn output_shape(&self) -> &[usize] {
        self.entries
            .last()
            .map_or(&self.input_shape, |e| &e.output_shape)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Instance names in order.
    #[must_use]
    pub fn layer_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Run every layer.
    ///
    /// # Errors
    ///
    /// Propagates the first layer error.
    pub fn forward(&mut self, input: &Tensor, training: bool) -> Result<Tensor> {
        let mut x = input.clone();
        for entry in &mut self.entries {
            x = entry.layer.forward(&x, training)?;
        }
        Ok(x)
    }

    /// Backpropagate `grad_output` through every layer, accumulating
    /// parameter gradients. Returns the gradient with respect to the input.
    ///
    /// # Errors
    ///
    /// Propagates the first layer error.
    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let mut g = grad_output.clone();
        for entry in self.entries.iter_mut().rev() {
            g = entry.layer.backward(&g)?;
        }
        Ok(g)
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        self.entries
            .iter_mut()
            .flat_map(|e| e.layer.params_mut())
            .collect()
    }

    /// Parameters keyed `layer_name/param_name`.
    #[must_use]
    pub fn named_params(&self) -> BTreeMap<String, &Param> {
        self.entries
            .iter()
            .flat_map(|e| {
                e.layer
                    .params()
                    .into_iter()
                    .map(move |p| (format!("{}/{}", e.name, p.name), p))
            })
            .collect()
    }

    /// Mutable parameters keyed `layer_name/param_name`.
    pub fn named_params_mut(&mut self) -> BTreeMap<String, &mut Param> {
        self.entries
            .iter_mut()
            .flat_map(|e| {
                let name = e.name.clone();
                e.layer
                    .params_mut()
                    .into_iter()
                    .map(move |p| (format!("{name}/{}", p.name), p))
            })
            .collect()
    }

    pub fn zero_grad(&mut self) {
        for p in self.params_mut() {
            p.zero_grad();
        }
    }

    /// Total trainable weights.
    #[must_use]
    pub fn n_params(&self) -> usize {
        self.entries.iter().map(|e| e.layer.n_params()).sum()
    }

    /// Overwrite a parameter's value by name.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] if `name` is unknown or
    /// the shapes differ.
    pub fn set_param(&mut self, name: &str, value: Tensor) -> Result<()> {
        let mut params = self.named_params_mut();
        let param = params.get_mut(name).ok_or_else(|| CharCnnError::DimensionMismatch {
            expected: "a parameter of this network".to_string(),
            actual: name.to_string(),
        })?;
        if param.value.shape() != value.shape() {
            return Err(CharCnnError::DimensionMismatch {
                expected: format!("{name} of shape {:?}", param.value.shape()),
                actual: format!("{:?}", value.shape()),
            });
        }
        param.value = value;
        Ok(())
    }

    /// Layer table with output shapes and parameter counts.
    #[must_use]
    pub fn summary(&self, title: &str) -> String {
        let thin = "_".repeat(RULE_WIDTH);
        let thick = "=".repeat(RULE_WIDTH);
        let mut out = String::new();
        let _ = writeln!(out, "Model: \"{title}\"");
        let _ = writeln!(out, "{thin}");
        let _ = writeln!(out, " {:<28}{:<26}{}", "Layer (type)", "Output Shape", "Param #");
        let _ = writeln!(out, "{thick}");
        for (i, entry) in self.entries.iter().enumerate() {
            let label = format!("{} ({})", entry.name, entry.layer.kind());
            let shape = format_shape(&entry.output_shape);
            let _ = writeln!(out, " {label:<28}{shape:<26}{}", entry.layer.n_params());
            if i + 1 < self.entries.len() {
                let _ = writeln!(out);
            }
        }
        let _ = writeln!(out, "{thick}");
        let total = self.n_params();
        let _ = writeln!(out, "Total params: {total}");
        let _ = writeln!(out, "Trainable params: {total}");
        let _ = writeln!(out, "Non-trainable params: 0");
        let _ = write!(out, "{thin}");
        out
    }
}

fn format_shape(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(ToString::to_string).collect();
    format!("(None, {})", dims.join(", "))
}

impl std::fmt::Debug for Sequential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequential")
            .field("input_shape", &self.input_shape)
            .field("layers", &self.layer_names())
            .field("n_params", &self.n_params())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Dense, Dropout, ReLU, Softmax};

    fn mlp() -> Sequential {
        Sequential::new(&[3])
            .add(Dense::new(3, 4, Some(0)).with_relu())
            .and_then(|s| s.add(Dropout::new(0.5, Some(1))))
            .and_then(|s| s.add(ReLU::new()))
            .and_then(|s| s.add(Dense::new(4, 2, Some(2))))
            .and_then(|s| s.add(Softmax::new()))
            .unwrap()
    }

    #[test]
    fn test_names_are_numbered_per_type() {
        let net = mlp();
        assert_eq!(
            net.layer_names(),
            vec!["dense", "dropout", "re_lu", "dense_1", "softmax"]
        );
        let names: Vec<String> = net.named_params().keys().cloned().collect();
        assert_eq!(
            names,
            vec!["dense/bias", "dense/kernel", "dense_1/bias", "dense_1/kernel"]
        );
    }

    #[test]
    fn test_add_rejects_incompatible_layer() {
        let err = Sequential::new(&[3]).add(Dense::new(5, 2, None)).unwrap_err();
        assert!(matches!(err, CharCnnError::InvalidArchitecture { .. }));
    }

    #[test]
    fn test_forward_backward_shapes() {
        let mut net = mlp();
        let x = Tensor::full(&[5, 3], 0.5);
        let y = net.forward(&x, true).unwrap();
        assert_eq!(y.shape(), &[5, 2]);
        let dx = net.backward(&Tensor::full(&[5, 2], 0.1)).unwrap();
        assert_eq!(dx.shape(), &[5, 3]);
    }

    #[test]
    fn test_zero_grad_and_set_param() {
        let mut net = mlp();
        net.forward(&Tensor::full(&[2, 3], 1.0), true).unwrap();
        net.backward(&Tensor::full(&[2, 2], 1.0)).unwrap();
        net.zero_grad();
        assert!(net
            .named_params()
            .values()
            .all(|p| p.grad.data().iter().all(|&g| g == 0.0)));

        net.set_param("dense_1/bias", Tensor::full(&[2], 3.0)).unwrap();
        assert_eq!(net.named_params()["dense_1/bias"].value.data(), &[3.0, 3.0]);
        assert!(net.set_param("dense_1/bias", Tensor::zeros(&[3])).is_err());
        assert!(net.set_param("nope/bias", Tensor::zeros(&[2])).is_err());
    }

    #[test]
    fn test_summary_lists_layers_and_total() {
        let summary = mlp().summary("tiny");
        assert!(summary.starts_with("Model: \"tiny\""));
        assert!(summary.contains("dense_1 (Dense)"));
        assert!(summary.contains("(None, 4)"));
        assert!(summary.contains(&format!("Total params: {}", 3 * 4 + 4 + 4 * 2 + 2)));
    }
}
