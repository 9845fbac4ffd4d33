//! Architecture description of the character CNN.

use serde::{Deserialize, Serialize};

use crate::error::{CharCnnError, Result};
use crate::nn::{Conv1d, Dense, Dropout, Embedding, Flatten, MaxPool1d, ReLU, Sequential, Softmax};

/// One convolution block: convolution, ReLU, optional max pooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvBlock {
    /// Number of filters.
    pub filters: usize,
    /// Kernel width.
    pub kernel_size: usize,
    /// Pool window after the activation, if any.
    pub pool_size: Option<usize>,
}

impl ConvBlock {
    #[must_use]
    pub const fn new(filters: usize, kernel_size: usize, pool_size: Option<usize>) -> Self {
        Self {
            filters,
            kernel_size,
            pool_size,
        }
    }
}

/// Layer sizes of the network.
///
/// The default is the large model of Zhang, Zhao & `LeCun` (2015): a
/// 64-wide embedding, six convolutions of 1024 filters (kernels 7, 7, 3,
/// 3, 3, 3; pooling by 3 after the first, second and sixth), two dense
/// layers of 2048 units with dropout 0.5, and a softmax output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharCnnConfig {
    /// Embedding width.
    pub embedding_dim: usize,
    /// Convolution blocks in order.
    pub conv_blocks: Vec<ConvBlock>,
    /// Hidden dense layer widths in order.
    pub dense_units: Vec<usize>,
    /// Dropout rate after each hidden dense layer.
    pub dropout: f32,
    /// Standard deviation of the convolution kernel initializer.
    pub kernel_init_std: f32,
}

impl Default for CharCnnConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 64,
            conv_blocks: vec![
                ConvBlock::new(1024, 7, Some(3)),
                ConvBlock::new(1024, 7, Some(3)),
                ConvBlock::new(1024, 3, None),
                ConvBlock::new(1024, 3, None),
                ConvBlock::new(1024, 3, None),
                ConvBlock::new(1024, 3, Some(3)),
            ],
            dense_units: vec![2048, 2048],
            dropout: 0.5,
            kernel_init_std: 0.02,
        }
    }
}

impl CharCnnConfig {
    /// A narrow variant with the same layer pattern, for quick experiments.
    #[must_use]
    pub fn small() -> Self {
        Self {
            embedding_dim: 8,
            conv_blocks: vec![
                ConvBlock::new(16, 7, Some(3)),
                ConvBlock::new(16, 3, Some(3)),
            ],
            dense_units: vec![32],
            dropout: 0.5,
            kernel_init_std: 0.02,
        }
    }

    /// Check sizes and compute per-sample output shapes layer by layer
    /// without allocating any weights.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::InvalidArchitecture`] when a size is zero,
    /// the dropout rate is outside `[0, 1)`, or the sequence becomes too
    /// short for a kernel or pool window.
    pub fn plan(&self, input_len: usize, class_len: usize) -> Result<Vec<usize>> {
        if input_len == 0 {
            return Err(CharCnnError::invalid_architecture(
                "input",
                "input length must be positive",
            ));
        }
        if class_len == 0 {
            return Err(CharCnnError::invalid_architecture(
                "output",
                "at least one class is required",
            ));
        }
        if self.embedding_dim == 0 {
            return Err(CharCnnError::invalid_architecture(
                "embedding",
                "embedding_dim must be positive",
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(CharCnnError::invalid_architecture(
                "dropout",
                format!("rate {} outside [0, 1)", self.dropout),
            ));
        }

        let mut length = input_len;
        for (i, block) in self.conv_blocks.iter().enumerate() {
            if block.filters == 0 || block.kernel_size == 0 {
                return Err(CharCnnError::invalid_architecture(
                    format!("conv block {i}"),
                    "filters and kernel_size must be positive",
                ));
            }
            if block.kernel_size > length {
                return Err(CharCnnError::invalid_architecture(
                    format!("conv block {i}"),
                    format!("kernel {} exceeds sequence length {length}", block.kernel_size),
                ));
            }
            length = length - block.kernel_size + 1;
            if let Some(pool) = block.pool_size {
                if pool == 0 || pool > length {
                    return Err(CharCnnError::invalid_architecture(
                        format!("conv block {i}"),
                        format!("pool {pool} exceeds sequence length {length}"),
                    ));
                }
                length /= pool;
            }
        }
        if let Some(i) = self.dense_units.iter().position(|&u| u == 0) {
            return Err(CharCnnError::invalid_architecture(
                format!("dense block {i}"),
                "units must be positive",
            ));
        }

        let channels = self
            .conv_blocks
            .last()
            .map_or(self.embedding_dim, |b| b.filters);
        Ok(vec![length * channels])
    }

    /// Assemble the layer stack.
    ///
    /// Layer `i` is seeded with `seed + i` when a seed is given.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::InvalidArchitecture`] as [`plan`](Self::plan)
    /// does; nothing is allocated in that case.
    pub fn build_network(
        &self,
        input_len: usize,
        chars_len: usize,
        class_len: usize,
        seed: Option<u64>,
    ) -> Result<Sequential> {
        self.plan(input_len, class_len)?;

        let mut counter = 0_u64;
        let mut next_seed = || {
            counter += 1;
            seed.map(|s| s.wrapping_add(counter))
        };

        let mut net = Sequential::new(&[input_len]).add(Embedding::new(
            chars_len + 1,
            self.embedding_dim,
            next_seed(),
        ))?;
        let mut channels = self.embedding_dim;
        for block in &self.conv_blocks {
            net = net
                .add(Conv1d::new(
                    channels,
                    block.filters,
                    block.kernel_size,
                    self.kernel_init_std,
                    next_seed(),
                ))?
                .add(ReLU::new())?;
            if let Some(pool) = block.pool_size {
                net = net.add(MaxPool1d::new(pool))?;
            }
            channels = block.filters;
        }
        net = net.add(Flatten::new())?;

        for &units in &self.dense_units {
            let features = net.output_shape()[0];
            net = net
                .add(Dense::new(features, units, next_seed()).with_relu())?
                .add(Dropout::new(self.dropout, next_seed()))?
                .add(ReLU::new())?;
        }
        let features = net.output_shape()[0];
        net = net
            .add(Dense::new(features, class_len, next_seed()))?
            .add(Softmax::new())?;
        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_layers(config: &CharCnnConfig) -> usize {
        let pools = config
            .conv_blocks
            .iter()
            .filter(|b| b.pool_size.is_some())
            .count();
        1 + 2 * config.conv_blocks.len() + pools + 1 + 3 * config.dense_units.len() + 2
    }

    #[test]
    fn test_default_plan_matches_zhang_large() {
        // 250 -> 244 -> 81 -> 75 -> 25 -> 23 -> 21 -> 19 -> 17 -> 5
        let plan = CharCnnConfig::default().plan(250, 4).unwrap();
        assert_eq!(plan, vec![5 * 1024]);
    }

    #[test]
    fn test_plan_rejects_short_input() {
        let err = CharCnnConfig::default().plan(100, 4).unwrap_err();
        assert!(matches!(err, CharCnnError::InvalidArchitecture { .. }));
        assert!(CharCnnConfig::small().plan(12, 2).is_err());
    }

    #[test]
    fn test_plan_rejects_bad_sizes() {
        let mut config = CharCnnConfig::small();
        config.dropout = 1.0;
        assert!(config.plan(64, 2).is_err());

        let mut config = CharCnnConfig::small();
        config.dense_units = vec![0];
        assert!(config.plan(64, 2).is_err());

        assert!(CharCnnConfig::small().plan(64, 0).is_err());
        assert!(CharCnnConfig::small().plan(0, 2).is_err());
    }

    #[test]
    fn test_small_network_layout() {
        let config = CharCnnConfig::small();
        let net = config.build_network(40, 69, 3, Some(1)).unwrap();
        assert_eq!(net.len(), expected_layers(&config));
        assert_eq!(net.output_shape(), &[3]);
        assert_eq!(
            net.layer_names(),
            vec![
                "embedding",
                "conv1d",
                "re_lu",
                "max_pooling1d",
                "conv1d_1",
                "re_lu_1",
                "max_pooling1d_1",
                "flatten",
                "dense",
                "dropout",
                "re_lu_2",
                "dense_1",
                "softmax",
            ]
        );
        // embedding covers index 0 plus every symbol
        assert_eq!(net.named_params()["embedding/embeddings"].value.shape(), &[70, 8]);
    }

    #[test]
    fn test_seeded_builds_are_identical() {
        let config = CharCnnConfig::small();
        let a = config.build_network(40, 69, 3, Some(5)).unwrap();
        let b = config.build_network(40, 69, 3, Some(5)).unwrap();
        for ((na, pa), (nb, pb)) in a.named_params().iter().zip(b.named_params().iter()) {
            assert_eq!(na, nb);
            assert_eq!(pa.value, pb.value);
        }
    }

    #[test]
    fn test_config_json_defaults_missing_fields() {
        let config: CharCnnConfig = serde_json::from_str(r#"{"embedding_dim": 16}"#).unwrap();
        assert_eq!(config.embedding_dim, 16);
        assert_eq!(config.conv_blocks, CharCnnConfig::default().conv_blocks);
        let roundtrip: CharCnnConfig =
            serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(roundtrip, config);
    }
}
