//! Training run configuration.
//!
//! A single JSON document bundles every setting of a training run. All
//! fields have defaults, so a partial document such as
//! `{"fit": {"epochs": 5}}` is valid.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::{CharCnnConfig, FitOptions, SearchOptions};
use crate::text::{Alphabet, Padding, Quantizer, DEFAULT_INPUT_LENGTH};

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizerConfig {
    pub alphabet: Alphabet,
    pub input_length: usize,
    pub padding: Padding,
    pub reverse: bool,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            alphabet: Alphabet::default(),
            input_length: DEFAULT_INPUT_LENGTH,
            padding: Padding::default(),
            reverse: true,
        }
    }
}

impl QuantizerConfig {
    /// Encoder with these settings.
    #[must_use]
    pub fn build(&self) -> Quantizer {
        Quantizer::builder()
            .alphabet(self.alphabet.clone())
            .input_length(self.input_length)
            .padding(self.padding)
            .reverse(self.reverse)
            .build()
    }
}

/// Everything a training run needs besides the data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub quantizer: QuantizerConfig,
    pub architecture: CharCnnConfig,
    pub fit: FitOptions,
    pub search: SearchOptions,
}

impl TrainingConfig {
    /// Read a JSON document.
    ///
    /// # Errors
    ///
    /// Returns I/O errors and JSON errors.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = serde_json::from_str(&fs::read_to_string(path)?)?;
        debug!(path = %path.display(), "loaded training config");
        Ok(config)
    }

    /// Write as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns I/O errors and JSON errors.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
