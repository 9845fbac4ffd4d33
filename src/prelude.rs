//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use charcnn::prelude::*;
//! ```

pub use crate::classify::{ClassLabels, Classifier, OneHot, Prediction, PredictionStats};
pub use crate::config::{QuantizerConfig, TrainingConfig};
pub use crate::error::{CharCnnError, Result};
pub use crate::hyper::{HyperDefaulter, HyperParameters, SearchParameters};
pub use crate::model::{CharCnnConfig, FitOptions, History, HyperModel, Model, SearchOptions};
pub use crate::sparse::CsrMatrix;
pub use crate::text::{Padding, Quantizer};
pub use crate::traits::TextTransformer;
