//! charcnn: character-level convolutional text classification in pure Rust.
//!
//! Raw strings are quantized into fixed-width rows of symbol indices, fed
//! to the character CNN of Zhang, Zhao & `LeCun` (2015), and trained with
//! either fixed hyperparameters or a Bayesian search over them.
//!
//! # Quick Start
//!
//! ```
//! use charcnn::prelude::*;
//!
//! let quantizer = Quantizer::builder().input_length(60).build();
//! let docs = ["great film", "awful film", "loved it", "hated it"];
//! let labels = ClassLabels::from_observed(["pos", "neg", "pos", "neg"]);
//! let x = quantizer.transform(&docs);
//! let y = labels.one_hot(&["pos", "neg", "pos", "neg"])?;
//!
//! let mut hyper = HyperModel::new(60, quantizer.vocabulary_size(), labels.len())
//!     .with_architecture(CharCnnConfig::small())
//!     .with_seed(1);
//! let options = FitOptions {
//!     epochs: 2,
//!     verbose: false,
//!     ..FitOptions::default()
//! };
//! hyper.fit(&x, &y, false, &options)?;
//!
//! let model = hyper.take_model().ok_or(CharCnnError::ModelNotBuilt)?;
//! let mut classifier = Classifier::new(model, labels, quantizer)?;
//! let ranked = classifier.predict(&["great fun"], 1)?;
//! assert_eq!(ranked[0].classes.len(), 1);
//! # Ok::<(), CharCnnError>(())
//! ```
//!
//! # Modules
//!
//! - [`text`]: Character quantization into fixed-width integer rows
//! - [`sparse`]: CSR storage for encoded corpora
//! - [`hyper`]: Hyperparameter sources (defaults or search)
//! - [`automl`]: Search strategies (random, TPE) and the trial tuner
//! - [`nn`]: CPU layers, loss, optimizer and sequential container
//! - [`model`]: The char-CNN architecture, training and the hyper model
//! - [`classify`]: Class labels, prediction statistics and inference
//! - [`serialization`]: `SafeTensors` weight files
//! - [`config`]: JSON training configuration

pub mod automl;
pub mod classify;
pub mod config;
pub mod error;
pub mod hyper;
pub mod model;
pub mod nn;
pub mod prelude;
pub mod serialization;
pub mod sparse;
pub mod text;
pub mod traits;

pub use error::{CharCnnError, Result};
pub use sparse::CsrMatrix;
pub use traits::TextTransformer;
