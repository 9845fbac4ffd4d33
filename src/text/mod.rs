//! Text preprocessing for character-level models.
//!
//! - [`quantize`]: character quantization into fixed-width integer rows
//!
//! # Example
//!
//! ```
//! use charcnn::text::Quantizer;
//! use charcnn::traits::TextTransformer;
//!
//! let quantizer = Quantizer::new();
//! let encoded = quantizer.transform(&["Hello, world"]);
//!
//! assert_eq!(encoded.shape(), [1, 250]);
//! assert_eq!(encoded.nnz(), 12);
//! ```

pub mod quantize;

pub use quantize::{
    Alphabet, Padding, QuantIndex, Quantizer, QuantizerBuilder, SymbolMap, DEFAULT_ALPHABET,
    DEFAULT_INPUT_LENGTH,
};
