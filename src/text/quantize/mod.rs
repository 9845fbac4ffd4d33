//! Character quantization for character-level models.
//!
//! A [`Quantizer`] maps every character of a document to its 1-based
//! position in a fixed alphabet and lays the result out in a window of
//! `input_length` slots. Index 0 is reserved for "no symbol": padding
//! slots and characters outside the alphabet both encode to 0.
//!
//! # Layout
//!
//! ```text
//! alphabet "abc", input_length 5, document "ab"
//!
//! padding=right, reverse=false   [1, 2, 0, 0, 0]
//! padding=right, reverse=true    [2, 1, 0, 0, 0]
//! padding=left,  reverse=false   [0, 0, 0, 1, 2]
//! padding=left,  reverse=true    [0, 0, 0, 2, 1]
//! ```
//!
//! # References
//!
//! - Zhang, X., Zhao, J., & `LeCun`, Y. (2015). Character-level convolutional
//!   networks for text classification. `NeurIPS`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::CharCnnError;
use crate::sparse::{CsrMatrix, SparseValue};
use crate::traits::TextTransformer;

/// The printable part of the Zhang et al. alphabet: space, punctuation,
/// digits and lowercase ASCII letters (69 symbols; the paper's 70th is a
/// newline).
pub const DEFAULT_ALPHABET: &str =
    " !\"#$%&'()*+,-./0123456789:;<=>?@[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~";

/// Default width of an encoded document.
pub const DEFAULT_INPUT_LENGTH: usize = 250;

/// Integer type a quantizer emits.
///
/// Indices are converted with `as` casts, so a type narrower than the
/// alphabet size wraps around.
pub trait QuantIndex: SparseValue {
    /// Convert a symbol index into this type.
    fn from_index(index: usize) -> Self;

    /// Convert back to a symbol index.
    fn to_index(self) -> usize;
}

macro_rules! impl_quant_index {
    ($($t:ty),*) => {
        $(
            impl QuantIndex for $t {
                #[inline]
                fn from_index(index: usize) -> Self {
                    index as $t
                }

                #[inline]
                fn to_index(self) -> usize {
                    self as usize
                }
            }
        )*
    };
}

impl_quant_index!(u8, u16, u32, u64, i16, i32, i64);

/// Alignment of a document shorter than the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// Zeros before the content; content is right-aligned.
    Left,
    /// Zeros after the content; content is left-aligned.
    #[default]
    Right,
    /// No explicit padding. Behaves exactly like [`Padding::Right`].
    None,
}

impl Padding {
    /// Name of this padding mode.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Padding::Left => "left",
            Padding::Right => "right",
            Padding::None => "none",
        }
    }
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Padding {
    type Err = CharCnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Padding::Left),
            "right" => Ok(Padding::Right),
            "none" => Ok(Padding::None),
            other => Err(CharCnnError::InvalidHyperparameter {
                param: "padding".to_string(),
                value: other.to_string(),
                constraint: "one of left, right, none".to_string(),
            }),
        }
    }
}

/// Ordered symbols eligible for encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Alphabet {
    symbols: Vec<char>,
}

impl Alphabet {
    /// Alphabet from the characters of a string, in order.
    #[must_use]
    pub fn new(symbols: &str) -> Self {
        Self {
            symbols: symbols.chars().collect(),
        }
    }

    /// Symbols in alphabet order.
    #[must_use]
    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    /// Number of symbols, which is also the largest index it can produce.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether there are no symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHABET)
    }
}

impl From<&str> for Alphabet {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Alphabet {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<Alphabet> for String {
    fn from(alphabet: Alphabet) -> Self {
        alphabet.symbols.into_iter().collect()
    }
}

/// Symbol to index mapping; 0 is never assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolMap {
    index: HashMap<char, usize>,
    /// `symbols[i]` is the symbol encoded as `i`; slot 0 is always `None`.
    symbols: Vec<Option<char>>,
}

impl SymbolMap {
    /// Enumerate the alphabet from 1. A repeated symbol keeps its last position.
    #[must_use]
    pub fn from_alphabet(alphabet: &Alphabet) -> Self {
        let mut index = HashMap::with_capacity(alphabet.len());
        for (pos, &symbol) in alphabet.symbols().iter().enumerate() {
            index.insert(symbol, pos + 1);
        }

        let mut symbols = vec![None; alphabet.len() + 1];
        for (&symbol, &idx) in &index {
            symbols[idx] = Some(symbol);
        }

        Self { index, symbols }
    }

    /// Index of a symbol, or 0 when it is not in the alphabet.
    #[must_use]
    pub fn index_of(&self, symbol: char) -> usize {
        self.index.get(&symbol).copied().unwrap_or(0)
    }

    /// Symbol encoded by an index, if any.
    #[must_use]
    pub fn symbol_at(&self, index: usize) -> Option<char> {
        self.symbols.get(index).copied().flatten()
    }

    /// Number of mapped symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no symbol is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Lower-case a character for lookup.
///
/// Characters whose lower-case form is more than one character have no
/// single symbol to look up.
fn fold_case(c: char) -> Option<char> {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => Some(l),
        _ => None,
    }
}

/// Character-level encoder producing fixed-width integer rows.
///
/// # Examples
///
/// ```
/// use charcnn::text::{Padding, Quantizer};
/// use charcnn::traits::TextTransformer;
///
/// let quantizer = Quantizer::builder()
///     .alphabet("abc")
///     .input_length(5)
///     .padding(Padding::Left)
///     .reverse(false)
///     .build();
///
/// let encoded = quantizer.transform(&["ab"]);
/// assert_eq!(encoded.row_dense(0), vec![0, 0, 0, 1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct Quantizer<T: QuantIndex = i32> {
    alphabet: Alphabet,
    input_length: usize,
    padding: Padding,
    reverse: bool,
    symbol_map: SymbolMap,
    _index: std::marker::PhantomData<T>,
}

impl Quantizer<i32> {
    /// Quantizer with the default alphabet, a 250-slot window, right
    /// padding and reversal, emitting `i32`.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start a builder; unset options take their defaults.
    #[must_use]
    pub fn builder() -> QuantizerBuilder {
        QuantizerBuilder::default()
    }
}

impl<T: QuantIndex> Default for Quantizer<T> {
    fn default() -> Self {
        QuantizerBuilder::default().build_as()
    }
}

impl<T: QuantIndex> Quantizer<T> {
    /// The alphabet.
    #[must_use]
    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// Width of every encoded row.
    #[must_use]
    pub fn input_length(&self) -> usize {
        self.input_length
    }

    /// Padding mode.
    #[must_use]
    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// Whether characters are read back to front.
    #[must_use]
    pub fn reverse(&self) -> bool {
        self.reverse
    }

    /// The current symbol map.
    #[must_use]
    pub fn symbol_map(&self) -> &SymbolMap {
        &self.symbol_map
    }

    /// Number of distinct indices a row may hold besides 0.
    ///
    /// This is the `chars_len` a model consuming this encoding needs.
    #[must_use]
    pub fn vocabulary_size(&self) -> usize {
        self.alphabet.len()
    }

    /// Encode one document into a dense row.
    #[must_use]
    pub fn encode(&self, document: &str) -> Vec<T> {
        let mut row = vec![T::default(); self.input_length];
        for (col, value) in self.encode_entries(document) {
            row[col] = value;
        }
        row
    }

    /// Non-zero `(column, value)` entries of one encoded document, in
    /// ascending column order.
    fn encode_entries(&self, document: &str) -> Vec<(usize, T)> {
        let truncated: Vec<char> = document.chars().take(self.input_length).collect();
        let len = truncated.len();
        let pad_left = self.padding == Padding::Left;

        let mut entries = Vec::with_capacity(len);
        for idx in 0..self.input_length {
            let source = if pad_left {
                // negative means a leading pad slot
                match (idx + len).checked_sub(self.input_length) {
                    Some(source) => source,
                    None => continue,
                }
            } else {
                idx
            };
            if source >= len {
                break;
            }

            let c = if self.reverse {
                truncated[len - 1 - source]
            } else {
                truncated[source]
            };

            let index = fold_case(c).map_or(0, |l| self.symbol_map.index_of(l));
            if index != 0 {
                let value = T::from_index(index);
                if !value.is_zero() {
                    entries.push((idx, value));
                }
            }
        }
        entries
    }

    /// Decode one dense row back to text.
    ///
    /// Zero slots are skipped, so padding and out-of-alphabet characters
    /// do not appear in the result.
    #[must_use]
    pub fn decode_row(&self, row: &[T]) -> String {
        let mut symbols: Vec<char> = row
            .iter()
            .filter(|v| !v.is_zero())
            .filter_map(|v| self.symbol_map.symbol_at(v.to_index()))
            .collect();
        if self.reverse {
            symbols.reverse();
        }
        symbols.into_iter().collect()
    }

    /// Decode every row of an encoded corpus.
    #[must_use]
    pub fn inverse_transform(&self, encoded: &CsrMatrix<T>) -> Vec<String> {
        (0..encoded.nrows())
            .map(|row| {
                let (_, values) = encoded.row_entries(row);
                self.decode_row(values)
            })
            .collect()
    }
}

impl<T: QuantIndex> TextTransformer for Quantizer<T> {
    type Output = CsrMatrix<T>;

    /// Rebuild the symbol map from the alphabet. Documents are ignored.
    fn fit<S: AsRef<str>>(&mut self, _documents: &[S]) {
        self.symbol_map = SymbolMap::from_alphabet(&self.alphabet);
    }

    fn transform<S: AsRef<str> + Sync>(&self, documents: &[S]) -> CsrMatrix<T> {
        let rows: Vec<Vec<(usize, T)>> = documents
            .par_iter()
            .map(|doc| self.encode_entries(doc.as_ref()))
            .collect();

        let nnz = rows.iter().map(Vec::len).sum();
        let mut values = Vec::with_capacity(nnz);
        let mut col_indices = Vec::with_capacity(nnz);
        let mut row_ptrs = Vec::with_capacity(rows.len() + 1);
        row_ptrs.push(0);
        for row in rows {
            for (col, value) in row {
                col_indices.push(col);
                values.push(value);
            }
            row_ptrs.push(values.len());
        }

        CsrMatrix::from_parts(values, col_indices, row_ptrs, documents.len(), self.input_length)
    }
}

/// Builder for [`Quantizer`].
#[derive(Debug, Clone, Default)]
pub struct QuantizerBuilder {
    alphabet: Option<Alphabet>,
    input_length: Option<usize>,
    padding: Option<Padding>,
    reverse: Option<bool>,
}

impl QuantizerBuilder {
    /// Override the alphabet.
    #[must_use]
    pub fn alphabet(mut self, alphabet: impl Into<Alphabet>) -> Self {
        self.alphabet = Some(alphabet.into());
        self
    }

    /// Override the window width.
    #[must_use]
    pub fn input_length(mut self, input_length: usize) -> Self {
        self.input_length = Some(input_length);
        self
    }

    /// Override the padding mode.
    #[must_use]
    pub fn padding(mut self, padding: Padding) -> Self {
        self.padding = Some(padding);
        self
    }

    /// Override reversal.
    #[must_use]
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = Some(reverse);
        self
    }

    /// Build a quantizer emitting `i32`.
    #[must_use]
    pub fn build(self) -> Quantizer<i32> {
        self.build_as()
    }

    /// Build a quantizer emitting `T`.
    #[must_use]
    pub fn build_as<T: QuantIndex>(self) -> Quantizer<T> {
        let alphabet = self.alphabet.unwrap_or_default();
        let symbol_map = SymbolMap::from_alphabet(&alphabet);
        Quantizer {
            alphabet,
            input_length: self.input_length.unwrap_or(DEFAULT_INPUT_LENGTH),
            padding: self.padding.unwrap_or_default(),
            reverse: self.reverse.unwrap_or(true),
            symbol_map,
            _index: std::marker::PhantomData,
        }
    }
}
