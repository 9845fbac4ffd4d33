//! Core traits for text preprocessing steps.
//!
//! A text transformer turns raw documents into a numeric representation
//! following the fit/transform convention, so steps compose in pipelines
//! regardless of whether `fit` actually learns anything from the corpus.

/// Trait for transformers from raw text documents.
///
/// # Examples
///
/// ```
/// use charcnn::text::Quantizer;
/// use charcnn::traits::TextTransformer;
///
/// let mut quantizer: Quantizer = Quantizer::new();
/// let encoded = quantizer.fit_transform(&["abc", "de"]);
/// assert_eq!(encoded.shape(), [2, 250]);
/// ```
pub trait TextTransformer {
    /// Representation produced for a batch of documents.
    type Output;

    /// Fits the transformer to a corpus.
    fn fit<S: AsRef<str>>(&mut self, documents: &[S]);

    /// Transforms documents using the fitted state.
    fn transform<S: AsRef<str> + Sync>(&self, documents: &[S]) -> Self::Output;

    /// Fits and transforms in one step.
    fn fit_transform<S: AsRef<str> + Sync>(&mut self, documents: &[S]) -> Self::Output {
        self.fit(documents);
        self.transform(documents)
    }
}
