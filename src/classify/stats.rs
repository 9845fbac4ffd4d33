//! Statistics describing a predicted distribution.
//!
//! Each statistic is accumulated in `f64` with the smallest positive
//! double added to every probability, then censored into positive `f32`.

use serde::{Deserialize, Serialize};

/// Summary of one predicted distribution `p` against a reference `q`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PredictionStats {
    /// `1 - Σ p²`.
    pub gini_impurity: f32,
    /// Kullback-Leibler divergence `Σ p log2(p / q)`.
    pub relative_entropy: f32,
    /// `-Σ p log2 p`.
    pub shannon_entropy: f32,
}

impl PredictionStats {
    /// Statistics of `p` against `q`. Extra entries of the longer slice are
    /// ignored.
    #[must_use]
    pub fn compute(p: &[f32], q: &[f32]) -> Self {
        let (mut gi, mut re, mut se) = (0.0_f64, 0.0_f64, 0.0_f64);
        for (&p32, &q32) in p.iter().zip(q) {
            let pk = f64::from(p32) + f64::from_bits(1);
            let qk = f64::from(q32) + f64::from_bits(1);
            gi += pk.powi(2);
            re += pk * (pk / qk).log2();
            se += pk * pk.log2();
        }
        Self {
            gini_impurity: censor(1.0 - gi),
            relative_entropy: censor(re),
            shannon_entropy: censor(-se),
        }
    }
}

/// Narrow to `f32`, clamping into the positive finite range.
///
/// Values above `f32::MAX` (including +∞) become `f32::MAX`; values below
/// the smallest positive `f32` (including -∞ and zero) become that
/// smallest value. NaN passes through.
#[must_use]
pub fn censor(value: f64) -> f32 {
    let smallest = f32::from_bits(1);
    if value > f64::from(f32::MAX) {
        f32::MAX
    } else if value < f64::from(smallest) {
        smallest
    } else {
        value as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f32 = 1e-6;
    const SMALLEST_F32: f32 = 1.0e-45;

    #[test]
    fn test_reference_values() {
        let s = PredictionStats::compute(&[0.25, 0.75], &[0.5, 0.5]);
        assert!((s.gini_impurity - 0.375).abs() < TOL);
        assert!((s.relative_entropy - 0.188_721_9).abs() < TOL);
        assert!((s.shannon_entropy - 0.811_278_1).abs() < TOL);
    }

    #[test]
    fn test_near_degenerate_distributions() {
        let a = f32::from_bits(1);
        let b = 1.0 - a;
        let s = PredictionStats::compute(&[b, a], &[a, b]);
        assert!((s.gini_impurity - a).abs() < TOL);
        assert!((s.relative_entropy - 149.0).abs() < 1e-3);
        assert!(s.shannon_entropy.abs() < TOL);
    }

    #[test]
    fn test_zero_reference_probability_saturates() {
        let s = PredictionStats::compute(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((s.gini_impurity - SMALLEST_F32).abs() < TOL);
        assert_eq!(s.relative_entropy, f32::MAX);
        assert!(s.shannon_entropy.abs() < TOL);
    }

    #[test]
    fn test_censor() {
        assert_eq!(censor(f64::MAX), f32::MAX);
        assert_eq!(censor(f64::INFINITY), f32::MAX);
        assert_eq!(censor(f64::from_bits(1)), f32::from_bits(1));
        assert_eq!(censor(f64::NEG_INFINITY), f32::from_bits(1));
        assert_eq!(censor(std::f64::consts::PI), std::f32::consts::PI);
        assert!(censor(f64::NAN).is_nan());
    }

    #[test]
    fn test_serialized_keys() {
        let s = PredictionStats::compute(&[0.5, 0.5], &[0.5, 0.5]);
        let json = serde_json::to_value(s).unwrap();
        assert!(json.get("gini-impurity").is_some());
        assert!(json.get("relative-entropy").is_some());
        assert!(json.get("shannon-entropy").is_some());
    }
}
