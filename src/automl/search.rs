//! Search space and random search.
//!
//! A [`SearchSpace`] maps parameter names to [`HyperParam`] definitions.
//! Names are kept in a `BTreeMap`, so iteration order (and therefore the
//! dimension order seen by model-based strategies) is deterministic.
//!
//! # References
//!
//! Bergstra & Bengio (2012). Random Search for Hyper-Parameter Optimization. JMLR.

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// How a numeric range is explored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampling {
    /// Uniform over the range.
    #[default]
    Linear,
    /// Uniform over the logarithm; denser near `min`.
    Log,
    /// Mirror image of [`Sampling::Log`]; denser near `max`.
    ReverseLog,
}

impl Sampling {
    /// Map a point of the unit interval into `[low, high]`.
    #[must_use]
    pub fn scale(self, u: f64, low: f64, high: f64) -> f64 {
        let u = u.clamp(0.0, 1.0);
        match self {
            Sampling::Linear => low + u * (high - low),
            Sampling::Log => log_interp(u, low, high),
            Sampling::ReverseLog => high + low - log_interp(1.0 - u, low, high),
        }
    }

    /// Map a value of `[low, high]` back onto the unit interval.
    #[must_use]
    pub fn unscale(self, value: f64, low: f64, high: f64) -> f64 {
        if high <= low {
            return 0.0;
        }
        let u = match self {
            Sampling::Linear => (value - low) / (high - low),
            Sampling::Log => log_unit(value, low, high),
            Sampling::ReverseLog => 1.0 - log_unit(high + low - value, low, high),
        };
        if u.is_finite() {
            u.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

fn log_interp(u: f64, low: f64, high: f64) -> f64 {
    if low <= 0.0 || high <= 0.0 {
        return low + u * (high - low);
    }
    (low.ln() + u * (high.ln() - low.ln())).exp()
}

fn log_unit(value: f64, low: f64, high: f64) -> f64 {
    if low <= 0.0 || high <= 0.0 || value <= 0.0 {
        return (value - low) / (high - low);
    }
    (value.ln() - low.ln()) / (high.ln() - low.ln())
}

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    /// Get as f64 if numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as i64 if integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v:.6}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
        }
    }
}

/// Definition of one searchable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HyperParam {
    /// Continuous parameter in [low, high].
    Continuous {
        low: f64,
        high: f64,
        step: Option<f64>,
        sampling: Sampling,
    },
    /// Integer parameter in [low, high].
    Integer {
        low: i64,
        high: i64,
        step: i64,
        sampling: Sampling,
    },
    /// Parameter with discrete choices.
    Categorical { choices: Vec<ParamValue> },
    /// Parameter pinned to one value.
    Fixed { value: ParamValue },
}

impl HyperParam {
    /// Continuous parameter sampled uniformly.
    #[must_use]
    pub fn continuous(low: f64, high: f64) -> Self {
        Self::Continuous {
            low,
            high,
            step: None,
            sampling: Sampling::Linear,
        }
    }

    /// Continuous parameter sampled on a log scale.
    #[must_use]
    pub fn continuous_log(low: f64, high: f64) -> Self {
        Self::Continuous {
            low,
            high,
            step: None,
            sampling: Sampling::Log,
        }
    }

    /// Integer parameter with unit step.
    #[must_use]
    pub fn integer(low: i64, high: i64) -> Self {
        Self::Integer {
            low,
            high,
            step: 1,
            sampling: Sampling::Linear,
        }
    }

    /// Categorical parameter from choices.
    #[must_use]
    pub fn categorical<I, V>(choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        Self::Categorical {
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    /// Boolean parameter.
    #[must_use]
    pub fn boolean() -> Self {
        Self::categorical([false, true])
    }

    /// Sample a random value from this parameter's distribution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self {
            Self::Fixed { value } => value.clone(),
            Self::Categorical { choices } if choices.is_empty() => ParamValue::Bool(false),
            _ => self.value_at(rng.gen::<f64>()),
        }
    }

    /// Whether a model-based search varies this parameter. Fixed
    /// parameters are not varied.
    #[must_use]
    pub fn is_tunable(&self) -> bool {
        !matches!(self, Self::Fixed { .. })
    }

    /// Value at a point of the unit interval.
    #[must_use]
    pub fn value_at(&self, u: f64) -> ParamValue {
        let u = u.clamp(0.0, 1.0);
        match self {
            Self::Continuous {
                low,
                high,
                step,
                sampling,
            } => {
                let v = sampling.scale(u, *low, *high);
                ParamValue::Float(snap_float(v, *low, *high, *step))
            }
            Self::Integer {
                low,
                high,
                step,
                sampling,
            } => {
                // widen by one so the top value has a full bucket
                let v = sampling.scale(u, *low as f64, (*high + 1) as f64).floor() as i64;
                ParamValue::Int(snap_int(v, *low, *high, *step))
            }
            Self::Categorical { choices } => {
                let idx = (u * choices.len() as f64).floor() as usize;
                let idx = idx.min(choices.len().saturating_sub(1));
                choices
                    .get(idx)
                    .cloned()
                    .unwrap_or(ParamValue::Bool(false))
            }
            Self::Fixed { value } => value.clone(),
        }
    }

    /// Position of a value on the unit interval, or `None` if the value
    /// does not belong to this parameter.
    #[must_use]
    pub fn position_of(&self, value: &ParamValue) -> Option<f64> {
        match self {
            Self::Continuous {
                low,
                high,
                sampling,
                ..
            } => value.as_f64().map(|v| sampling.unscale(v, *low, *high)),
            Self::Integer {
                low,
                high,
                sampling,
                ..
            } => value.as_f64().map(|v| {
                // bucket centre, the inverse of the flooring in value_at
                sampling.unscale(v + 0.5, *low as f64, (*high + 1) as f64)
            }),
            Self::Categorical { choices } => {
                let idx = choices.iter().position(|c| c == value)?;
                Some((idx as f64 + 0.5) / choices.len() as f64)
            }
            Self::Fixed { .. } => Some(0.5),
        }
    }

    /// Bring a value inside this parameter's domain.
    ///
    /// Numbers are clamped (and snapped to the step); a categorical value
    /// outside the choices yields `fallback`.
    #[must_use]
    pub fn constrain(&self, value: &ParamValue, fallback: &ParamValue) -> ParamValue {
        match self {
            Self::Continuous {
                low, high, step, ..
            } => match value.as_f64() {
                Some(v) if v.is_finite() => ParamValue::Float(snap_float(v, *low, *high, *step)),
                _ => fallback.clone(),
            },
            Self::Integer {
                low, high, step, ..
            } => match value.as_i64() {
                Some(v) => ParamValue::Int(snap_int(v, *low, *high, *step)),
                None => fallback.clone(),
            },
            Self::Categorical { choices } => {
                if choices.contains(value) {
                    value.clone()
                } else if choices.contains(fallback) || choices.is_empty() {
                    fallback.clone()
                } else {
                    choices[0].clone()
                }
            }
            Self::Fixed { value } => value.clone(),
        }
    }
}

impl fmt::Display for HyperParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous {
                low,
                high,
                step,
                sampling,
            } => {
                write!(f, "Float [{low}, {high}] sampling={sampling:?}")?;
                if let Some(step) = step {
                    write!(f, " step={step}")?;
                }
                Ok(())
            }
            Self::Integer {
                low,
                high,
                step,
                sampling,
            } => write!(f, "Int [{low}, {high}] step={step} sampling={sampling:?}"),
            Self::Categorical { choices } => {
                let choices: Vec<String> = choices.iter().map(ToString::to_string).collect();
                write!(f, "Choice {{{}}}", choices.join(", "))
            }
            Self::Fixed { value } => write!(f, "Fixed {value}"),
        }
    }
}

fn snap_float(v: f64, low: f64, high: f64, step: Option<f64>) -> f64 {
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    let v = match step {
        Some(step) if step > 0.0 => low + ((v - low) / step).round() * step,
        _ => v,
    };
    v.clamp(low, high)
}

fn snap_int(v: i64, low: i64, high: i64, step: i64) -> i64 {
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    let v = v.clamp(low, high);
    if step > 1 {
        let snapped = low + (v - low) / step * step;
        snapped.clamp(low, high)
    } else {
        v
    }
}

/// Named hyperparameter definitions.
///
/// # Example
///
/// ```
/// use charcnn::automl::{HyperParam, SearchSpace};
///
/// let space = SearchSpace::new()
///     .add_param("learning_rate", HyperParam::continuous_log(1e-4, 5e-4))
///     .add_param("filters", HyperParam::integer(64, 1024));
///
/// assert_eq!(space.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    params: BTreeMap<String, HyperParam>,
}

impl SearchSpace {
    /// Create an empty search space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parameters in the space.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if space is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Add (or replace) a parameter definition.
    #[must_use]
    pub fn add_param(mut self, name: impl Into<String>, param: HyperParam) -> Self {
        self.params.insert(name.into(), param);
        self
    }

    /// Register a parameter unless the name is already taken.
    ///
    /// Returns the definition now in force for `name`.
    pub fn register(&mut self, name: &str, param: HyperParam) -> &HyperParam {
        self.params.entry(name.to_string()).or_insert(param)
    }

    /// Whether a parameter is defined.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Get parameter definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HyperParam> {
        self.params.get(name)
    }

    /// Iterate over parameter definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HyperParam)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names of the parameters a model-based search varies.
    #[must_use]
    pub fn tunable_names(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, p)| p.is_tunable())
            .map(|(k, _)| k)
            .collect()
    }

    /// Sample a random configuration.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Trial {
        Trial {
            values: self
                .params
                .iter()
                .map(|(k, p)| (k.clone(), p.sample(rng)))
                .collect(),
        }
    }

    /// Human-readable listing, one parameter per line.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!("Search space summary\nDefault search space size: {}\n", self.len());
        for (name, param) in &self.params {
            out.push_str(&format!("{name} ({param})\n"));
        }
        out
    }
}

/// A hyperparameter configuration to evaluate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Parameter values for this trial.
    pub values: BTreeMap<String, ParamValue>,
}

impl Trial {
    /// A trial with no assigned values; every parameter takes its default.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get a parameter value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Get parameter as f64.
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(ParamValue::as_f64)
    }

    /// Get parameter as i64.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(ParamValue::as_i64)
    }

    /// Get parameter as bool.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(ParamValue::as_bool)
    }

    /// Set a parameter value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }
}

impl fmt::Display for Trial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .values
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "{{{}}}", params.join(", "))
    }
}

/// Result of evaluating a trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// Zero-based trial number.
    pub trial_id: usize,
    /// The configuration actually used.
    pub trial: Trial,
    /// Objective score, oriented so that higher is better.
    pub score: f64,
    /// Metrics averaged over executions.
    pub metrics: BTreeMap<String, f64>,
}

/// Search strategy for hyperparameter optimization.
pub trait SearchStrategy {
    /// Generate up to `n` candidate configurations to evaluate.
    fn suggest(&mut self, space: &SearchSpace, n: usize) -> Vec<Trial>;

    /// Update strategy with evaluation results (for adaptive methods).
    ///
    /// `space` is the space the results were drawn from; it may have grown
    /// since the last call to `suggest`.
    fn update(&mut self, _space: &SearchSpace, _results: &[TrialResult]) {}

    /// Trials the strategy is still willing to suggest.
    fn remaining(&self) -> usize;
}

/// Random search optimizer.
///
/// # Example
///
/// ```
/// use charcnn::automl::{HyperParam, RandomSearch, SearchSpace, SearchStrategy};
///
/// let space = SearchSpace::new().add_param("units", HyperParam::integer(16, 256));
///
/// let mut search = RandomSearch::new(50).with_seed(42);
/// let trials = search.suggest(&space, 10);
///
/// assert_eq!(trials.len(), 10);
/// ```
#[derive(Debug, Clone)]
pub struct RandomSearch {
    n_iter: usize,
    seed: u64,
    rng: StdRng,
    trials_generated: usize,
}

impl RandomSearch {
    /// Create random search with n iterations.
    #[must_use]
    pub fn new(n_iter: usize) -> Self {
        Self {
            n_iter,
            seed: 42,
            rng: StdRng::seed_from_u64(42),
            trials_generated: 0,
        }
    }

    /// Set random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// The seed in use.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, space: &SearchSpace, n: usize) -> Vec<Trial> {
        let n = n.min(self.remaining());
        let trials: Vec<Trial> = (0..n).map(|_| space.sample(&mut self.rng)).collect();
        self.trials_generated += trials.len();
        trials
    }

    fn remaining(&self) -> usize {
        self.n_iter.saturating_sub(self.trials_generated)
    }
}

#[cfg(test)]
#[path = "search_tests.rs"]
mod tests;
