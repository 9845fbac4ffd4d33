//! Hyperparameter sources.
//!
//! Model-building code asks a [`HyperParameters`] source for every tunable
//! value, passing the default first and a descriptor of the searchable
//! range second. The same building routine then runs in two modes:
//!
//! - [`HyperDefaulter`] answers every query with its default, giving a
//!   plain fixed-configuration build;
//! - [`SearchParameters`] records each declared parameter into a
//!   [`SearchSpace`] and answers from the trial a tuner is evaluating.
//!
//! # Example
//!
//! ```
//! use charcnn::hyper::{FloatRange, HyperDefaulter, HyperParameters, Sampling, SearchParameters};
//!
//! fn learning_rate(hp: &mut impl HyperParameters) -> f64 {
//!     hp.float(1.5e-4, FloatRange::new("learning_rate", 1e-4, 5e-4).sampling(Sampling::Log))
//! }
//!
//! assert_eq!(learning_rate(&mut HyperDefaulter), 1.5e-4);
//!
//! let mut search = SearchParameters::new();
//! assert_eq!(learning_rate(&mut search), 1.5e-4);
//! assert!(search.space().contains("learning_rate"));
//! ```

use std::collections::BTreeMap;

use tracing::debug;

pub use crate::automl::{ParamValue, Sampling};
use crate::automl::{HyperParam, SearchSpace, Trial};

/// Descriptor of a float parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatRange {
    /// Parameter name.
    pub name: String,
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
    /// Quantization step, if any.
    pub step: Option<f64>,
    /// How the range is explored.
    pub sampling: Sampling,
}

impl FloatRange {
    /// Linear range with no step.
    #[must_use]
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            step: None,
            sampling: Sampling::Linear,
        }
    }

    /// Set the step.
    #[must_use]
    pub fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// Set the sampling.
    #[must_use]
    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }
}

impl From<&FloatRange> for HyperParam {
    fn from(range: &FloatRange) -> Self {
        HyperParam::Continuous {
            low: range.min,
            high: range.max,
            step: range.step,
            sampling: range.sampling,
        }
    }
}

/// Descriptor of an integer parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct IntRange {
    /// Parameter name.
    pub name: String,
    /// Lower bound, inclusive.
    pub min: i64,
    /// Upper bound, inclusive.
    pub max: i64,
    /// Step between admissible values.
    pub step: i64,
    /// How the range is explored.
    pub sampling: Sampling,
}

impl IntRange {
    /// Linear range with unit step.
    #[must_use]
    pub fn new(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            step: 1,
            sampling: Sampling::Linear,
        }
    }

    /// Set the step.
    #[must_use]
    pub fn step(mut self, step: i64) -> Self {
        self.step = step.max(1);
        self
    }

    /// Set the sampling.
    #[must_use]
    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }
}

impl From<&IntRange> for HyperParam {
    fn from(range: &IntRange) -> Self {
        HyperParam::Integer {
            low: range.min,
            high: range.max,
            step: range.step,
            sampling: range.sampling,
        }
    }
}

/// Descriptor of a categorical parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// Parameter name.
    pub name: String,
    /// Admissible values.
    pub values: Vec<ParamValue>,
}

impl Choice {
    /// Choice among `values`.
    #[must_use]
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// A source of hyperparameter values.
///
/// Each query takes the default (or fixed value) first and a descriptor
/// second.
pub trait HyperParameters {
    /// A boolean switch.
    fn boolean(&mut self, default: bool, name: &str) -> bool;

    /// One of a set of values.
    fn choice(&mut self, default: ParamValue, spec: Choice) -> ParamValue;

    /// A value that is recorded but never varied.
    fn fixed(&mut self, value: ParamValue, name: &str) -> ParamValue;

    /// A float in a range.
    fn float(&mut self, default: f64, spec: FloatRange) -> f64;

    /// An integer in a range.
    fn int(&mut self, default: i64, spec: IntRange) -> i64;
}

/// Answers every query with its default and ignores the descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HyperDefaulter;

impl HyperParameters for HyperDefaulter {
    fn boolean(&mut self, default: bool, _name: &str) -> bool {
        default
    }

    fn choice(&mut self, default: ParamValue, _spec: Choice) -> ParamValue {
        default
    }

    fn fixed(&mut self, value: ParamValue, _name: &str) -> ParamValue {
        value
    }

    fn float(&mut self, default: f64, _spec: FloatRange) -> f64 {
        default
    }

    fn int(&mut self, default: i64, _spec: IntRange) -> i64 {
        default
    }
}

/// Search-mode source.
///
/// The first declaration of a name registers it in the search space;
/// later declarations reuse that definition. Queries are answered from
/// the active trial when it assigns the name, otherwise from the default,
/// and the answer is always brought inside the registered bounds.
#[derive(Debug, Clone, Default)]
pub struct SearchParameters {
    space: SearchSpace,
    active: Trial,
    resolved: BTreeMap<String, ParamValue>,
}

impl SearchParameters {
    /// Empty space, no active trial.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing space.
    #[must_use]
    pub fn with_space(space: SearchSpace) -> Self {
        Self {
            space,
            ..Self::default()
        }
    }

    /// Parameters declared so far.
    #[must_use]
    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Consume into the declared space.
    #[must_use]
    pub fn into_space(self) -> SearchSpace {
        self.space
    }

    /// The trial being answered from.
    #[must_use]
    pub fn active(&self) -> &Trial {
        &self.active
    }

    /// Make `trial` the active trial and forget previous answers.
    pub fn begin_trial(&mut self, trial: Trial) {
        self.active = trial;
        self.resolved.clear();
    }

    /// Values handed out since the last [`begin_trial`](Self::begin_trial).
    #[must_use]
    pub fn resolved(&self) -> &BTreeMap<String, ParamValue> {
        &self.resolved
    }

    /// The values handed out, as a trial.
    #[must_use]
    pub fn resolved_trial(&self) -> Trial {
        Trial {
            values: self.resolved.clone(),
        }
    }

    fn answer(&mut self, name: &str, param: HyperParam, default: ParamValue) -> ParamValue {
        if !self.space.contains(name) {
            debug!(name, %param, "registered hyperparameter");
        }
        let param = self.space.register(name, param);
        let value = match self.active.get(name) {
            Some(value) => param.constrain(value, &default),
            None => param.constrain(&default, &default),
        };
        self.resolved.insert(name.to_string(), value.clone());
        value
    }
}

impl HyperParameters for SearchParameters {
    fn boolean(&mut self, default: bool, name: &str) -> bool {
        self.answer(name, HyperParam::boolean(), ParamValue::Bool(default))
            .as_bool()
            .unwrap_or(default)
    }

    fn choice(&mut self, default: ParamValue, spec: Choice) -> ParamValue {
        let param = HyperParam::Categorical {
            choices: spec.values,
        };
        self.answer(&spec.name, param, default)
    }

    fn fixed(&mut self, value: ParamValue, name: &str) -> ParamValue {
        let param = HyperParam::Fixed {
            value: value.clone(),
        };
        self.answer(name, param, value)
    }

    fn float(&mut self, default: f64, spec: FloatRange) -> f64 {
        let param = HyperParam::from(&spec);
        self.answer(&spec.name, param, ParamValue::Float(default))
            .as_f64()
            .unwrap_or(default)
    }

    fn int(&mut self, default: i64, spec: IntRange) -> i64 {
        let param = HyperParam::from(&spec);
        self.answer(&spec.name, param, ParamValue::Int(default))
            .as_i64()
            .unwrap_or(default)
    }
}
