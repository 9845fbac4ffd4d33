//! Hyperparameter search.
//!
//! - [`search`]: search spaces, trials and random search
//! - [`tpe`]: Tree-structured Parzen Estimator (Bayesian optimization)
//! - [`tuner`]: the trial loop that runs a build-and-train closure
//!
//! # References
//!
//! Bergstra et al. (2011). Algorithms for Hyper-Parameter Optimization. NeurIPS.

pub mod search;
pub mod tpe;
pub mod tuner;

pub use search::{
    HyperParam, ParamValue, RandomSearch, Sampling, SearchSpace, SearchStrategy, Trial,
    TrialResult,
};
pub use tpe::{TPEConfig, TPE};
pub use tuner::{Direction, Execution, Objective, TuneResult, Tuner};
