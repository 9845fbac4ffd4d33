//! Trial driver.
//!
//! A [`Tuner`] repeatedly asks its [`SearchStrategy`] for a configuration,
//! runs the caller's build-and-train closure against it through a
//! [`SearchParameters`] source, scores the run by its [`Objective`] and
//! feeds the result back to the strategy.
//!
//! The first trial always runs with every parameter at its default. That
//! run is also what declares the search space, so model-based strategies
//! only start suggesting from the second trial on.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::automl::search::{SearchSpace, SearchStrategy, Trial, TrialResult};
use crate::error::{CharCnnError, Result};
use crate::hyper::SearchParameters;

/// Whether larger or smaller metric values are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Max,
    Min,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Max => f.write_str("max"),
            Direction::Min => f.write_str("min"),
        }
    }
}

/// The metric a search optimizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    /// Metric name as reported by an execution.
    pub name: String,
    /// Which way is better.
    pub direction: Direction,
}

impl Objective {
    /// Maximize `name`.
    #[must_use]
    pub fn maximize(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Max,
        }
    }

    /// Minimize `name`.
    #[must_use]
    pub fn minimize(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Min,
        }
    }

    /// Direction inferred from the metric name: losses and errors are
    /// minimized, everything else is maximized.
    #[must_use]
    pub fn infer(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.contains("loss") || name.contains("error") {
            Self::minimize(name)
        } else {
            Self::maximize(name)
        }
    }

    /// Orient a metric value so that higher is better.
    #[must_use]
    pub fn score(&self, metric: f64) -> f64 {
        match self.direction {
            Direction::Max => metric,
            Direction::Min => -metric,
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Objective(name=\"{}\", direction=\"{}\")", self.name, self.direction)
    }
}

/// Outcome of one build-and-train run.
#[derive(Debug, Clone)]
pub struct Execution<M> {
    /// Final metrics of the run.
    pub metrics: BTreeMap<String, f64>,
    /// The trained model.
    pub model: M,
}

/// Result of a completed search.
#[derive(Debug)]
pub struct TuneResult<M> {
    /// Best trial, if any trial ran.
    pub best_trial: Option<TrialResult>,
    /// Model from the best execution of the best trial.
    pub best_model: Option<M>,
    /// Every trial in run order.
    pub history: Vec<TrialResult>,
    /// The space as declared by the runs.
    pub space: SearchSpace,
    /// Wall-clock duration of the search.
    pub elapsed: Duration,
}

impl<M> TuneResult<M> {
    /// Number of completed trials.
    #[must_use]
    pub fn n_trials(&self) -> usize {
        self.history.len()
    }

    /// Human-readable listing of the best `top_n` trials.
    #[must_use]
    pub fn summary(&self, objective: &Objective, top_n: usize) -> String {
        let mut ranked: Vec<&TrialResult> = self.history.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(top_n);

        let mut out = format!("Results summary\nShowing {} best trials\n{objective}\n", ranked.len());
        for result in ranked {
            out.push_str(&format!("\nTrial {} summary\nHyperparameters:\n", result.trial_id));
            for (name, value) in &result.trial.values {
                out.push_str(&format!("{name}: {value}\n"));
            }
            let metric = result.metrics.get(&objective.name).copied().unwrap_or(f64::NAN);
            out.push_str(&format!("Score: {metric}\n"));
        }
        out
    }
}

#[derive(Serialize)]
struct TrialRecord<'a> {
    trial_id: usize,
    status: &'static str,
    hyperparameters: &'a Trial,
    metrics: &'a BTreeMap<String, f64>,
    score: f64,
}

#[derive(Serialize)]
struct OracleRecord<'a> {
    objective: &'a Objective,
    max_trials: usize,
    executions_per_trial: usize,
    space: &'a SearchSpace,
    trials: Vec<usize>,
    best_trial: Option<usize>,
}

/// Drives trials for a [`SearchStrategy`].
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use charcnn::automl::{Execution, Objective, RandomSearch, Tuner};
/// use charcnn::hyper::{FloatRange, HyperParameters};
///
/// let mut tuner = Tuner::new(RandomSearch::new(5).with_seed(1), Objective::minimize("loss"))
///     .max_trials(5)
///     .executions_per_trial(1);
///
/// let result = tuner
///     .search(|hp, _| {
///         let x = hp.float(0.0, FloatRange::new("x", -1.0, 1.0));
///         let metrics = BTreeMap::from([("loss".to_string(), x * x)]);
///         Ok(Execution { metrics, model: x })
///     })
///     .unwrap();
///
/// assert_eq!(result.n_trials(), 5);
/// // the default run scores a perfect 0
/// assert_eq!(result.best_model, Some(0.0));
/// ```
#[derive(Debug)]
pub struct Tuner<S> {
    strategy: S,
    objective: Objective,
    max_trials: usize,
    executions_per_trial: usize,
    directory: Option<PathBuf>,
    project_name: String,
}

impl<S: SearchStrategy> Tuner<S> {
    /// Tuner with one trial, one execution per trial and no project directory.
    #[must_use]
    pub fn new(strategy: S, objective: Objective) -> Self {
        Self {
            strategy,
            objective,
            max_trials: 1,
            executions_per_trial: 1,
            directory: None,
            project_name: "hyper-search".to_string(),
        }
    }

    /// Trial budget.
    #[must_use]
    pub fn max_trials(mut self, n: usize) -> Self {
        self.max_trials = n;
        self
    }

    /// Runs averaged per trial.
    #[must_use]
    pub fn executions_per_trial(mut self, n: usize) -> Self {
        self.executions_per_trial = n.max(1);
        self
    }

    /// Persist trial records under `directory/project_name`.
    #[must_use]
    pub fn directory(mut self, directory: Option<PathBuf>) -> Self {
        self.directory = directory;
        self
    }

    /// Project subdirectory name.
    #[must_use]
    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = name.into();
        self
    }

    /// The objective.
    #[must_use]
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Where trial records go, if anywhere.
    #[must_use]
    pub fn project_dir(&self) -> Option<PathBuf> {
        self.directory.as_ref().map(|d| d.join(&self.project_name))
    }

    /// Run the search.
    ///
    /// `execute` is called once per execution with the parameter source
    /// for the current trial and the execution index.
    ///
    /// # Errors
    ///
    /// Any error from `execute` aborts the search and is returned as is.
    /// An execution that does not report the objective metric fails with
    /// [`CharCnnError::MissingObjective`]. Failing to write trial records
    /// returns the I/O or serialization error.
    pub fn search<M, F>(&mut self, mut execute: F) -> Result<TuneResult<M>>
    where
        F: FnMut(&mut SearchParameters, usize) -> Result<Execution<M>>,
    {
        let start = Instant::now();
        let mut hp = SearchParameters::new();
        let mut history: Vec<TrialResult> = Vec::new();
        let mut best: Option<(TrialResult, M)> = None;

        if let Some(dir) = self.project_dir() {
            fs::create_dir_all(&dir)?;
        }

        for trial_id in 0..self.max_trials {
            let trial = if trial_id == 0 {
                Trial::empty()
            } else if hp.space().tunable_names().is_empty() {
                info!("search space has no tunable parameters, stopping after the default trial");
                break;
            } else {
                match self.strategy.suggest(hp.space(), 1).pop() {
                    Some(trial) => trial,
                    None => break,
                }
            };

            let (result, model) = self.run_trial(trial_id, trial, &mut hp, &mut execute)?;
            self.strategy.update(hp.space(), std::slice::from_ref(&result));

            info!(
                trial = trial_id,
                score = result.score,
                "trial complete {}",
                result.trial
            );
            if let Some(dir) = self.project_dir() {
                self.write_trial(&dir, &result)?;
            }

            let improved = best
                .as_ref()
                .map_or(true, |(incumbent, _)| result.score > incumbent.score);
            if improved {
                best = Some((result.clone(), model));
            }
            history.push(result);
        }

        let (best_trial, best_model) = match best {
            Some((trial, model)) => (Some(trial), Some(model)),
            None => (None, None),
        };

        let space = hp.into_space();
        if let Some(dir) = self.project_dir() {
            self.write_oracle(&dir, &space, &history, best_trial.as_ref())?;
        }

        Ok(TuneResult {
            best_trial,
            best_model,
            history,
            space,
            elapsed: start.elapsed(),
        })
    }

    fn run_trial<M, F>(
        &self,
        trial_id: usize,
        trial: Trial,
        hp: &mut SearchParameters,
        execute: &mut F,
    ) -> Result<(TrialResult, M)>
    where
        F: FnMut(&mut SearchParameters, usize) -> Result<Execution<M>>,
    {
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        let mut best_run: Option<(f64, M)> = None;
        let mut used = Trial::empty();

        for execution in 0..self.executions_per_trial {
            hp.begin_trial(trial.clone());
            let run = execute(hp, execution)?;
            used = hp.resolved_trial();

            let metric = run.metrics.get(&self.objective.name).copied().ok_or_else(|| {
                CharCnnError::MissingObjective {
                    objective: self.objective.name.clone(),
                    trial: trial_id,
                }
            })?;
            debug!(trial = trial_id, execution, metric, "execution complete");

            for (name, value) in &run.metrics {
                *sums.entry(name.clone()).or_insert(0.0) += value;
            }

            let score = sanitize(self.objective.score(metric));
            if best_run.as_ref().map_or(true, |(s, _)| score > *s) {
                best_run = Some((score, run.model));
            }
        }

        let n = self.executions_per_trial as f64;
        let metrics: BTreeMap<String, f64> =
            sums.into_iter().map(|(name, sum)| (name, sum / n)).collect();
        let averaged = metrics
            .get(&self.objective.name)
            .copied()
            .unwrap_or(f64::NAN);
        let score = self.objective.score(averaged);
        let score = if score.is_finite() {
            score
        } else {
            warn!(
                trial = trial_id,
                objective = %self.objective.name,
                "non-finite objective, ranking trial last"
            );
            f64::NEG_INFINITY
        };

        let model = best_run
            .map(|(_, model)| model)
            .ok_or(CharCnnError::NoTrials)?;
        let result = TrialResult {
            trial_id,
            trial: used,
            score,
            metrics,
        };
        Ok((result, model))
    }

    fn write_trial(&self, project: &Path, result: &TrialResult) -> Result<()> {
        let dir = project.join(format!("trial_{}", result.trial_id));
        fs::create_dir_all(&dir)?;
        let record = TrialRecord {
            trial_id: result.trial_id,
            status: "COMPLETED",
            hyperparameters: &result.trial,
            metrics: &result.metrics,
            score: result.score,
        };
        let path = dir.join("trial.json");
        fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        debug!(path = %path.display(), "wrote trial record");
        Ok(())
    }

    fn write_oracle(
        &self,
        project: &Path,
        space: &SearchSpace,
        history: &[TrialResult],
        best: Option<&TrialResult>,
    ) -> Result<()> {
        let record = OracleRecord {
            objective: &self.objective,
            max_trials: self.max_trials,
            executions_per_trial: self.executions_per_trial,
            space,
            trials: history.iter().map(|r| r.trial_id).collect(),
            best_trial: best.map(|r| r.trial_id),
        };
        let path = project.join("oracle.json");
        fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        debug!(path = %path.display(), "wrote oracle record");
        Ok(())
    }
}

fn sanitize(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        f64::NEG_INFINITY
    }
}

#[cfg(test)]
#[path = "tuner_tests.rs"]
mod tests;
