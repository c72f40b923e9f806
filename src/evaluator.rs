//! Objective evaluation.
//!
//! An evaluator turns a decision vector into an objective vector (all
//! objectives minimized). Evaluators never clip their input; the genetic
//! operators are responsible for staying inside the bounds.

use rayon::prelude::*;

use crate::error::{EngineError, Result};
use crate::surrogate::{FeatureMap, ModelBundle};

/// Fixed-arity objective function over bounded decision vectors.
pub trait Evaluator: Sync {
    fn num_objectives(&self) -> usize;

    fn evaluate(&self, x: &[f64]) -> Result<Vec<f64>>;

    /// Evaluate many decision vectors. The output is in input order.
    fn evaluate_batch(&self, xs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        xs.iter().map(|x| self.evaluate(x)).collect()
    }
}

/// Objectives computed from a [`ModelBundle`]: one surrogate call per
/// objective target, over the fixed process state plus the decision vector
/// mapped onto the control fields.
#[derive(Debug)]
pub struct SurrogateEvaluator<'a> {
    models: &'a ModelBundle,
    state: FeatureMap,
    controls: Vec<String>,
    objectives: Vec<String>,
    parallel: bool,
}

impl<'a> SurrogateEvaluator<'a> {
    /// Fails with an evaluation error if an objective target has no model,
    /// and with a configuration error if a control name collides with a
    /// process-state feature.
    pub fn new(
        models: &'a ModelBundle,
        state: FeatureMap,
        controls: Vec<String>,
        objectives: Vec<String>,
    ) -> Result<Self> {
        if let Some(missing) = objectives.iter().find(|t| !models.contains(t)) {
            return Err(EngineError::evaluation(
                missing.as_str(),
                "no model registered for target",
            ));
        }
        if let Some(dup) = controls.iter().find(|c| state.contains_key(*c)) {
            return Err(EngineError::config(format!(
                "control '{}' shadows a process state feature",
                dup
            )));
        }
        Ok(Self {
            models,
            state,
            controls,
            objectives,
            parallel: false,
        })
    }

    /// Evaluate batches across the rayon thread pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn objectives(&self) -> &[String] {
        &self.objectives
    }

    /// Feature map for decision vector `x`.
    pub fn features(&self, x: &[f64]) -> FeatureMap {
        let mut features = self.state.clone();
        for (name, value) in self.controls.iter().zip(x) {
            features.insert(name.clone(), *value);
        }
        features
    }
}

impl Evaluator for SurrogateEvaluator<'_> {
    fn num_objectives(&self) -> usize {
        self.objectives.len()
    }

    fn evaluate(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() != self.controls.len() {
            return Err(EngineError::evaluation(
                "<decision>",
                format!("expected {} variables, got {}", self.controls.len(), x.len()),
            ));
        }
        let features = self.features(x);
        self.objectives
            .iter()
            .map(|target| self.models.predict(target, &features))
            .collect()
    }

    fn evaluate_batch(&self, xs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if self.parallel {
            xs.par_iter().map(|x| self.evaluate(x)).collect()
        } else {
            xs.iter().map(|x| self.evaluate(x)).collect()
        }
    }
}

/// Evaluator backed by a plain function. Non-finite outputs are rejected.
pub struct FnEvaluator<F> {
    num_objectives: usize,
    f: F,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&[f64]) -> Vec<f64> + Sync,
{
    pub fn new(num_objectives: usize, f: F) -> Self {
        Self { num_objectives, f }
    }
}

impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(&[f64]) -> Vec<f64> + Sync,
{
    fn num_objectives(&self) -> usize {
        self.num_objectives
    }

    fn evaluate(&self, x: &[f64]) -> Result<Vec<f64>> {
        let f = (self.f)(x);
        if f.len() != self.num_objectives {
            return Err(EngineError::evaluation(
                "<objective>",
                format!("expected {} objectives, got {}", self.num_objectives, f.len()),
            ));
        }
        if let Some(bad) = f.iter().position(|v| !v.is_finite()) {
            return Err(EngineError::evaluation(
                format!("objective[{}]", bad),
                format!("non-finite value {}", f[bad]),
            ));
        }
        Ok(f)
    }
}
