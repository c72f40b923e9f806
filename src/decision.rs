//! End-to-end decision run: NSGA-II search, objective weighting, TOPSIS
//! selection, and the best-point prediction report.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use serde::Serialize;
use tracing::info;

use crate::error::{invalid, Result};
use crate::evaluator::Evaluator;
use crate::nsga2::{hypervolume_2d, GenerationStats, Nsga2, Nsga2Config};
use crate::surrogate::{FeatureMap, ModelBundle};
use crate::topsis::{self, Criterion};
use crate::weighting::{WeightMode, WeightVector};

/// Everything a run needs besides the evaluator
#[derive(Clone, Debug)]
pub struct RunSettings {
    pub optimizer: Nsga2Config,
    pub weights: WeightMode,
    /// Length of the ranked candidate list in the output
    pub top_n: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            optimizer: Nsga2Config::default(),
            weights: WeightMode::Entropy,
            top_n: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RankedCandidate {
    pub index: usize,
    pub score: f64,
}

/// Spread of the TOPSIS closeness scores over the Pareto set. Undefined
/// scores are left out.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub mean: f64,
    pub max: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl ScoreSummary {
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        let defined: Vec<f64> = scores.iter().copied().filter(|s| !s.is_nan()).collect();
        if defined.is_empty() {
            return None;
        }
        let n = defined.len() as f64;
        let mean = defined.iter().sum::<f64>() / n;
        let max = defined.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = defined.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
        Some(Self {
            mean,
            max,
            std_dev: variance.sqrt(),
        })
    }
}

/// Result of a full run
#[derive(Clone, Debug, Serialize)]
pub struct RunOutput {
    /// Pareto set decision vectors, parallel to `pareto_objectives`
    pub pareto_decisions: Vec<Vec<f64>>,
    pub pareto_objectives: Vec<Vec<f64>>,
    pub weights: WeightVector,
    pub weight_method: String,
    /// TOPSIS closeness per Pareto candidate
    pub scores: Vec<f64>,
    pub score_summary: Option<ScoreSummary>,
    pub best_index: usize,
    pub best_decision: Vec<f64>,
    pub best_objectives: Vec<f64>,
    pub ranking: Vec<RankedCandidate>,
    /// Only computed for two objectives
    pub hypervolume: Option<f64>,
    pub generations: usize,
    pub evaluations: usize,
    pub stopped_early: bool,
}

pub fn run<E: Evaluator + ?Sized>(settings: &RunSettings, evaluator: &E) -> Result<RunOutput> {
    run_with(settings, evaluator, |_| ControlFlow::Continue(()))
}

/// Run with a per-generation observer that may cancel the search.
pub fn run_with<E, O>(settings: &RunSettings, evaluator: &E, observer: O) -> Result<RunOutput>
where
    E: Evaluator + ?Sized,
    O: FnMut(&GenerationStats) -> ControlFlow<()>,
{
    let m = evaluator.num_objectives();
    if m == 0 {
        invalid!("evaluator reports no objectives");
    }
    settings.weights.validate(m)?;
    let mut optimizer = Nsga2::new(settings.optimizer.clone())?;

    let front = optimizer.optimize_with(evaluator, observer)?;
    let decisions = front.decisions();
    let objectives = front.objectives();

    let weights = settings.weights.resolve(&objectives)?;
    let criteria = vec![Criterion::Cost; m];
    let ranking = topsis::rank(&objectives, &weights, &criteria)?;
    let best = ranking.best;

    info!(
        method = %settings.weights.label(),
        weights = ?weights.as_slice(),
        best_index = best,
        score = ranking.scores[best],
        "selected operating point"
    );

    let hypervolume = if m == 2 {
        Some(hypervolume_2d(&objectives, nadir_reference(&objectives)))
    } else {
        None
    };

    Ok(RunOutput {
        best_decision: decisions[best].clone(),
        best_objectives: objectives[best].clone(),
        ranking: ranking
            .top(settings.top_n)
            .into_iter()
            .map(|(index, score)| RankedCandidate { index, score })
            .collect(),
        score_summary: ScoreSummary::from_scores(&ranking.scores),
        scores: ranking.scores,
        best_index: best,
        pareto_decisions: decisions,
        pareto_objectives: objectives,
        weight_method: settings.weights.label(),
        weights,
        hypervolume,
        generations: front.generations,
        evaluations: front.evaluations,
        stopped_early: front.stopped_early,
    })
}

/// Reference point 10% of the range beyond the worst value of each of the
/// first two objectives (one unit beyond for a flat objective).
pub fn nadir_reference(objectives: &[Vec<f64>]) -> (f64, f64) {
    let axis = |j: usize| {
        let lo = objectives.iter().map(|f| f[j]).fold(f64::INFINITY, f64::min);
        let hi = objectives.iter().map(|f| f[j]).fold(f64::NEG_INFINITY, f64::max);
        let range = hi - lo;
        if range > 0.0 {
            hi + 0.1 * range
        } else {
            hi + 1.0
        }
    };
    (axis(0), axis(1))
}

/// Inlet vs outlet concentration for one pollutant
#[derive(Clone, Debug, Serialize)]
pub struct Removal {
    pub inlet: f64,
    pub outlet: f64,
    /// `(inlet - outlet) / inlet * 100`, 0 when the inlet is not positive
    pub removal_pct: f64,
}

/// Predictions of every model at one operating point
#[derive(Clone, Debug, Serialize)]
pub struct PointReport {
    pub controls: BTreeMap<String, f64>,
    pub predictions: BTreeMap<String, f64>,
    pub removal: BTreeMap<String, Removal>,
}

/// Predict all targets at decision `x`. A target `T` with an inlet feature
/// `T_in` in the process state also gets a removal-rate entry.
pub fn predict_report(
    models: &ModelBundle,
    state: &FeatureMap,
    controls: &[String],
    x: &[f64],
) -> Result<PointReport> {
    if controls.len() != x.len() {
        invalid!("{} control values given for {} controls", x.len(), controls.len());
    }
    let controls: BTreeMap<String, f64> = controls.iter().cloned().zip(x.iter().copied()).collect();

    let mut features = state.clone();
    features.extend(controls.iter().map(|(k, v)| (k.clone(), *v)));

    let predictions = models.predict_all(&features)?;

    let removal = predictions
        .iter()
        .filter_map(|(target, &outlet)| {
            let inlet = *state.get(&format!("{}_in", target))?;
            let removal_pct = if inlet > 0.0 {
                (inlet - outlet) / inlet * 100.0
            } else {
                0.0
            };
            Some((
                target.clone(),
                Removal {
                    inlet,
                    outlet,
                    removal_pct,
                },
            ))
        })
        .collect();

    Ok(PointReport {
        controls,
        predictions,
        removal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::evaluator::FnEvaluator;
    use crate::weighting::WeightPreset;

    fn tradeoff() -> FnEvaluator<impl Fn(&[f64]) -> Vec<f64> + Sync> {
        // Aeration costs energy but improves effluent quality
        FnEvaluator::new(2, |x: &[f64]| vec![50.0 + 20.0 * x[0], 10.0 / (1.0 + x[0]) + 0.1 * x[1]])
    }

    fn settings(weights: WeightMode) -> RunSettings {
        RunSettings {
            optimizer: Nsga2Config {
                pop_size: 24,
                generations: 20,
                bounds: vec![(0.0, 4.0), (0.0, 1.0)],
                seed: 7,
                ..Default::default()
            },
            weights,
            top_n: 5,
        }
    }

    #[test]
    fn test_run_produces_consistent_output() {
        let out = run(&settings(WeightMode::Entropy), &tradeoff()).unwrap();
        let n = out.pareto_decisions.len();
        assert!(n > 1);
        assert_eq!(out.pareto_objectives.len(), n);
        assert_eq!(out.scores.len(), n);
        assert!(out.best_index < n);
        assert_eq!(out.best_decision, out.pareto_decisions[out.best_index]);
        assert!((out.weights.as_slice().iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(out.ranking[0].index, out.best_index);
        assert!(out.ranking.len() <= 5);
        assert!(out.hypervolume.unwrap() > 0.0);

        let summary = out.score_summary.as_ref().unwrap();
        assert_eq!(summary.max, out.scores[out.best_index]);
        assert!(summary.mean <= summary.max);
        assert!(summary.std_dev >= 0.0);
    }

    #[test]
    fn test_score_summary() {
        let summary = ScoreSummary::from_scores(&[0.2, 0.4, f64::NAN, 0.6]).unwrap();
        assert!((summary.mean - 0.4).abs() < 1e-12);
        assert_eq!(summary.max, 0.6);
        // sqrt(((0.2)^2 + 0 + (0.2)^2) / 3)
        assert!((summary.std_dev - (0.08f64 / 3.0).sqrt()).abs() < 1e-12);

        assert!(ScoreSummary::from_scores(&[f64::NAN]).is_none());
        assert!(ScoreSummary::from_scores(&[]).is_none());
    }

    #[test]
    fn test_invalid_manual_weights_fail_before_search() {
        let evaluator = FnEvaluator::new(2, |_: &[f64]| -> Vec<f64> {
            panic!("evaluation must not start with invalid weights")
        });
        let err = run(&settings(WeightMode::Manual { values: vec![0.6, 0.3] }), &evaluator).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_weight_preference_moves_selection() {
        let energy = run(
            &settings(WeightMode::Preset { name: WeightPreset::EnergyFirst }),
            &tradeoff(),
        )
        .unwrap();
        let quality = run(
            &settings(WeightMode::Preset { name: WeightPreset::QualityFirst }),
            &tradeoff(),
        )
        .unwrap();
        assert!(energy.best_objectives[0] <= quality.best_objectives[0]);
        assert!(energy.best_objectives[1] >= quality.best_objectives[1]);
    }

    #[test]
    fn test_collapsed_front_is_degenerate() {
        let constant = FnEvaluator::new(2, |_: &[f64]| vec![1.0, 1.0]);
        let err = run(&settings(WeightMode::Entropy), &constant).unwrap_err();
        assert!(matches!(err, EngineError::DegenerateRanking { .. }));
    }

    #[test]
    fn test_predict_report_removal() {
        let models = ModelBundle::new()
            .with("COD", |f: &FeatureMap| Ok::<_, String>(f["COD_in"] / 10.0 + f["R5_DO"]))
            .with("total_energy", |f: &FeatureMap| Ok::<_, String>(100.0 * f["R5_DO"]));
        let state: FeatureMap = [("COD_in".to_string(), 300.0)].into_iter().collect();
        let report = predict_report(&models, &state, &["R5_DO".to_string()], &[2.0]).unwrap();

        assert_eq!(report.predictions["total_energy"], 200.0);
        let cod = &report.removal["COD"];
        assert_eq!(cod.outlet, 32.0);
        assert!((cod.removal_pct - (268.0 / 3.0)).abs() < 1e-9);
        assert!(!report.removal.contains_key("total_energy"));
    }
}
