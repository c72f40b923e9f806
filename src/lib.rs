//! Effluent: multi-objective set-point optimization and decision support.
//!
//! Given a fixed process state and surrogate models for competing targets
//! (energy use vs. effluent quality), NSGA-II searches the bounded control
//! space for a Pareto set. An operating point is then picked from it with
//! TOPSIS, using manual, preset or entropy-derived objective weights.

pub mod config;
pub mod decision;
pub mod error;
pub mod evaluator;
pub mod nsga2;
pub mod operators;
pub mod population;
pub mod ranking;
pub mod surrogate;
pub mod topsis;
pub mod weighting;


pub use decision::{predict_report, run, run_with, PointReport, RunOutput, RunSettings, ScoreSummary};
pub use error::{EngineError, Result};
pub use evaluator::{Evaluator, FnEvaluator, SurrogateEvaluator};
pub use nsga2::{Nsga2, Nsga2Config, ParetoFront};
pub use surrogate::{FeatureMap, LinearSurrogate, ModelBundle, SurrogatePredictor};
pub use weighting::{WeightMode, WeightPreset, WeightVector};
