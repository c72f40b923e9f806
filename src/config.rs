use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decision::RunSettings;
use crate::error::{invalid, Result};
use crate::nsga2::Nsga2Config;
use crate::weighting::WeightMode;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Root {
    /// Target names to minimize, in objective order
    pub objectives: Vec<String>,
    pub study: Study,
    /// Fixed process state (e.g. inlet concentrations)
    #[serde(default)]
    pub process: BTreeMap<String, f64>,
    pub controls: Vec<Control>,
    #[serde(default)]
    pub optimizer: Optimizer,
    #[serde(default)]
    pub weights: WeightMode,
    pub models: Models,
    #[serde(default)]
    pub report: Report,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Study {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A controllable set-point and its admissible range
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Control {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Optimizer {
    #[serde(default = "default_pop_size")]
    pub pop_size: usize,
    #[serde(default = "default_generations")]
    pub generations: usize,
    #[serde(default = "default_crossover_prob")]
    pub crossover_prob: f64,
    #[serde(default = "default_eta_c")]
    pub eta_c: f64,
    #[serde(default = "default_eta_m")]
    pub eta_m: f64,
    /// Per-variable mutation probability (default: 1 / number of controls)
    pub mutation_prob: Option<f64>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Evaluate each generation on the rayon thread pool
    #[serde(default)]
    pub parallel: bool,
    pub time_budget_secs: Option<f64>,
    #[serde(default = "default_true")]
    pub eliminate_duplicates: bool,
}

fn default_pop_size() -> usize { 50 }
fn default_generations() -> usize { 100 }
fn default_crossover_prob() -> f64 { 0.9 }
fn default_eta_c() -> f64 { 15.0 }
fn default_eta_m() -> f64 { 20.0 }
fn default_seed() -> u64 { 42 }
fn default_true() -> bool { true }

impl Default for Optimizer {
    fn default() -> Self {
        Self {
            pop_size: default_pop_size(),
            generations: default_generations(),
            crossover_prob: default_crossover_prob(),
            eta_c: default_eta_c(),
            eta_m: default_eta_m(),
            mutation_prob: None,
            seed: default_seed(),
            parallel: false,
            time_budget_secs: None,
            eliminate_duplicates: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Models {
    /// Model bundle file; relative paths resolve against the config file
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Report {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_top_n() -> usize { 10 }

impl Default for Report {
    fn default() -> Self {
        Self { top_n: default_top_n() }
    }
}

impl Root {
    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.study.name.trim().is_empty() {
            invalid!("study.name must not be empty");
        }
        if self.controls.is_empty() {
            invalid!("at least one [[controls]] entry is required");
        }

        let mut seen = HashSet::new();
        for c in &self.controls {
            if !seen.insert(c.name.as_str()) {
                invalid!("duplicate control '{}'", c.name);
            }
            if !c.lower.is_finite() || !c.upper.is_finite() {
                invalid!("controls.{}: bounds must be finite", c.name);
            }
            if c.lower >= c.upper {
                invalid!(
                    "controls.{}: lower ({}) must be < upper ({})",
                    c.name,
                    c.lower,
                    c.upper
                );
            }
            if self.process.contains_key(&c.name) {
                invalid!("controls.{} is also listed under [process]", c.name);
            }
        }

        if let Some((name, v)) = self.process.iter().find(|(_, v)| !v.is_finite()) {
            invalid!("process.{} must be finite, got {}", name, v);
        }

        if self.objectives.len() < 2 {
            invalid!("at least two objectives are required");
        }
        let unique: HashSet<&str> = self.objectives.iter().map(String::as_str).collect();
        if unique.len() != self.objectives.len() {
            invalid!("objectives must be distinct");
        }

        self.time_budget()?;
        if self.report.top_n == 0 {
            invalid!("report.top_n must be >= 1");
        }

        self.weights.validate(self.objectives.len())?;
        self.nsga2()?.validate()
    }

    fn time_budget(&self) -> Result<Option<Duration>> {
        let Some(t) = self.optimizer.time_budget_secs else {
            return Ok(None);
        };
        if !(t > 0.0) {
            invalid!("optimizer.time_budget_secs must be positive, got {}", t);
        }
        match Duration::try_from_secs_f64(t) {
            Ok(budget) => Ok(Some(budget)),
            Err(_) => invalid!("optimizer.time_budget_secs out of range: {}", t),
        }
    }

    pub fn control_names(&self) -> Vec<String> {
        self.controls.iter().map(|c| c.name.clone()).collect()
    }

    pub fn nsga2(&self) -> Result<Nsga2Config> {
        let opt = &self.optimizer;
        Ok(Nsga2Config {
            pop_size: opt.pop_size,
            generations: opt.generations,
            crossover_prob: opt.crossover_prob,
            eta_c: opt.eta_c,
            eta_m: opt.eta_m,
            mutation_prob: opt.mutation_prob,
            bounds: self.controls.iter().map(|c| (c.lower, c.upper)).collect(),
            seed: opt.seed,
            time_budget: self.time_budget()?,
            eliminate_duplicates: opt.eliminate_duplicates,
        })
    }

    pub fn run_settings(&self) -> Result<RunSettings> {
        Ok(RunSettings {
            optimizer: self.nsga2()?,
            weights: self.weights.clone(),
            top_n: self.report.top_n,
        })
    }

    /// Model bundle path, resolved against the directory of the config file.
    pub fn models_path(&self, config_path: &Path) -> PathBuf {
        if self.models.path.is_absolute() {
            return self.models.path.clone();
        }
        config_path
            .parent()
            .map(|dir| dir.join(&self.models.path))
            .unwrap_or_else(|| self.models.path.clone())
    }
}
