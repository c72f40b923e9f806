//! NSGA-II Multi-Objective Optimization Algorithm
//!
//! Implementation of the Non-dominated Sorting Genetic Algorithm II (NSGA-II)
//! for control set-point optimization over surrogate process models.
//!
//! References:
//! - Deb, K., et al. "A Fast and Elitist Multiobjective Genetic Algorithm: NSGA-II" (2002)
//!
//! The run is single-threaded and deterministic for a fixed seed. Only
//! objective evaluation within a generation may fan out (see
//! [`crate::evaluator::SurrogateEvaluator::parallel`]).

use std::cmp::Ordering;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::error::{invalid, EngineError, Result};
use crate::evaluator::Evaluator;
use crate::operators::{tournament_select, PolynomialMutation, Sbx};
use crate::population::{self, Individual};
use crate::ranking::{crowded_cmp, rank_and_crowd};

/// Children generated per population slot before duplicates are accepted
const MAX_MATING_ROUNDS: usize = 100;

/// Decision vectors closer than this in every variable are duplicates
const DUPLICATE_EPS: f64 = 1e-12;

/// NSGA-II configuration
#[derive(Clone, Debug)]
pub struct Nsga2Config {
    /// Population size
    pub pop_size: usize,
    /// Number of generations
    pub generations: usize,
    /// Crossover probability (per mating pair)
    pub crossover_prob: f64,
    /// Distribution index for SBX crossover
    pub eta_c: f64,
    /// Distribution index for polynomial mutation
    pub eta_m: f64,
    /// Per-variable mutation probability; `None` means 1 / num_variables
    pub mutation_prob: Option<f64>,
    /// Variable bounds: [(min, max), ...]
    pub bounds: Vec<(f64, f64)>,
    /// Seed for reproducibility
    pub seed: u64,
    /// Wall-clock budget; the run stops after the generation that exceeds it
    pub time_budget: Option<Duration>,
    /// Reject offspring identical to a parent or to an earlier child
    pub eliminate_duplicates: bool,
}

impl Default for Nsga2Config {
    fn default() -> Self {
        Self {
            pop_size: 50,
            generations: 100,
            crossover_prob: 0.9,
            eta_c: 15.0,
            eta_m: 20.0,
            mutation_prob: None,
            bounds: vec![
                (0.5, 10.0), // R2_NO2
                (1.5, 4.0),  // R5_DO
            ],
            seed: 42,
            time_budget: None,
            eliminate_duplicates: true,
        }
    }
}

impl Nsga2Config {
    pub fn validate(&self) -> Result<()> {
        if self.pop_size == 0 {
            invalid!("pop_size must be positive");
        }
        if self.generations == 0 {
            invalid!("generations must be positive");
        }
        if self.bounds.is_empty() {
            invalid!("at least one decision variable is required");
        }
        for (i, &(lo, hi)) in self.bounds.iter().enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                invalid!("bounds[{}] must be finite", i);
            }
            if lo >= hi {
                invalid!("bounds[{}]: lower ({}) must be < upper ({})", i, lo, hi);
            }
        }
        if !(0.0..=1.0).contains(&self.crossover_prob) {
            invalid!("crossover_prob must be in [0, 1]");
        }
        if let Some(p) = self.mutation_prob {
            if !(0.0..=1.0).contains(&p) {
                invalid!("mutation_prob must be in [0, 1]");
            }
        }
        if !(self.eta_c > 0.0) || !(self.eta_m > 0.0) {
            invalid!("distribution indices eta_c and eta_m must be positive");
        }
        Ok(())
    }

    pub fn effective_mutation_prob(&self) -> f64 {
        self.mutation_prob
            .unwrap_or_else(|| 1.0 / self.bounds.len().max(1) as f64)
    }
}

/// Progress report handed to the observer after every generation
#[derive(Clone, Debug)]
pub struct GenerationStats {
    /// Generations completed so far (1-based)
    pub generation: usize,
    /// Size of the current non-dominated front
    pub front_size: usize,
    /// Objective evaluations performed so far
    pub evaluations: usize,
    pub elapsed: Duration,
}

/// Pareto front result
#[derive(Clone, Debug)]
pub struct ParetoFront {
    /// Non-dominated solutions
    pub solutions: Vec<Individual>,
    /// Generations actually completed
    pub generations: usize,
    pub evaluations: usize,
    /// True when the observer or the time budget ended the run
    pub stopped_early: bool,
}

impl ParetoFront {
    pub fn decisions(&self) -> Vec<Vec<f64>> {
        self.solutions.iter().map(|s| s.x.clone()).collect()
    }

    pub fn objectives(&self) -> Vec<Vec<f64>> {
        self.solutions.iter().map(|s| s.f.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }
}

/// NSGA-II optimizer
pub struct Nsga2 {
    config: Nsga2Config,
    population: Vec<Individual>,
    rng: StdRng,
    sbx: Sbx,
    mutation: PolynomialMutation,
    evaluations: usize,
}

impl Nsga2 {
    pub fn new(config: Nsga2Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            sbx: Sbx {
                prob: config.crossover_prob,
                eta: config.eta_c,
            },
            mutation: PolynomialMutation {
                prob: config.effective_mutation_prob(),
                eta: config.eta_m,
            },
            config,
            population: Vec::new(),
            evaluations: 0,
        })
    }

    /// Initialize population by uniform sampling within the bounds
    pub fn initialize_population(&mut self) {
        self.population =
            population::initialize(&self.config.bounds, self.config.pop_size, &mut self.rng);
    }

    /// Evaluate every individual lacking objective values.
    pub fn evaluate<E: Evaluator + ?Sized>(&mut self, evaluator: &E) -> Result<()> {
        let evaluations = evaluate_missing(&mut self.population, evaluator)?;
        self.evaluations += evaluations;
        Ok(())
    }

    /// Create offspring by binary tournament, SBX and polynomial mutation.
    /// Offspring are returned unevaluated.
    pub fn create_offspring(&mut self) -> Vec<Individual> {
        let n = self.config.pop_size;
        let max_children = n * MAX_MATING_ROUNDS;
        let mut offspring: Vec<Individual> = Vec::with_capacity(n);
        let mut produced = 0;

        while offspring.len() < n {
            let p1 = tournament_select(&self.population, &mut self.rng);
            let p2 = tournament_select(&self.population, &mut self.rng);

            let (mut c1, mut c2) = self.sbx.crossover(
                &self.population[p1].x,
                &self.population[p2].x,
                &self.config.bounds,
                &mut self.rng,
            );
            self.mutation.mutate(&mut c1, &self.config.bounds, &mut self.rng);
            self.mutation.mutate(&mut c2, &self.config.bounds, &mut self.rng);

            for child in [c1, c2] {
                produced += 1;
                if offspring.len() == n {
                    break;
                }
                // Give up on uniqueness once the search space looks exhausted
                let unique = !self.config.eliminate_duplicates
                    || produced > max_children
                    || !self.is_duplicate(&child, &offspring);
                if unique {
                    offspring.push(Individual::new(child));
                }
            }
        }

        offspring
    }

    fn is_duplicate(&self, x: &[f64], offspring: &[Individual]) -> bool {
        self.population
            .iter()
            .chain(offspring)
            .any(|other| same_point(&other.x, x))
    }

    /// Rank the combined population and keep `pop_size` survivors: whole
    /// fronts in rank order, the last partial front by crowding distance.
    pub fn environmental_selection(&mut self, mut combined: Vec<Individual>) {
        let fronts = rank_and_crowd(&mut combined);
        let budget = self.config.pop_size;

        let mut selected: Vec<usize> = Vec::with_capacity(budget);
        for front in fronts {
            if selected.len() + front.len() <= budget {
                selected.extend(front);
                if selected.len() == budget {
                    break;
                }
                continue;
            }

            let mut last = front;
            last.sort_by(|&a, &b| crowded_cmp(&combined[a], &combined[b]));
            last.truncate(budget - selected.len());
            selected.extend(last);
            break;
        }

        let mut slots: Vec<Option<Individual>> = combined.into_iter().map(Some).collect();
        self.population = selected
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();
    }

    /// Run optimization for the configured number of generations
    pub fn optimize<E: Evaluator + ?Sized>(&mut self, evaluator: &E) -> Result<ParetoFront> {
        self.optimize_with(evaluator, |_| ControlFlow::Continue(()))
    }

    /// Run optimization, calling `observer` after every generation. Returning
    /// `ControlFlow::Break` ends the run early with the front found so far.
    pub fn optimize_with<E, O>(&mut self, evaluator: &E, mut observer: O) -> Result<ParetoFront>
    where
        E: Evaluator + ?Sized,
        O: FnMut(&GenerationStats) -> ControlFlow<()>,
    {
        let start = Instant::now();
        self.evaluations = 0;

        info!(
            pop_size = self.config.pop_size,
            generations = self.config.generations,
            seed = self.config.seed,
            variables = self.config.bounds.len(),
            objectives = evaluator.num_objectives(),
            "starting NSGA-II optimization"
        );

        self.initialize_population();
        self.evaluate(evaluator)?;
        rank_and_crowd(&mut self.population);

        let mut completed = 0;
        let mut stopped_early = false;

        for gen in 0..self.config.generations {
            let offspring = self.create_offspring();
            let parents = std::mem::take(&mut self.population);
            let mut combined = population::combine(parents, offspring);
            self.evaluations += evaluate_missing(&mut combined, evaluator)?;
            self.environmental_selection(combined);
            completed = gen + 1;

            let stats = GenerationStats {
                generation: completed,
                front_size: self.population.iter().filter(|i| i.rank == 0).count(),
                evaluations: self.evaluations,
                elapsed: start.elapsed(),
            };
            debug!(
                generation = stats.generation,
                front_size = stats.front_size,
                evaluations = stats.evaluations,
                "generation complete"
            );

            let flow = observer(&stats);
            if completed == self.config.generations {
                break;
            }
            if flow.is_break() {
                warn!(generation = completed, "optimization cancelled by observer");
                stopped_early = true;
                break;
            }
            if let Some(budget) = self.config.time_budget {
                if stats.elapsed >= budget {
                    warn!(
                        generation = completed,
                        budget_ms = budget.as_millis() as u64,
                        "time budget exhausted"
                    );
                    stopped_early = true;
                    break;
                }
            }
        }

        let mut solutions: Vec<Individual> = self
            .population
            .iter()
            .filter(|ind| ind.rank == 0)
            .cloned()
            .collect();
        solutions.sort_by(|a, b| {
            a.f.partial_cmp(&b.f).unwrap_or(Ordering::Equal)
        });

        info!(
            front_size = solutions.len(),
            generations = completed,
            evaluations = self.evaluations,
            wall_time_ms = start.elapsed().as_secs_f64() * 1000.0,
            "optimization complete"
        );

        Ok(ParetoFront {
            solutions,
            generations: completed,
            evaluations: self.evaluations,
            stopped_early,
        })
    }

    /// Get current population
    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    pub fn config(&self) -> &Nsga2Config {
        &self.config
    }
}

fn same_point(a: &[f64], b: &[f64]) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() <= DUPLICATE_EPS)
}

/// Evaluate individuals lacking objectives, in index order. Returns the number
/// of evaluations performed.
fn evaluate_missing<E: Evaluator + ?Sized>(pop: &mut [Individual], evaluator: &E) -> Result<usize> {
    let pending: Vec<usize> = (0..pop.len()).filter(|&i| !pop[i].is_evaluated()).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let xs: Vec<Vec<f64>> = pending.iter().map(|&i| pop[i].x.clone()).collect();
    let fs = evaluator.evaluate_batch(&xs)?;
    if fs.len() != pending.len() {
        return Err(EngineError::evaluation(
            "<batch>",
            format!("expected {} results, got {}", pending.len(), fs.len()),
        ));
    }

    let m = evaluator.num_objectives();
    for (&i, f) in pending.iter().zip(fs) {
        if f.len() != m {
            return Err(EngineError::evaluation(
                "<batch>",
                format!("expected {} objectives, got {}", m, f.len()),
            ));
        }
        pop[i].f = f;
    }
    Ok(pending.len())
}

/// Compute hypervolume indicator (2D only)
pub fn hypervolume_2d(front: &[Vec<f64>], ref_point: (f64, f64)) -> f64 {
    let mut sorted: Vec<&Vec<f64>> = front
        .iter()
        .filter(|f| f.len() >= 2 && f[0] < ref_point.0 && f[1] < ref_point.1)
        .collect();
    sorted.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap_or(Ordering::Equal));

    let mut hv = 0.0;
    let mut prev_f2 = ref_point.1;

    for f in sorted {
        let height = prev_f2 - f[1];
        if height > 0.0 {
            hv += (ref_point.0 - f[0]) * height;
            prev_f2 = f[1];
        }
    }

    hv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::FnEvaluator;

    fn zdt1_like() -> FnEvaluator<impl Fn(&[f64]) -> Vec<f64> + Sync> {
        FnEvaluator::new(2, |x: &[f64]| {
            let f1 = x[0];
            let g = 1.0 + x[1];
            let f2 = g * (1.0 - (x[0] / g).sqrt());
            vec![f1, f2]
        })
    }

    #[test]
    fn test_config_validation() {
        let ok = Nsga2Config::default();
        assert!(ok.validate().is_ok());

        let bad_bounds = Nsga2Config {
            bounds: vec![(1.0, 1.0)],
            ..Default::default()
        };
        assert!(bad_bounds.validate().unwrap_err().is_configuration());

        let no_pop = Nsga2Config {
            pop_size: 0,
            ..Default::default()
        };
        assert!(no_pop.validate().is_err());

        let no_gen = Nsga2Config {
            generations: 0,
            ..Default::default()
        };
        assert!(no_gen.validate().is_err());
    }

    #[test]
    fn test_default_mutation_prob() {
        let config = Nsga2Config::default();
        assert!((config.effective_mutation_prob() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_nsga2_simple() {
        let config = Nsga2Config {
            pop_size: 20,
            generations: 5,
            bounds: vec![(0.0, 1.0), (0.0, 1.0)],
            ..Default::default()
        };

        let mut optimizer = Nsga2::new(config).unwrap();
        let front = optimizer.optimize(&zdt1_like()).unwrap();
        assert!(!front.is_empty());
        assert_eq!(front.generations, 5);
        assert_eq!(front.evaluations, 20 + 5 * 20);
        assert_eq!(optimizer.population().len(), 20);
    }

    #[test]
    fn test_environmental_selection_keeps_best_fronts() {
        let config = Nsga2Config {
            pop_size: 3,
            generations: 1,
            bounds: vec![(0.0, 10.0)],
            ..Default::default()
        };
        let mut optimizer = Nsga2::new(config).unwrap();

        let combined: Vec<Individual> = [[5.0, 5.0], [0.0, 3.0], [1.0, 1.0], [3.0, 0.0], [9.0, 9.0], [2.0, 2.0]]
            .iter()
            .map(|f| {
                let mut ind = Individual::new(vec![0.0]);
                ind.f = f.to_vec();
                ind
            })
            .collect();
        optimizer.environmental_selection(combined);

        let mut kept: Vec<Vec<f64>> = optimizer.population().iter().map(|i| i.f.clone()).collect();
        kept.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(kept, vec![vec![0.0, 3.0], vec![1.0, 1.0], vec![3.0, 0.0]]);
    }

    #[test]
    fn test_partial_front_uses_crowding() {
        let config = Nsga2Config {
            pop_size: 2,
            generations: 1,
            bounds: vec![(0.0, 10.0)],
            ..Default::default()
        };
        let mut optimizer = Nsga2::new(config).unwrap();

        // One front of three: the interior point loses to the two boundaries.
        let combined: Vec<Individual> = [[0.0, 4.0], [2.0, 2.0], [4.0, 0.0]]
            .iter()
            .map(|f| {
                let mut ind = Individual::new(vec![0.0]);
                ind.f = f.to_vec();
                ind
            })
            .collect();
        optimizer.environmental_selection(combined);

        for ind in optimizer.population() {
            assert!(ind.crowding_distance.is_infinite());
        }
    }

    #[test]
    fn test_observer_stops_early() {
        let config = Nsga2Config {
            pop_size: 10,
            generations: 50,
            bounds: vec![(0.0, 1.0), (0.0, 1.0)],
            ..Default::default()
        };
        let mut optimizer = Nsga2::new(config).unwrap();
        let front = optimizer
            .optimize_with(&zdt1_like(), |stats| {
                if stats.generation >= 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert!(front.stopped_early);
        assert_eq!(front.generations, 3);
        assert!(!front.is_empty());
    }

    #[test]
    fn test_evaluation_error_aborts_run() {
        let config = Nsga2Config {
            pop_size: 10,
            generations: 5,
            bounds: vec![(0.0, 1.0)],
            ..Default::default()
        };
        let mut optimizer = Nsga2::new(config).unwrap();
        let evaluator = FnEvaluator::new(2, |x: &[f64]| {
            if x[0] > 0.5 {
                vec![f64::INFINITY, 0.0]
            } else {
                vec![x[0], 1.0 - x[0]]
            }
        });
        let err = optimizer.optimize(&evaluator).unwrap_err();
        assert!(err.is_evaluation());
    }

    #[test]
    fn test_hypervolume() {
        let front = vec![vec![0.5, 0.5], vec![0.3, 0.8]];
        let hv = hypervolume_2d(&front, (1.0, 1.0));
        // 0.7 * 0.2 + 0.5 * 0.3
        assert!((hv - 0.29).abs() < 1e-12);
        assert_eq!(hypervolume_2d(&[], (1.0, 1.0)), 0.0);
    }
}
