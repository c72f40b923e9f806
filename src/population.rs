//! Individuals and population management.

use rand::Rng;
use serde::Serialize;

/// Candidate solution in the population
#[derive(Clone, Debug, Serialize)]
pub struct Individual {
    /// Decision variables (control set-points)
    pub x: Vec<f64>,
    /// Objective values (minimize all); empty until evaluated
    pub f: Vec<f64>,
    /// Pareto rank (0 = non-dominated front)
    pub rank: usize,
    /// Crowding distance within its front
    pub crowding_distance: f64,
}

impl Individual {
    pub fn new(x: Vec<f64>) -> Self {
        Self {
            x,
            f: Vec::new(),
            rank: usize::MAX,
            crowding_distance: 0.0,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        !self.f.is_empty()
    }
}

/// Variable bounds, one `(lower, upper)` pair per decision variable.
pub type Bounds = [(f64, f64)];

/// Draw `size` individuals with each variable sampled uniformly in its bounds.
pub fn initialize<R: Rng + ?Sized>(bounds: &Bounds, size: usize, rng: &mut R) -> Vec<Individual> {
    (0..size)
        .map(|_| {
            let x = bounds
                .iter()
                .map(|&(lo, hi)| rng.gen_range(lo..=hi))
                .collect();
            Individual::new(x)
        })
        .collect()
}

/// Merge parents and offspring ahead of environmental selection.
pub fn combine(parents: Vec<Individual>, offspring: Vec<Individual>) -> Vec<Individual> {
    let mut combined = parents;
    combined.extend(offspring);
    combined
}

pub fn within_bounds(x: &[f64], bounds: &Bounds) -> bool {
    x.len() == bounds.len()
        && x.iter()
            .zip(bounds)
            .all(|(v, &(lo, hi))| *v >= lo && *v <= hi)
}
