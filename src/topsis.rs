//! TOPSIS (Technique for Order of Preference by Similarity to Ideal Solution).
//!
//! Columns are vector-normalized, weighted, and every candidate is scored by
//! its relative closeness to the ideal point:
//! `score = d_neg / (d_ideal + d_neg)`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{invalid, EngineError, Result};
use crate::weighting::WeightVector;

/// Direction of a criterion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// Lower is better
    Cost,
    /// Higher is better
    Benefit,
}

/// Scores for every candidate plus the selected one
#[derive(Clone, Debug, Serialize)]
pub struct TopsisRanking {
    pub scores: Vec<f64>,
    /// Index of the highest score; the lowest index wins an exact tie
    pub best: usize,
    pub ideal: Vec<f64>,
    pub negative_ideal: Vec<f64>,
}

impl TopsisRanking {
    /// Candidate indices by descending score, at most `n` of them
    pub fn top(&self, n: usize) -> Vec<(usize, f64)> {
        let mut order: Vec<usize> = (0..self.scores.len()).collect();
        // Undefined scores rank last
        let key = |i: usize| {
            let s = self.scores[i];
            if s.is_nan() {
                f64::NEG_INFINITY
            } else {
                s
            }
        };
        order.sort_by(|&a, &b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
        order
            .into_iter()
            .take(n)
            .map(|i| (i, self.scores[i]))
            .collect()
    }
}

/// Rank the rows of `matrix` (rows = candidates, columns = criteria).
pub fn rank(
    matrix: &[Vec<f64>],
    weights: &WeightVector,
    criteria: &[Criterion],
) -> Result<TopsisRanking> {
    let n = matrix.len();
    if n == 0 {
        invalid!("TOPSIS needs at least one candidate");
    }
    let m = weights.len();
    if criteria.len() != m {
        invalid!("{} criteria given for {} weights", criteria.len(), m);
    }
    if matrix.iter().any(|row| row.len() != m) {
        invalid!("decision matrix rows must have {} columns", m);
    }
    if matrix.iter().flatten().any(|v| !v.is_finite()) {
        invalid!("decision matrix contains non-finite values");
    }

    let w = weights.as_slice();
    let norms: Vec<f64> = (0..m)
        .map(|j| matrix.iter().map(|r| r[j] * r[j]).sum::<f64>().sqrt())
        .collect();

    let weighted: Vec<Vec<f64>> = matrix
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(j, v)| if norms[j] > 0.0 { w[j] * v / norms[j] } else { 0.0 })
                .collect()
        })
        .collect();

    let mut ideal = Vec::with_capacity(m);
    let mut negative_ideal = Vec::with_capacity(m);
    for (j, criterion) in criteria.iter().enumerate() {
        let col_min = weighted.iter().map(|r| r[j]).fold(f64::INFINITY, f64::min);
        let col_max = weighted.iter().map(|r| r[j]).fold(f64::NEG_INFINITY, f64::max);
        match criterion {
            Criterion::Cost => {
                ideal.push(col_min);
                negative_ideal.push(col_max);
            }
            Criterion::Benefit => {
                ideal.push(col_max);
                negative_ideal.push(col_min);
            }
        }
    }

    let scores: Vec<f64> = weighted
        .iter()
        .map(|row| {
            let d_pos = distance(row, &ideal);
            let d_neg = distance(row, &negative_ideal);
            let denom = d_pos + d_neg;
            if denom > 0.0 {
                d_neg / denom
            } else {
                f64::NAN
            }
        })
        .collect();

    if scores.iter().all(|s| s.is_nan()) {
        return Err(EngineError::DegenerateRanking { candidates: n });
    }

    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] || scores[best].is_nan() {
            best = i;
        }
    }

    Ok(TopsisRanking {
        scores,
        best,
        ideal,
        negative_ideal,
    })
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
