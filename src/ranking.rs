//! Pareto dominance, fast non-dominated sorting and crowding distance.
//!
//! References:
//! - Deb, K., et al. "A Fast and Elitist Multiobjective Genetic Algorithm: NSGA-II" (2002)

use std::cmp::Ordering;

use crate::population::Individual;

/// `a` dominates `b`: no worse in every objective, strictly better in one
/// (minimization).
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut better = false;
    for (x, y) in a.iter().zip(b) {
        if x > y {
            return false;
        }
        if x < y {
            better = true;
        }
    }
    better
}

impl Individual {
    /// Check if this individual dominates another
    pub fn dominates(&self, other: &Individual) -> bool {
        dominates(&self.f, &other.f)
    }
}

/// Fast non-dominated sort.
///
/// Assigns `rank` to every individual and returns the fronts as index lists,
/// front 0 first. Indices inside a front are in population order.
pub fn non_dominated_sort(population: &mut [Individual]) -> Vec<Vec<usize>> {
    let n = population.len();

    let mut domination_count: Vec<usize> = vec![0; n];
    let mut dominates_set: Vec<Vec<usize>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in (i + 1)..n {
            if population[i].dominates(&population[j]) {
                dominates_set[i].push(j);
                domination_count[j] += 1;
            } else if population[j].dominates(&population[i]) {
                dominates_set[j].push(i);
                domination_count[i] += 1;
            }
        }
    }

    let mut fronts: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();

    while !current.is_empty() {
        let rank = fronts.len();
        for &i in &current {
            population[i].rank = rank;
        }

        let mut next: Vec<usize> = Vec::new();
        for &i in &current {
            for &j in &dominates_set[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();

        fronts.push(current);
        current = next;
    }

    fronts
}

/// Crowding distance for the members of one front.
///
/// Boundary members of each objective get infinite distance. An objective
/// whose values are all equal across the front contributes nothing.
pub fn crowding_distance(population: &mut [Individual], front: &[usize]) {
    for &i in front {
        population[i].crowding_distance = 0.0;
    }

    if front.len() <= 2 {
        for &i in front {
            population[i].crowding_distance = f64::INFINITY;
        }
        return;
    }

    let n_obj = population[front[0]].f.len();
    let mut order = front.to_vec();

    for m in 0..n_obj {
        order.sort_by(|&a, &b| {
            population[a].f[m]
                .partial_cmp(&population[b].f[m])
                .unwrap_or(Ordering::Equal)
        });

        let first = order[0];
        let last = order[order.len() - 1];
        let f_min = population[first].f[m];
        let f_max = population[last].f[m];
        let range = f_max - f_min;
        if range <= 0.0 {
            continue;
        }

        population[first].crowding_distance = f64::INFINITY;
        population[last].crowding_distance = f64::INFINITY;

        for w in order.windows(3) {
            let (prev, curr, next) = (w[0], w[1], w[2]);
            population[curr].crowding_distance +=
                (population[next].f[m] - population[prev].f[m]) / range;
        }
    }
}

/// Rank the population and compute crowding distance per front.
pub fn rank_and_crowd(population: &mut [Individual]) -> Vec<Vec<usize>> {
    let fronts = non_dominated_sort(population);
    for front in &fronts {
        crowding_distance(population, front);
    }
    fronts
}

/// Crowded-comparison operator. `Less` means `a` is preferred: lower rank
/// wins, and on equal rank the larger crowding distance wins.
pub fn crowded_cmp(a: &Individual, b: &Individual) -> Ordering {
    a.rank.cmp(&b.rank).then_with(|| {
        b.crowding_distance
            .partial_cmp(&a.crowding_distance)
            .unwrap_or(Ordering::Equal)
    })
}
