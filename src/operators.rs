//! Genetic operators: simulated binary crossover, polynomial mutation and
//! binary tournament selection.
//!
//! References:
//! - Deb, K., Agrawal, R. B. "Simulated Binary Crossover for Continuous Search Space" (1995)
//! - Deb, K., Goyal, M. "A Combined Genetic Adaptive Search (GeneAS)" (1996)
//!
//! Every operator clips its output to the variable bounds.

use rand::Rng;

use crate::population::{Bounds, Individual};
use crate::ranking::crowded_cmp;

const EPS: f64 = 1e-14;

/// Simulated Binary Crossover (SBX)
#[derive(Clone, Copy, Debug)]
pub struct Sbx {
    /// Probability that a mating pair recombines at all
    pub prob: f64,
    /// Distribution index; larger values keep children closer to parents
    pub eta: f64,
}

impl Sbx {
    /// Produce two children from `p1` and `p2`. Each variable is exchanged
    /// with probability 0.5 once the pair is selected for recombination.
    pub fn crossover<R: Rng + ?Sized>(
        &self,
        p1: &[f64],
        p2: &[f64],
        bounds: &Bounds,
        rng: &mut R,
    ) -> (Vec<f64>, Vec<f64>) {
        let mut c1 = p1.to_vec();
        let mut c2 = p2.to_vec();

        if rng.gen::<f64>() > self.prob {
            return (c1, c2);
        }

        for (i, &(lo, hi)) in bounds.iter().enumerate() {
            if rng.gen::<f64>() > 0.5 {
                continue;
            }

            let y1 = p1[i].min(p2[i]);
            let y2 = p1[i].max(p2[i]);
            if (y2 - y1).abs() < EPS {
                continue;
            }

            let u: f64 = rng.gen();
            let spread = y2 - y1;

            let beta_lo = 1.0 + 2.0 * (y1 - lo) / spread;
            let a = y1 + y2 - self.spread_factor(beta_lo, u) * spread;

            let beta_hi = 1.0 + 2.0 * (hi - y2) / spread;
            let b = y1 + y2 + self.spread_factor(beta_hi, u) * spread;

            let (mut v1, mut v2) = (0.5 * a, 0.5 * b);
            v1 = v1.clamp(lo, hi);
            v2 = v2.clamp(lo, hi);

            if rng.gen::<bool>() {
                std::mem::swap(&mut v1, &mut v2);
            }
            c1[i] = v1;
            c2[i] = v2;
        }

        (c1, c2)
    }

    fn spread_factor(&self, beta: f64, u: f64) -> f64 {
        let exp = self.eta + 1.0;
        let alpha = 2.0 - beta.powf(-exp);
        if u <= 1.0 / alpha {
            (u * alpha).powf(1.0 / exp)
        } else {
            (1.0 / (2.0 - u * alpha)).powf(1.0 / exp)
        }
    }
}

/// Polynomial mutation
#[derive(Clone, Copy, Debug)]
pub struct PolynomialMutation {
    /// Per-variable mutation probability
    pub prob: f64,
    /// Distribution index
    pub eta: f64,
}

impl PolynomialMutation {
    pub fn mutate<R: Rng + ?Sized>(&self, x: &mut [f64], bounds: &Bounds, rng: &mut R) {
        let exp = self.eta + 1.0;
        for (xi, &(lo, hi)) in x.iter_mut().zip(bounds) {
            if rng.gen::<f64>() > self.prob {
                continue;
            }

            let y = *xi;
            let range = hi - lo;
            let delta1 = (y - lo) / range;
            let delta2 = (hi - y) / range;

            let u: f64 = rng.gen();
            let deltaq = if u < 0.5 {
                let xy = 1.0 - delta1;
                let val = 2.0 * u + (1.0 - 2.0 * u) * xy.powf(exp);
                val.powf(1.0 / exp) - 1.0
            } else {
                let xy = 1.0 - delta2;
                let val = 2.0 * (1.0 - u) + 2.0 * (u - 0.5) * xy.powf(exp);
                1.0 - val.powf(1.0 / exp)
            };

            *xi = (y + deltaq * range).clamp(lo, hi);
        }
    }
}

/// Binary tournament: pick two at random, keep the crowded-comparison winner.
pub fn tournament_select<R: Rng + ?Sized>(population: &[Individual], rng: &mut R) -> usize {
    let a = rng.gen_range(0..population.len());
    let b = rng.gen_range(0..population.len());
    if crowded_cmp(&population[a], &population[b]).is_le() {
        a
    } else {
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::within_bounds;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const BOUNDS: [(f64, f64); 2] = [(0.0, 10.0), (-1.0, 1.0)];

    #[test]
    fn test_sbx_stays_in_bounds() {
        let sbx = Sbx { prob: 1.0, eta: 2.0 };
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..2000 {
            let p1 = [rng.gen_range(0.0..=10.0), rng.gen_range(-1.0..=1.0)];
            let p2 = [rng.gen_range(0.0..=10.0), rng.gen_range(-1.0..=1.0)];
            let (c1, c2) = sbx.crossover(&p1, &p2, &BOUNDS, &mut rng);
            assert!(within_bounds(&c1, &BOUNDS), "child out of bounds: {:?}", c1);
            assert!(within_bounds(&c2, &BOUNDS), "child out of bounds: {:?}", c2);
        }
    }

    #[test]
    fn test_sbx_identical_parents() {
        let sbx = Sbx { prob: 1.0, eta: 15.0 };
        let mut rng = StdRng::seed_from_u64(1);
        let (c1, c2) = sbx.crossover(&[3.0, 0.5], &[3.0, 0.5], &BOUNDS, &mut rng);
        assert_eq!(c1, vec![3.0, 0.5]);
        assert_eq!(c2, vec![3.0, 0.5]);
    }

    #[test]
    fn test_sbx_disabled_copies_parents() {
        let sbx = Sbx { prob: 0.0, eta: 15.0 };
        let mut rng = StdRng::seed_from_u64(5);
        let (c1, c2) = sbx.crossover(&[1.0, 0.1], &[9.0, -0.9], &BOUNDS, &mut rng);
        assert_eq!(c1, vec![1.0, 0.1]);
        assert_eq!(c2, vec![9.0, -0.9]);
    }

    #[test]
    fn test_mutation_stays_in_bounds() {
        let pm = PolynomialMutation { prob: 1.0, eta: 1.0 };
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..2000 {
            let mut x = [rng.gen_range(0.0..=10.0), rng.gen_range(-1.0..=1.0)];
            pm.mutate(&mut x, &BOUNDS, &mut rng);
            assert!(within_bounds(&x, &BOUNDS), "mutant out of bounds: {:?}", x);
        }
    }

    #[test]
    fn test_mutation_at_bounds() {
        let pm = PolynomialMutation { prob: 1.0, eta: 20.0 };
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..500 {
            let mut x = [0.0, 1.0];
            pm.mutate(&mut x, &BOUNDS, &mut rng);
            assert!(within_bounds(&x, &BOUNDS));
        }
    }

    #[test]
    fn test_tournament_prefers_lower_rank() {
        let mut best = Individual::new(vec![0.0]);
        best.rank = 0;
        let mut worst = Individual::new(vec![1.0]);
        worst.rank = 3;
        let pop = vec![best, worst];
        let mut rng = StdRng::seed_from_u64(4);
        // Only a (worst, worst) draw selects index 1
        let wins = (0..400).filter(|_| tournament_select(&pop, &mut rng) == 0).count();
        assert!(wins > 200, "rank-0 individual should win most tournaments, won {}", wins);
    }
}
