//! Objective weighting for the decision step.
//!
//! Weights come from the operator (manual values or a named preset) or are
//! derived from the spread of the Pareto objective matrix with the entropy
//! weight method.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{invalid, EngineError, Result};

/// Allowed deviation of a manual weight sum from 1.0
pub const WEIGHT_TOLERANCE: f64 = 1e-3;

/// Non-negative weights, one per objective, summing to 1.0.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    /// Validate operator-supplied weights.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            invalid!("weight vector is empty");
        }
        if let Some(w) = values.iter().find(|w| !w.is_finite() || **w < 0.0) {
            invalid!("weights must be finite and non-negative, got {}", w);
        }
        let sum: f64 = values.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            invalid!(
                "weights must sum to 1.0 (±{}), got {:.4}",
                WEIGHT_TOLERANCE,
                sum
            );
        }
        Ok(Self(values))
    }

    fn uniform(n: usize) -> Self {
        Self(vec![1.0 / n as f64; n])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Named two-objective presets (energy weight first, quality weight second).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightPreset {
    /// 0.7 energy, 0.3 quality
    EnergyFirst,
    /// 0.3 energy, 0.7 quality
    QualityFirst,
    /// 0.5 / 0.5
    Balanced,
}

impl WeightPreset {
    pub fn weights(self) -> [f64; 2] {
        match self {
            WeightPreset::EnergyFirst => [0.7, 0.3],
            WeightPreset::QualityFirst => [0.3, 0.7],
            WeightPreset::Balanced => [0.5, 0.5],
        }
    }
}

/// How the decision step obtains its weight vector
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum WeightMode {
    Manual { values: Vec<f64> },
    Preset { name: WeightPreset },
    #[default]
    Entropy,
}

impl WeightMode {
    /// Check operator-supplied weights against the objective count. Called
    /// before any optimization starts.
    pub fn validate(&self, num_objectives: usize) -> Result<()> {
        match self {
            WeightMode::Manual { values } => {
                if values.len() != num_objectives {
                    invalid!(
                        "expected {} manual weights, got {}",
                        num_objectives,
                        values.len()
                    );
                }
                WeightVector::new(values.clone()).map(|_| ())
            }
            WeightMode::Preset { .. } => {
                if num_objectives != 2 {
                    invalid!(
                        "weight {} needs exactly 2 objectives, have {}",
                        self.label(),
                        num_objectives
                    );
                }
                Ok(())
            }
            WeightMode::Entropy => Ok(()),
        }
    }

    /// Produce the weight vector for `matrix` (rows = candidates).
    pub fn resolve(&self, matrix: &[Vec<f64>]) -> Result<WeightVector> {
        match self {
            WeightMode::Manual { values } => WeightVector::new(values.clone()),
            WeightMode::Preset { name } => WeightVector::new(name.weights().to_vec()),
            WeightMode::Entropy => entropy_weights(matrix),
        }
    }

    pub fn label(&self) -> String {
        match self {
            WeightMode::Manual { values } => format!("manual {:?}", values),
            WeightMode::Preset { name } => match name {
                WeightPreset::EnergyFirst => "preset energy-first".to_string(),
                WeightPreset::QualityFirst => "preset quality-first".to_string(),
                WeightPreset::Balanced => "preset balanced".to_string(),
            },
            WeightMode::Entropy => "entropy".to_string(),
        }
    }
}

/// Entropy weight method.
///
/// Each column is normalized by its sum into a distribution, its Shannon
/// entropy is scaled by `ln(n)`, and the diversity degrees `1 - e` are
/// normalized to sum to 1. Columns with negative entries are shifted so their
/// minimum is zero. When no column carries information (constant matrix, or
/// a single row) the weights are uniform.
pub fn entropy_weights(matrix: &[Vec<f64>]) -> Result<WeightVector> {
    let n = matrix.len();
    if n == 0 {
        invalid!("entropy weighting needs at least one candidate");
    }
    let m = matrix[0].len();
    if m == 0 {
        invalid!("entropy weighting needs at least one objective");
    }
    if matrix.iter().any(|row| row.len() != m) {
        return Err(EngineError::config("decision matrix rows have unequal length"));
    }
    if matrix.iter().flatten().any(|v| !v.is_finite()) {
        invalid!("decision matrix contains non-finite values");
    }

    let ln_n = (n as f64).ln();
    let degrees: Vec<f64> = (0..m)
        .map(|j| {
            let min = matrix.iter().map(|r| r[j]).fold(f64::INFINITY, f64::min);
            let shift = if min < 0.0 { -min } else { 0.0 };
            let sum: f64 = matrix.iter().map(|r| r[j] + shift).sum();
            if sum <= 0.0 || ln_n <= 0.0 {
                return 0.0;
            }
            let h: f64 = matrix
                .iter()
                .map(|r| (r[j] + shift) / sum)
                .filter(|&p| p > 0.0)
                .map(|p| -p * p.ln())
                .sum();
            let degree = 1.0 - h / ln_n;
            if degree < 1e-12 {
                0.0
            } else {
                degree
            }
        })
        .collect();

    let total: f64 = degrees.iter().sum();
    debug!(?degrees, "entropy diversity degrees");
    if total <= f64::EPSILON {
        return Ok(WeightVector::uniform(m));
    }
    Ok(WeightVector(degrees.iter().map(|d| d / total).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(w: &WeightVector) -> f64 {
        w.as_slice().iter().sum()
    }

    #[test]
    fn test_manual_weights_sum() {
        let bad = WeightMode::Manual { values: vec![0.6, 0.3] };
        assert!(bad.validate(2).unwrap_err().is_configuration());

        let good = WeightMode::Manual { values: vec![0.6, 0.4] };
        assert!(good.validate(2).is_ok());
        assert_eq!(good.resolve(&[]).unwrap().as_slice(), &[0.6, 0.4]);
    }

    #[test]
    fn test_manual_weights_tolerance() {
        assert!(WeightVector::new(vec![0.5, 0.5005]).is_ok());
        assert!(WeightVector::new(vec![0.5, 0.502]).is_err());
        assert!(WeightVector::new(vec![1.2, -0.2]).is_err());
    }

    #[test]
    fn test_manual_weight_count() {
        let mode = WeightMode::Manual { values: vec![1.0] };
        assert!(mode.validate(2).is_err());
    }

    #[test]
    fn test_presets() {
        let mode = WeightMode::Preset { name: WeightPreset::EnergyFirst };
        assert_eq!(mode.resolve(&[]).unwrap().as_slice(), &[0.7, 0.3]);
        assert!(mode.validate(3).is_err());
    }

    #[test]
    fn test_entropy_weights_sum_to_one() {
        let matrix = vec![
            vec![120.0, 4.0],
            vec![130.0, 3.0],
            vec![150.0, 2.5],
            vec![180.0, 2.0],
        ];
        let w = entropy_weights(&matrix).unwrap();
        assert!((sum(&w) - 1.0).abs() < 1e-9);
        // The quality column spreads far more relative to its mean.
        assert!(w.as_slice()[1] > w.as_slice()[0]);
    }

    #[test]
    fn test_entropy_identical_rows() {
        let matrix = vec![vec![3.0, 7.0], vec![3.0, 7.0]];
        let w = entropy_weights(&matrix).unwrap();
        assert!((sum(&w) - 1.0).abs() < 1e-9);
        assert_eq!(w.as_slice(), &[0.5, 0.5]);
    }

    #[test]
    fn test_entropy_zero_cells() {
        let matrix = vec![vec![0.0, 1.0], vec![5.0, 1.0], vec![0.0, 2.0]];
        let w = entropy_weights(&matrix).unwrap();
        assert!(w.as_slice().iter().all(|v| v.is_finite()));
        assert!((sum(&w) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_single_row_and_negative_values() {
        let w = entropy_weights(&[vec![1.0, 2.0]]).unwrap();
        assert_eq!(w.as_slice(), &[0.5, 0.5]);

        let w = entropy_weights(&[vec![-1.0, 2.0], vec![1.0, 3.0], vec![0.0, 4.0]]).unwrap();
        assert!((sum(&w) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_mode_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            weights: WeightMode,
        }
        let w: Wrapper = toml::from_str("[weights]\nmode = \"manual\"\nvalues = [0.6, 0.4]\n").unwrap();
        assert_eq!(w.weights, WeightMode::Manual { values: vec![0.6, 0.4] });
        let w: Wrapper = toml::from_str("[weights]\nmode = \"preset\"\nname = \"quality-first\"\n").unwrap();
        assert_eq!(w.weights, WeightMode::Preset { name: WeightPreset::QualityFirst });
        let w: Wrapper = toml::from_str("[weights]\nmode = \"entropy\"\n").unwrap();
        assert_eq!(w.weights, WeightMode::Entropy);
        assert_eq!(WeightMode::default(), WeightMode::Entropy);
    }
}
