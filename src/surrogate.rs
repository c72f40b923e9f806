//! Surrogate predictors and the model bundle.
//!
//! A surrogate is an already-fitted model mapping a named feature map to one
//! scalar prediction. Training is out of scope: the engine only calls
//! `predict`. Models are looked up by target name (e.g. `total_energy`,
//! `EQ_contrib`, or the outlet concentration of a pollutant).

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};

/// Named input features for a single prediction.
pub type FeatureMap = BTreeMap<String, f64>;

/// Black-box predictor for one target.
///
/// Implementations must be idempotent for identical inputs. They must also be
/// safe to call from several threads when parallel evaluation is enabled.
pub trait SurrogatePredictor: Send + Sync {
    fn predict(&self, features: &FeatureMap) -> std::result::Result<f64, String>;
}

impl<F> SurrogatePredictor for F
where
    F: Fn(&FeatureMap) -> std::result::Result<f64, String> + Send + Sync,
{
    fn predict(&self, features: &FeatureMap) -> std::result::Result<f64, String> {
        self(features)
    }
}

/// Polynomial surrogate with linear and squared terms.
///
/// `y = intercept + sum(linear[k] * x[k]) + sum(quadratic[k] * x[k]^2)`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LinearSurrogate {
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub linear: BTreeMap<String, f64>,
    #[serde(default)]
    pub quadratic: BTreeMap<String, f64>,
}

impl LinearSurrogate {
    fn feature(features: &FeatureMap, name: &str) -> std::result::Result<f64, String> {
        features
            .get(name)
            .copied()
            .ok_or_else(|| format!("missing feature '{}'", name))
    }
}

impl SurrogatePredictor for LinearSurrogate {
    fn predict(&self, features: &FeatureMap) -> std::result::Result<f64, String> {
        let mut y = self.intercept;
        for (name, coef) in &self.linear {
            y += coef * Self::feature(features, name)?;
        }
        for (name, coef) in &self.quadratic {
            let x = Self::feature(features, name)?;
            y += coef * x * x;
        }
        Ok(y)
    }
}

/// On-disk layout of a model bundle: `[targets.<name>]` tables.
#[derive(Debug, Deserialize)]
struct BundleFile {
    targets: BTreeMap<String, LinearSurrogate>,
}

/// Mapping of target name to predictor.
#[derive(Default)]
pub struct ModelBundle {
    models: BTreeMap<String, Box<dyn SurrogatePredictor>>,
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("targets", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the predictor for `target`.
    pub fn insert(&mut self, target: impl Into<String>, model: impl SurrogatePredictor + 'static) {
        self.models.insert(target.into(), Box::new(model));
    }

    pub fn with(mut self, target: impl Into<String>, model: impl SurrogatePredictor + 'static) -> Self {
        self.insert(target, model);
        self
    }

    /// Load a bundle of [`LinearSurrogate`] models from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let bundle = Self::from_toml_str(&text).map_err(|source| EngineError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), targets = bundle.len(), "loaded model bundle");
        Ok(bundle)
    }

    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: BundleFile = toml::from_str(text)?;
        let mut bundle = Self::new();
        for (target, model) in file.targets {
            bundle.insert(target, model);
        }
        Ok(bundle)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.models.contains_key(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Predict `target`. Fails if the target is missing, the model fails, or
    /// the prediction is not finite.
    pub fn predict(&self, target: &str, features: &FeatureMap) -> Result<f64> {
        let model = self
            .models
            .get(target)
            .ok_or_else(|| EngineError::evaluation(target, "no model registered for target"))?;
        let y = model
            .predict(features)
            .map_err(|reason| EngineError::evaluation(target, reason))?;
        if !y.is_finite() {
            return Err(EngineError::evaluation(
                target,
                format!("non-finite prediction {}", y),
            ));
        }
        Ok(y)
    }

    /// Predict every registered target, keyed by target name.
    pub fn predict_all(&self, features: &FeatureMap) -> Result<BTreeMap<String, f64>> {
        self.models
            .keys()
            .map(|target| Ok((target.clone(), self.predict(target, features)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pairs: &[(&str, f64)]) -> FeatureMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_linear_surrogate_prediction() {
        let model = LinearSurrogate {
            intercept: 1.0,
            linear: [("a".to_string(), 2.0)].into_iter().collect(),
            quadratic: [("b".to_string(), 0.5)].into_iter().collect(),
        };
        let y = model.predict(&features(&[("a", 3.0), ("b", 2.0)])).unwrap();
        assert!((y - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_feature_is_error() {
        let model = LinearSurrogate {
            intercept: 0.0,
            linear: [("a".to_string(), 1.0)].into_iter().collect(),
            quadratic: BTreeMap::new(),
        };
        assert!(model.predict(&features(&[("b", 1.0)])).is_err());
    }

    #[test]
    fn test_bundle_missing_target() {
        let bundle = ModelBundle::new();
        let err = bundle.predict("total_energy", &FeatureMap::new()).unwrap_err();
        assert!(err.is_evaluation());
    }

    #[test]
    fn test_bundle_rejects_non_finite() {
        let bundle = ModelBundle::new()
            .with("nan", |_: &FeatureMap| Ok::<_, String>(f64::NAN))
            .with("inf", |_: &FeatureMap| Ok::<_, String>(f64::INFINITY));
        assert!(bundle.predict("nan", &FeatureMap::new()).is_err());
        assert!(bundle.predict("inf", &FeatureMap::new()).is_err());
    }

    #[test]
    fn test_bundle_from_toml() {
        let text = r#"
            [targets.total_energy]
            intercept = 100.0
            linear = { R5_DO = 12.0 }

            [targets.EQ_contrib]
            intercept = 50.0
            linear = { R5_DO = -4.0, R2_NO2 = -1.0 }
        "#;
        let bundle = ModelBundle::from_toml_str(text).unwrap();
        assert_eq!(bundle.len(), 2);
        let f = features(&[("R5_DO", 2.0), ("R2_NO2", 1.0)]);
        assert!((bundle.predict("total_energy", &f).unwrap() - 124.0).abs() < 1e-12);
        assert!((bundle.predict("EQ_contrib", &f).unwrap() - 41.0).abs() < 1e-12);
        assert_eq!(bundle.predict_all(&f).unwrap().len(), 2);
    }

    #[test]
    fn test_bundle_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.toml");
        fs::write(&path, "[targets.SNH]\nintercept = 2.5\n").unwrap();
        let bundle = ModelBundle::load(&path).unwrap();
        assert!(bundle.contains("SNH"));

        let missing = ModelBundle::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, EngineError::Io { .. }));
    }
}
