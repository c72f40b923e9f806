//! Error taxonomy for the optimization and decision engine.

use thiserror::Error;

/// Errors raised by the engine.
///
/// Configuration errors are raised before any evaluation starts. Evaluation
/// errors abort a run in progress and discard its partial results. A
/// degenerate ranking is reported instead of picking an arbitrary candidate.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("evaluation of target '{target}' failed: {reason}")]
    Evaluation { target: String, reason: String },

    #[error("degenerate ranking: ideal and negative-ideal solutions coincide for all {candidates} candidates")]
    DegenerateRanking { candidates: usize },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl EngineError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn evaluation(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Evaluation {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_evaluation(&self) -> bool {
        matches!(self, Self::Evaluation { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Bail out with a configuration error, `anyhow::bail!` style.
macro_rules! invalid {
    ($($arg:tt)*) => {
        return Err($crate::error::EngineError::Configuration(format!($($arg)*)))
    };
}

pub(crate) use invalid;
