
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum HyperparameterError {
    #[error("hyperparameter override {entry:?} must be formatted as PARAM:VALUE")]
    Malformed { entry: String },
    #[error("unknown hyperparameter {name:?}")]
    Unknown { name: String },
    #[error("invalid value {value:?} for hyperparameter {name}: {reason}")]
    InvalidValue { name: String, value: String, reason: &'static str }
}

/// Boosting hyperparameters.
/// A run builds one value from the defaults plus its overrides; it is never changed afterwards.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Hyperparameters {
    /// Maximum tree depth
    max_depth: usize,
    /// Learning rate applied to every leaf
    eta: f64,
    /// L2 regularization on leaf weights
    lambda: f64,
    /// Minimum loss reduction to make a split
    gamma: f64,
    /// Minimum hessian sum in each child
    min_child_weight: f64,
    /// Row fraction sampled per round
    subsample: f64,
    /// Feature fraction sampled per tree
    colsample_bytree: f64,
    /// Maximum number of quantile bins per feature
    max_bin: usize,
    /// Initial probability for every row
    base_score: f64,
    /// Threads used for split search
    nthread: usize,
    /// Seed for all sampling
    seed: u64
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            max_depth: 12,
            eta: 0.3,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            max_bin: 256,
            base_score: 0.5,
            nthread: 1,
            seed: 0
        }
    }
}

impl Hyperparameters {
    /// Returns a copy with `PARAM:VALUE` overrides applied in order
    /// # Arguments
    /// * `overrides` - entries such as `eta:0.1`; later entries win
    /// # Errors
    /// * if an entry is malformed, names an unknown parameter, or has an invalid value
    pub fn with_overrides(&self, overrides: &[String]) -> Result<Self, HyperparameterError> {
        let mut ret = self.clone();
        for entry in overrides.iter() {
            let (name, value) = entry.split_once(':')
                .ok_or(HyperparameterError::Malformed { entry: entry.clone() })?;
            ret.set(name.trim(), value.trim())?;
        }
        Ok(ret)
    }

    /// Sets one parameter from its string form
    /// # Errors
    /// * if the name is unknown or the value does not parse or is out of range
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), HyperparameterError> {
        let invalid = |reason: &'static str| HyperparameterError::InvalidValue {
            name: name.to_string(), value: value.to_string(), reason
        };
        let parse_f64 = || value.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or(invalid("expected a number"));
        let parse_usize = || value.parse::<usize>().map_err(|_e| invalid("expected a non-negative integer"));

        match name {
            "max_depth" => {
                self.max_depth = parse_usize()?;
                if self.max_depth == 0 { return Err(invalid("must be at least 1")); }
            },
            "eta" => {
                self.eta = parse_f64()?;
                if self.eta <= 0.0 { return Err(invalid("must be > 0")); }
            },
            "lambda" => {
                self.lambda = parse_f64()?;
                if self.lambda < 0.0 { return Err(invalid("must be >= 0")); }
            },
            "gamma" => {
                self.gamma = parse_f64()?;
                if self.gamma < 0.0 { return Err(invalid("must be >= 0")); }
            },
            "min_child_weight" => {
                self.min_child_weight = parse_f64()?;
                if self.min_child_weight < 0.0 { return Err(invalid("must be >= 0")); }
            },
            "subsample" => {
                self.subsample = parse_f64()?;
                if !(self.subsample > 0.0 && self.subsample <= 1.0) { return Err(invalid("must be in (0, 1]")); }
            },
            "colsample_bytree" => {
                self.colsample_bytree = parse_f64()?;
                if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) { return Err(invalid("must be in (0, 1]")); }
            },
            "max_bin" => {
                self.max_bin = parse_usize()?;
                if self.max_bin < 2 { return Err(invalid("must be at least 2")); }
            },
            "base_score" => {
                self.base_score = parse_f64()?;
                if !(self.base_score > 0.0 && self.base_score < 1.0) { return Err(invalid("must be in (0, 1)")); }
            },
            "nthread" => {
                self.nthread = parse_usize()?;
                if self.nthread == 0 { return Err(invalid("must be at least 1")); }
            },
            "seed" => {
                self.seed = value.parse::<u64>().map_err(|_e| invalid("expected a non-negative integer"))?;
            },
            _ => return Err(HyperparameterError::Unknown { name: name.to_string() })
        };
        Ok(())
    }

    // getters
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn min_child_weight(&self) -> f64 {
        self.min_child_weight
    }

    pub fn subsample(&self) -> f64 {
        self.subsample
    }

    pub fn colsample_bytree(&self) -> f64 {
        self.colsample_bytree
    }

    pub fn max_bin(&self) -> usize {
        self.max_bin
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn nthread(&self) -> usize {
        self.nthread
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let hp = Hyperparameters::default();
        assert_eq!(hp.max_depth(), 12);
        assert_eq!(hp.seed(), 0);
        assert_eq!(hp.nthread(), 1);
        assert_eq!(hp.eta(), 0.3);
    }

    #[test]
    fn test_overrides() {
        let defaults = Hyperparameters::default();
        let hp = defaults.with_overrides(&[
            "max_depth:4".to_string(),
            "eta: 0.1".to_string(),
            "seed:7".to_string(),
            "max_depth:5".to_string()
        ]).unwrap();
        assert_eq!(hp.max_depth(), 5);
        assert_eq!(hp.eta(), 0.1);
        assert_eq!(hp.seed(), 7);
        // the source value is untouched
        assert_eq!(defaults, Hyperparameters::default());
    }

    #[test]
    fn test_override_errors() {
        let hp = Hyperparameters::default();
        assert_eq!(
            hp.with_overrides(&["max_depth".to_string()]),
            Err(HyperparameterError::Malformed { entry: "max_depth".to_string() })
        );
        assert_eq!(
            hp.with_overrides(&["learning_rate:0.1".to_string()]),
            Err(HyperparameterError::Unknown { name: "learning_rate".to_string() })
        );
        assert!(hp.with_overrides(&["subsample:1.5".to_string()]).is_err());
        assert!(hp.with_overrides(&["max_depth:-1".to_string()]).is_err());
        assert!(hp.with_overrides(&["eta:abc".to_string()]).is_err());
        assert!(hp.with_overrides(&["nthread:0".to_string()]).is_err());
    }
}
