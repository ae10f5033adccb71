//! Multi-round training loop.
//!
//! [`train`] creates a booster over the training and evaluation datasets and
//! drives it for a fixed number of rounds, evaluating after every round and
//! optionally stopping early.
//!
//! # Example
//!
//! ```
//! use boosters_xgb::testing::FakeNative;
//! use boosters_xgb::training::{train, TrainConfig, TrainHooks};
//! use boosters_xgb::{BoosterConfig, EvalSet, Params};
//!
//! let api = FakeNative::new();
//! let dtrain = api.dmatrix(8);
//! let dvalid = api.dmatrix(4);
//!
//! let config = TrainConfig::builder()
//!     .booster(BoosterConfig::builder().params(Params::new().set("eta", 0.3)).build())
//!     .n_rounds(5)
//!     .build()
//!     .unwrap();
//!
//! let outcome = train(
//!     api.clone(),
//!     &config,
//!     &dtrain,
//!     &[EvalSet::new("valid", &dvalid)],
//!     TrainHooks::default(),
//! )
//! .unwrap();
//! assert_eq!(outcome.history.len(), 5);
//! ```

use std::sync::Arc;

use bon::Builder;

use super::callback::{EarlyStopAction, EarlyStopping};
use super::eval::{parse_eval_string, EvalFn, MetricValue};
use super::logger::{TrainingLogger, Verbosity};
use super::objective::ObjectiveFn;
use crate::booster::Booster;
use crate::data::{DMatrix, EvalSet};
use crate::error::Result;
use crate::native::NativeApi;
use crate::params::BoosterConfig;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Number of rounds must be at least 1.
    InvalidNRounds,
    /// Early stopping patience must be at least 1 when set.
    InvalidEarlyStoppingRounds,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNRounds => write!(f, "n_rounds must be at least 1"),
            Self::InvalidEarlyStoppingRounds => {
                write!(f, "early_stopping_rounds must be at least 1 when set")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// =============================================================================
// TrainConfig
// =============================================================================

/// Configuration of the training loop.
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct TrainConfig {
    /// Parameters the booster is created with.
    #[builder(default)]
    pub booster: BoosterConfig,

    /// Number of boosting rounds. Default: 10.
    #[builder(default = 10)]
    pub n_rounds: u32,

    // === Early stopping ===
    /// Stop if the monitored metric has not improved for this many rounds.
    /// `None` disables early stopping.
    pub early_stopping_rounds: Option<u32>,

    /// Index of the eval set to monitor. `None` monitors the last one.
    pub early_stopping_eval_set: Option<usize>,

    /// Treat the monitored metric as higher-is-better even if its name does
    /// not say so.
    #[builder(default)]
    pub maximize: bool,

    // === Logging ===
    /// Verbosity level. Default: `Silent`.
    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: train_config_builder::IsComplete> TrainConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `n_rounds == 0` or
    /// `early_stopping_rounds == Some(0)`.
    pub fn build(self) -> std::result::Result<TrainConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl TrainConfig {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.n_rounds == 0 {
            return Err(ConfigError::InvalidNRounds);
        }
        if self.early_stopping_rounds == Some(0) {
            return Err(ConfigError::InvalidEarlyStoppingRounds);
        }
        Ok(())
    }
}

// =============================================================================
// Hooks and outcome
// =============================================================================

/// Optional host-side objective and metric.
///
/// Without an objective each round uses the natively configured one; without
/// a metric each round is evaluated natively.
#[derive(Default)]
pub struct TrainHooks<'h> {
    pub objective: Option<&'h mut dyn ObjectiveFn>,
    pub eval: Option<&'h mut dyn EvalFn>,
}

impl<'h> TrainHooks<'h> {
    pub fn with_objective(mut self, objective: &'h mut dyn ObjectiveFn) -> Self {
        self.objective = Some(objective);
        self
    }

    pub fn with_eval(mut self, eval: &'h mut dyn EvalFn) -> Self {
        self.eval = Some(eval);
        self
    }
}

/// Result of [`train`].
#[derive(Debug)]
pub struct TrainOutcome {
    pub booster: Booster,
    /// Round with the best monitored metric, if any eval set was given.
    pub best_iteration: Option<usize>,
    pub best_score: Option<f64>,
    /// Metrics parsed from every round's evaluation line.
    pub history: Vec<Vec<MetricValue>>,
}

// =============================================================================
// train
// =============================================================================

/// Create a booster and train it for `config.n_rounds` rounds.
///
/// The booster caches `dtrain` followed by every eval dataset. Any native
/// failure aborts training and is returned; the partially trained booster is
/// dropped (and freed) with it.
pub fn train(
    api: Arc<dyn NativeApi>,
    config: &TrainConfig,
    dtrain: &dyn DMatrix,
    evals: &[EvalSet<'_>],
    hooks: TrainHooks<'_>,
) -> Result<TrainOutcome> {
    let TrainHooks {
        mut objective,
        mut eval,
    } = hooks;

    let mut cache: Vec<&dyn DMatrix> = vec![dtrain];
    cache.extend(evals.iter().map(|e| e.dmat));
    let mut booster = Booster::with_config(api, &cache, &config.booster)?;

    let eval_dmats: Vec<&dyn DMatrix> = evals.iter().map(|e| e.dmat).collect();
    let eval_names: Vec<&str> = evals.iter().map(|e| e.name).collect();
    let mut logger = TrainingLogger::new(config.verbosity);
    let monitored = monitored_set(config, &eval_names, &logger);
    logger.start_training(config.n_rounds as usize);

    let patience = config.early_stopping_rounds.unwrap_or(0) as usize;
    let mut stopper: Option<EarlyStopping> = None;
    let mut history = Vec::new();

    for round in 0..config.n_rounds as usize {
        match objective.as_deref_mut() {
            Some(obj) => booster.update_custom(dtrain, obj)?,
            None => booster.update(dtrain, round as i32)?,
        }

        let Some(set) = monitored else {
            continue;
        };

        let line = match eval.as_deref_mut() {
            Some(metric) => booster.eval_set_custom(&eval_dmats, &eval_names, metric)?,
            None => booster.eval_set(&eval_dmats, &eval_names, round as i32)?,
        };
        logger.log_eval_line(&line);
        let metrics = parse_eval_string(&line, &eval_names);
        logger.log_metrics(round, &metrics);

        let watched = metrics.iter().rev().find(|m| m.is_for(set));
        if let Some(metric) = watched {
            let maximize = config.maximize
                || metric.higher_is_better
                || eval.as_deref().is_some_and(|e| e.higher_is_better());
            let stopper = stopper.get_or_insert_with(|| EarlyStopping::new(patience, maximize));
            if stopper.update(metric.value) == EarlyStopAction::Stop {
                logger.log_early_stopping(round, stopper.best_round(), &metric.name);
                history.push(metrics);
                break;
            }
        }
        history.push(metrics);
    }

    logger.finish_training();

    Ok(TrainOutcome {
        booster,
        best_iteration: stopper.as_ref().map(EarlyStopping::best_round),
        best_score: stopper.as_ref().and_then(EarlyStopping::best_value),
        history,
    })
}

/// Name of the eval set early stopping watches, if there is one.
fn monitored_set<'a>(
    config: &TrainConfig,
    names: &[&'a str],
    logger: &TrainingLogger,
) -> Option<&'a str> {
    let last = names.last().copied()?;
    match config.early_stopping_eval_set {
        None => Some(last),
        Some(idx) => match names.get(idx) {
            Some(name) => Some(*name),
            None => {
                logger.warn(&format!(
                    "early_stopping_eval_set {idx} out of range for {} eval sets; watching {last:?}",
                    names.len()
                ));
                Some(last)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TrainConfig::builder().build().unwrap();
        assert_eq!(config.n_rounds, 10);
        assert!(config.early_stopping_rounds.is_none());
        assert!(!config.maximize);
        assert_eq!(config.verbosity, Verbosity::Silent);
    }

    #[test]
    fn rejects_zero_rounds() {
        let err = TrainConfig::builder().n_rounds(0).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidNRounds);
        assert_eq!(err.to_string(), "n_rounds must be at least 1");
    }

    #[test]
    fn rejects_zero_patience() {
        let err = TrainConfig::builder()
            .early_stopping_rounds(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidEarlyStoppingRounds);
    }

    #[test]
    fn monitored_set_defaults_to_last() {
        let logger = TrainingLogger::new(Verbosity::Silent);
        let config = TrainConfig::default();
        assert_eq!(monitored_set(&config, &["train", "valid"], &logger), Some("valid"));
        assert_eq!(monitored_set(&config, &[], &logger), None);

        let config = TrainConfig::builder()
            .early_stopping_eval_set(0)
            .build()
            .unwrap();
        assert_eq!(monitored_set(&config, &["train", "valid"], &logger), Some("train"));

        let config = TrainConfig::builder()
            .early_stopping_eval_set(5)
            .build()
            .unwrap();
        assert_eq!(monitored_set(&config, &["train", "valid"], &logger), Some("valid"));
    }
}
