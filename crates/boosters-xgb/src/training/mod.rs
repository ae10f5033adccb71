//! Training and evaluation on top of [`Booster`](crate::Booster).
//!
//! ## Pluggable callbacks
//!
//! - [`ObjectiveFn`] / [`CustomObjective`]: host-computed gradients and hessians
//! - [`EvalFn`] / [`CustomEval`]: host-computed evaluation metric
//!
//! ## Training loop
//!
//! - [`TrainConfig`], [`train`]: multi-round training with per-round evaluation
//! - [`EarlyStopping`]: stop when the monitored metric plateaus
//! - [`TrainingLogger`], [`Verbosity`]: progress output through `log`
//! - [`parse_eval_string`], [`MetricValue`]: structured view of eval result lines

mod callback;
pub(crate) mod eval;
mod logger;
mod objective;
mod trainer;

pub use callback::{EarlyStopAction, EarlyStopping};
pub use eval::{metric_higher_is_better, parse_eval_string, push_eval_entry, CustomEval, EvalFn, MetricValue};
pub use logger::{TrainingLogger, Verbosity};
pub use objective::{CustomObjective, GradHess, ObjectiveFn, SquaredError};
pub use trainer::{train, ConfigError, TrainConfig, TrainHooks, TrainOutcome};
