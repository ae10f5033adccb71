//! Evaluation results and host-side evaluation metrics.
//!
//! Both native and custom evaluation produce a single line of tab-prefixed
//! entries, `"\t{set}-{metric}:{score}"`. Native lines additionally start with
//! the iteration, e.g. `"[3]\ttrain-rmse:0.412\ttest-rmse:0.530"`.
//! [`parse_eval_string`] turns either form back into [`MetricValue`]s.

use std::fmt::Write as _;

use ndarray::Array2;

use crate::data::DMatrix;

// =============================================================================
// MetricValue
// =============================================================================

/// A computed metric value with metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    /// Name of the metric (e.g., "train-rmse", "valid-logloss").
    pub name: String,
    pub value: f64,
    /// Whether higher values are better (true for accuracy, false for RMSE).
    pub higher_is_better: bool,
    /// Evaluation set the value was computed on, when known.
    pub dataset: Option<String>,
}

impl MetricValue {
    pub fn new(name: impl Into<String>, value: f64, higher_is_better: bool) -> Self {
        Self {
            name: name.into(),
            value,
            higher_is_better,
            dataset: None,
        }
    }

    /// Tag the value with the evaluation set it belongs to.
    pub fn on_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    /// Whether this value was computed on the set named `dataset`.
    pub fn is_for(&self, dataset: &str) -> bool {
        self.dataset.as_deref() == Some(dataset)
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:.6}", self.name, self.value)
    }
}

/// Whether a native metric name is maximized.
///
/// Covers the XGBoost metrics where higher is better; everything else is a loss.
pub fn metric_higher_is_better(metric: &str) -> bool {
    let base = metric.split('@').next().unwrap_or(metric);
    matches!(base, "auc" | "aucpr" | "map" | "ndcg" | "pre")
}

// =============================================================================
// EvalFn
// =============================================================================

/// A host-side evaluation metric.
///
/// Called once per evaluation dataset with that dataset's transformed
/// predictions. Implementations may keep state between calls; they are always
/// invoked sequentially in dataset order.
pub trait EvalFn {
    /// Metric name used in the result line.
    fn metric_name(&self) -> &str;

    /// Score the predictions for `dmat`.
    fn eval(&mut self, predictions: &Array2<f32>, dmat: &dyn DMatrix) -> f32;

    fn higher_is_better(&self) -> bool {
        false
    }
}

/// An [`EvalFn`] built from a closure.
///
/// # Example
///
/// ```
/// use boosters_xgb::training::{CustomEval, EvalFn};
///
/// let mut calls = 0;
/// let metric = CustomEval::new("calls", move |_preds, _dmat| {
///     calls += 1;
///     calls as f32
/// });
/// assert_eq!(metric.metric_name(), "calls");
/// ```
pub struct CustomEval<F> {
    name: String,
    higher_is_better: bool,
    eval_fn: F,
}

impl<F> CustomEval<F>
where
    F: FnMut(&Array2<f32>, &dyn DMatrix) -> f32,
{
    pub fn new(name: impl Into<String>, eval_fn: F) -> Self {
        Self {
            name: name.into(),
            higher_is_better: false,
            eval_fn,
        }
    }

    pub fn maximize(mut self) -> Self {
        self.higher_is_better = true;
        self
    }
}

impl<F> EvalFn for CustomEval<F>
where
    F: FnMut(&Array2<f32>, &dyn DMatrix) -> f32,
{
    fn metric_name(&self) -> &str {
        &self.name
    }

    fn eval(&mut self, predictions: &Array2<f32>, dmat: &dyn DMatrix) -> f32 {
        (self.eval_fn)(predictions, dmat)
    }

    fn higher_is_better(&self) -> bool {
        self.higher_is_better
    }
}

impl<F> std::fmt::Debug for CustomEval<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomEval")
            .field("name", &self.name)
            .field("higher_is_better", &self.higher_is_better)
            .finish()
    }
}

// =============================================================================
// Eval line formatting / parsing
// =============================================================================

/// Append one custom evaluation entry, `"\t{set}-{metric}:{score}"`, with the
/// score in fixed-point notation with six decimals.
pub fn push_eval_entry(line: &mut String, set: &str, metric: &str, score: f32) {
    let _ = write!(line, "\t{set}-{metric}:{score:.6}");
}

/// Split an evaluation line into metric values.
///
/// Entries are matched against `set_names` (longest name first, so `train`
/// and `train-small` are told apart) and tagged with the set they matched.
/// Entries that do not belong to a known
/// set or do not carry a numeric score are skipped.
pub fn parse_eval_string(line: &str, set_names: &[&str]) -> Vec<MetricValue> {
    let mut names: Vec<&str> = set_names.to_vec();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));

    let mut values = Vec::new();
    for part in line.split('\t').skip(1) {
        let Some(set) = names.iter().find(|name| {
            part.strip_prefix(**name)
                .is_some_and(|rest| rest.len() > 1 && rest.starts_with('-'))
        }) else {
            log::debug!("skipping eval entry for unknown set: {part:?}");
            continue;
        };
        let rest = &part[set.len() + 1..];
        let Some((metric, score)) = rest.rsplit_once(':') else {
            log::debug!("skipping malformed eval entry: {part:?}");
            continue;
        };
        let Ok(score) = score.trim().parse::<f64>() else {
            log::debug!("skipping non-numeric eval score: {part:?}");
            continue;
        };
        values.push(
            MetricValue::new(
                format!("{set}-{metric}"),
                score,
                metric_higher_is_better(metric),
            )
            .on_dataset(*set),
        );
    }
    values
}
