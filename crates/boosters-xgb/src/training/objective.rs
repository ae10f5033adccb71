//! Host-side objectives.
//!
//! An objective turns the current raw margins into per-sample gradients and
//! hessians, which are then handed to the native side with
//! [`Booster::boost`](crate::Booster::boost).

use ndarray::Array2;

use crate::data::DMatrix;

/// Gradient and hessian vectors, aligned by sample index.
pub type GradHess = (Vec<f32>, Vec<f32>);

/// A host-computed training objective.
pub trait ObjectiveFn {
    /// Compute `(grad, hess)` from raw margin predictions on `dtrain`.
    ///
    /// Both vectors must have the same length; the booster rejects the
    /// iteration otherwise.
    fn gradients(&mut self, margins: &Array2<f32>, dtrain: &dyn DMatrix) -> GradHess;
}

/// An [`ObjectiveFn`] built from a closure.
///
/// # Example
///
/// ```
/// use boosters_xgb::training::CustomObjective;
///
/// // Squared error against a fixed target of 1.0.
/// let objective = CustomObjective::new(|margins, _dtrain| {
///     let grad: Vec<f32> = margins.iter().map(|m| m - 1.0).collect();
///     let hess = vec![1.0; grad.len()];
///     (grad, hess)
/// });
/// # let _ = objective;
/// ```
pub struct CustomObjective<F> {
    gradient_fn: F,
}

impl<F> CustomObjective<F>
where
    F: FnMut(&Array2<f32>, &dyn DMatrix) -> GradHess,
{
    pub fn new(gradient_fn: F) -> Self {
        Self { gradient_fn }
    }
}

impl<F> ObjectiveFn for CustomObjective<F>
where
    F: FnMut(&Array2<f32>, &dyn DMatrix) -> GradHess,
{
    fn gradients(&mut self, margins: &Array2<f32>, dtrain: &dyn DMatrix) -> GradHess {
        (self.gradient_fn)(margins, dtrain)
    }
}

impl<F> std::fmt::Debug for CustomObjective<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomObjective").finish_non_exhaustive()
    }
}

/// Squared error against a label slice.
///
/// Mostly useful for tests and examples; real objectives usually live
/// natively.
#[derive(Debug, Clone)]
pub struct SquaredError {
    labels: Vec<f32>,
}

impl SquaredError {
    pub fn new(labels: impl Into<Vec<f32>>) -> Self {
        Self {
            labels: labels.into(),
        }
    }
}

impl ObjectiveFn for SquaredError {
    fn gradients(&mut self, margins: &Array2<f32>, _dtrain: &dyn DMatrix) -> GradHess {
        let grad: Vec<f32> = margins
            .iter()
            .zip(self.labels.iter().cycle())
            .map(|(pred, label)| pred - label)
            .collect();
        let hess = vec![1.0; grad.len()];
        (grad, hess)
    }
}
