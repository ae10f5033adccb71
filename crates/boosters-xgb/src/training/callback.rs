//! Early stopping for the training loop.
//!
//! Watches one evaluation metric and signals when it has not improved for
//! `patience` consecutive rounds.

/// What the training loop should do after a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyStopAction {
    /// The metric improved on its best value.
    Improved,
    /// No improvement, but patience is not exhausted.
    Continue,
    /// Patience exhausted.
    Stop,
}

/// Early stopping state.
///
/// # Example
///
/// ```
/// use boosters_xgb::training::{EarlyStopAction, EarlyStopping};
///
/// let mut early_stop = EarlyStopping::new(2, false); // lower is better
/// assert_eq!(early_stop.update(0.5), EarlyStopAction::Improved);
/// assert_eq!(early_stop.update(0.6), EarlyStopAction::Continue);
/// assert_eq!(early_stop.update(0.7), EarlyStopAction::Stop);
/// assert_eq!(early_stop.best_round(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    /// Rounds without improvement before stopping; 0 disables.
    patience: usize,
    higher_is_better: bool,
    best_value: Option<f64>,
    best_round: usize,
    current_round: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, higher_is_better: bool) -> Self {
        Self {
            patience,
            higher_is_better,
            best_value: None,
            best_round: 0,
            current_round: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.patience > 0
    }

    /// Record the metric for the current round.
    pub fn update(&mut self, value: f64) -> EarlyStopAction {
        let round = self.current_round;
        self.current_round += 1;

        let improved = match self.best_value {
            None => !value.is_nan(),
            Some(best) if self.higher_is_better => value > best,
            Some(best) => value < best,
        };
        if improved {
            self.best_value = Some(value);
            self.best_round = round;
            return EarlyStopAction::Improved;
        }

        if self.is_enabled() && round - self.best_round >= self.patience {
            EarlyStopAction::Stop
        } else {
            EarlyStopAction::Continue
        }
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    pub fn best_round(&self) -> usize {
        self.best_round
    }
}
