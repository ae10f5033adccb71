//! Verbosity-gated training progress logging.
//!
//! Messages go through the [`log`] facade; nothing is printed unless the
//! application installs a logger.

use std::fmt::Write as _;

use super::eval::MetricValue;

/// Verbosity level for training output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verbosity {
    /// No output.
    #[default]
    Silent,
    /// Errors and warnings only.
    Warning,
    /// Progress and important information.
    Info,
    /// Detailed debugging information.
    Debug,
}

/// Emits training progress at the configured verbosity.
#[derive(Debug, Clone)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    n_rounds: usize,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            n_rounds: 0,
        }
    }

    pub fn start_training(&mut self, n_rounds: usize) {
        self.n_rounds = n_rounds;
        if self.verbosity >= Verbosity::Info {
            log::info!("starting training for {n_rounds} rounds");
        }
    }

    /// Log one round of metrics as `[round]\tname:value...`.
    pub fn log_metrics(&self, round: usize, metrics: &[MetricValue]) {
        if self.verbosity < Verbosity::Info || metrics.is_empty() {
            return;
        }
        log::info!("{}", format_round(round, metrics));
    }

    /// Log the raw native evaluation line.
    pub fn log_eval_line(&self, line: &str) {
        if self.verbosity >= Verbosity::Debug {
            log::debug!("native eval: {line}");
        }
    }

    pub fn log_early_stopping(&self, round: usize, best_round: usize, metric_name: &str) {
        if self.verbosity >= Verbosity::Info {
            log::info!(
                "early stopping at round {round}; best {metric_name} was at round {best_round}"
            );
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= Verbosity::Warning {
            log::warn!("{message}");
        }
    }

    pub fn finish_training(&self) {
        if self.verbosity >= Verbosity::Info {
            log::info!("training finished ({} rounds requested)", self.n_rounds);
        }
    }
}

fn format_round(round: usize, metrics: &[MetricValue]) -> String {
    let mut line = format!("[{round}]");
    for m in metrics {
        let _ = write!(line, "\t{}:{:.6}", m.name, m.value);
    }
    line
}
