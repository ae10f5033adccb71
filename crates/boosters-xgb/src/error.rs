//! Error types and native status translation.
//!
//! Every gateway call reports a status. [`check_call`] turns a failed status into
//! [`BoosterError::Native`], pulling the diagnostic text from the native side
//! right after the failing call. Caller mistakes that are detected before the
//! native side is reached are reported as [`ContractViolation`]s.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::native::{NativeApi, NativeResult};

// =============================================================================
// Phase
// =============================================================================

/// Which part of the booster protocol an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Create,
    Configure,
    Train,
    Evaluate,
    Predict,
    Serialize,
    Dump,
    Checkpoint,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Create => "create",
            Phase::Configure => "configure",
            Phase::Train => "train",
            Phase::Evaluate => "evaluate",
            Phase::Predict => "predict",
            Phase::Serialize => "serialize",
            Phase::Dump => "dump",
            Phase::Checkpoint => "checkpoint",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Caller-side misuse detected before any native call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// Gradient and hessian arrays are not aligned.
    #[error("grad/hess length mismatch {grad} / {hess}")]
    GradientLengthMismatch { grad: usize, hess: usize },

    /// Dataset reports zero rows, so predictions cannot be reshaped.
    #[error("dataset has no rows")]
    EmptyDataset,

    /// Prediction buffer length is not a multiple of the row count.
    #[error("prediction buffer of length {len} does not divide into {n_rows} rows")]
    RaggedPredictions { len: usize, n_rows: usize },

    /// Operation attempted on a handle that was already disposed.
    #[error("booster handle already disposed (during {phase})")]
    Disposed { phase: Phase },

    /// Margin and leaf output were both requested.
    #[error("output_margin and pred_leaf cannot be requested together")]
    ConflictingPredictOptions,

    /// Eval datasets and eval names differ in length.
    #[error("{dmats} eval datasets but {names} eval names")]
    EvalNamesMismatch { dmats: usize, names: usize },

    /// A string crossing the native boundary contains a NUL byte.
    #[error("{what} contains an interior NUL byte")]
    InteriorNul { what: &'static str },
}

/// Errors raised by booster operations.
#[derive(Debug, Error)]
pub enum BoosterError {
    /// The native library reported a failure.
    #[error("native call failed during {phase} (status {code}): {message}")]
    Native {
        phase: Phase,
        code: i32,
        message: String,
    },

    /// The caller broke an API contract.
    #[error(transparent)]
    Contract(#[from] ContractViolation),

    /// Reading or writing a local file failed.
    #[error("I/O failure during {phase} on {}: {source}", path.display())]
    Io {
        phase: Phase,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The native library could not be initialized.
    #[error("native library initialization failed: {0}")]
    Init(String),
}

impl BoosterError {
    /// True for errors that indicate a programming mistake rather than a runtime failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, BoosterError::Contract(_))
    }

    /// The protocol phase the error was raised in, when known.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            BoosterError::Native { phase, .. } | BoosterError::Io { phase, .. } => Some(*phase),
            BoosterError::Contract(ContractViolation::Disposed { phase }) => Some(*phase),
            BoosterError::Contract(_) | BoosterError::Init(_) => None,
        }
    }

    pub(crate) fn io(phase: Phase, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BoosterError::Io {
            phase,
            path: path.into(),
            source,
        }
    }
}

/// Result type for booster operations.
pub type Result<T> = std::result::Result<T, BoosterError>;

// =============================================================================
// Status Translation
// =============================================================================

/// Pass a successful native result through, or convert the failure into
/// [`BoosterError::Native`] carrying the native diagnostic message.
pub fn check_call<T>(api: &dyn NativeApi, phase: Phase, result: NativeResult<T>) -> Result<T> {
    result.map_err(|status| BoosterError::Native {
        phase,
        code: status.code(),
        message: api.last_error(),
    })
}

/// Reject strings the native side would silently truncate.
pub(crate) fn ensure_no_nul(what: &'static str, value: &str) -> Result<()> {
    if value.contains('\0') {
        return Err(ContractViolation::InteriorNul { what }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::StatusCode;
    use crate::testing::FakeNative;

    #[test]
    fn success_passes_through() {
        let api = FakeNative::new();
        let value = check_call(&*api, Phase::Create, Ok(7usize)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn failure_carries_native_message() {
        let api = FakeNative::new();
        api.set_last_error("bad parameter");
        let err = check_call::<()>(&*api, Phase::Configure, Err(StatusCode::FAILURE))
            .unwrap_err();

        match &err {
            BoosterError::Native {
                phase,
                code,
                message,
            } => {
                assert_eq!(*phase, Phase::Configure);
                assert_eq!(*code, -1);
                assert_eq!(message, "bad parameter");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "native call failed during configure (status -1): bad parameter"
        );
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn contract_violation_display() {
        let err: BoosterError = ContractViolation::GradientLengthMismatch { grad: 3, hess: 2 }.into();
        assert!(err.is_contract_violation());
        assert_eq!(err.to_string(), "grad/hess length mismatch 3 / 2");
        assert_eq!(err.phase(), None);
    }

    #[test]
    fn nul_bytes_rejected() {
        assert!(ensure_no_nul("key", "eta").is_ok());
        let err = ensure_no_nul("key", "e\0ta").unwrap_err();
        assert!(matches!(
            err,
            BoosterError::Contract(ContractViolation::InteriorNul { what: "key" })
        ));
    }
}
