//! The native call surface.
//!
//! [`NativeApi`] is the seam between this crate and the library that actually
//! owns the boosting state. Each method corresponds to exactly one native
//! primitive: on success the outputs are returned by value, on failure only a
//! [`StatusCode`] is returned and the diagnostic text is available from
//! [`NativeApi::last_error`].
//!
//! # Implementations
//!
//! - [`xgboost::XgbNative`] (feature `xgboost`): the XGBoost C API.
//! - [`crate::testing::FakeNative`]: deterministic in-memory stand-in used by tests.

use std::fmt;
use std::path::Path;

#[cfg(feature = "xgboost")]
pub mod xgboost;

/// Opaque reference to native-side state (a booster or a dataset).
///
/// Zero is reserved for "no handle".
pub type RawHandle = usize;

/// Option mask bit requesting untransformed margin output.
pub const PRED_OUTPUT_MARGIN: i32 = 0x01;
/// Option mask bit requesting per-tree leaf indices.
pub const PRED_LEAF: i32 = 0x02;

/// Non-success status returned by a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(i32);

impl StatusCode {
    /// Generic failure status used by the XGBoost C API.
    pub const FAILURE: StatusCode = StatusCode(-1);

    /// Wrap a raw status. Returns `None` for the success status `0`.
    pub fn from_raw(code: i32) -> Option<Self> {
        (code != 0).then_some(StatusCode(code))
    }

    pub fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.0)
    }
}

/// Result of a single native call.
pub type NativeResult<T> = std::result::Result<T, StatusCode>;

/// Convert a raw C status into a [`NativeResult`].
pub fn status(code: i32) -> NativeResult<()> {
    match StatusCode::from_raw(code) {
        None => Ok(()),
        Some(status) => Err(status),
    }
}

/// Primitive operations exposed by a native boosting library.
///
/// Implementations must be callable from any thread. They do not need to
/// serialize calls on the same handle; [`crate::Booster`] does that where the
/// protocol requires it.
pub trait NativeApi: Send + Sync {
    /// Diagnostic text for the most recent failed call on this thread.
    fn last_error(&self) -> String;

    /// Create a booster, optionally caching the given datasets.
    fn booster_create(&self, dmats: &[RawHandle]) -> NativeResult<RawHandle>;

    /// Release a booster.
    fn booster_free(&self, handle: RawHandle) -> NativeResult<()>;

    fn booster_set_param(&self, handle: RawHandle, name: &str, value: &str) -> NativeResult<()>;

    /// Run one boosting iteration with natively computed gradients.
    fn booster_update_one_iter(
        &self,
        handle: RawHandle,
        iteration: i32,
        dtrain: RawHandle,
    ) -> NativeResult<()>;

    /// Run one boosting iteration with caller-supplied gradients.
    fn booster_boost_one_iter(
        &self,
        handle: RawHandle,
        dtrain: RawHandle,
        grad: &[f32],
        hess: &[f32],
    ) -> NativeResult<()>;

    /// Evaluate the configured metrics; returns the formatted result line.
    fn booster_eval_one_iter(
        &self,
        handle: RawHandle,
        iteration: i32,
        dmats: &[RawHandle],
        names: &[&str],
    ) -> NativeResult<String>;

    /// Predict; returns the flat output buffer.
    fn booster_predict(
        &self,
        handle: RawHandle,
        dmat: RawHandle,
        option_mask: i32,
        ntree_limit: u32,
    ) -> NativeResult<Vec<f32>>;

    fn booster_save_model(&self, handle: RawHandle, path: &Path) -> NativeResult<()>;

    fn booster_load_model(&self, handle: RawHandle, path: &Path) -> NativeResult<()>;

    /// Text dump, one string per tree. An empty `fmap` means no feature map.
    fn booster_dump_model(
        &self,
        handle: RawHandle,
        fmap: &str,
        with_stats: bool,
    ) -> NativeResult<Vec<String>>;

    fn booster_get_model_raw(&self, handle: RawHandle) -> NativeResult<Vec<u8>>;

    fn booster_load_model_from_buffer(&self, handle: RawHandle, buf: &[u8]) -> NativeResult<()>;

    /// Restore the thread-local distributed checkpoint; returns its version.
    fn booster_load_rabit_checkpoint(&self, handle: RawHandle) -> NativeResult<i32>;

    fn booster_save_rabit_checkpoint(&self, handle: RawHandle) -> NativeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_status_is_success() {
        assert_eq!(status(0), Ok(()));
        assert_eq!(StatusCode::from_raw(0), None);
    }

    #[test]
    fn nonzero_status_is_failure() {
        assert_eq!(status(-1), Err(StatusCode::FAILURE));
        assert_eq!(StatusCode::from_raw(3).map(StatusCode::code), Some(3));
        assert_eq!(StatusCode::FAILURE.to_string(), "status -1");
    }
}
