//! boosters-xgb: a safe handle over a natively-resident gradient-boosted-tree
//! model.
//!
//! The model lives entirely inside a native library (XGBoost). This crate owns
//! the handle to it and mediates every call: creation and exactly-once
//! release, parameter forwarding, the one-iteration training protocol with
//! optional host-side objectives and metrics, decoding flat prediction buffers
//! into matrices, model bytes, text dumps and distributed checkpoints.
//!
//! # Key Types
//!
//! - [`Booster`] - The owned model handle
//! - [`NativeApi`] - The native call surface; [`native::xgboost::XgbNative`]
//!   (feature `xgboost`) or [`testing::FakeNative`]
//! - [`Params`] / [`BoosterConfig`] - Parameters applied at construction
//! - [`DMatrix`] - Datasets the booster reads from
//! - [`BoosterError`] - Typed errors, tagged with the failing [`Phase`]
//!
//! # Example
//!
//! ```
//! use boosters_xgb::testing::FakeNative;
//! use boosters_xgb::{Booster, Params};
//!
//! let api = FakeNative::new();
//! let dtrain = api.dmatrix(10);
//!
//! let params = Params::new().set("objective", "reg:squarederror").set("eta", 0.3);
//! let mut booster = Booster::new(api.clone(), &[&dtrain], &params).unwrap();
//! for i in 0..5 {
//!     booster.update(&dtrain, i).unwrap();
//! }
//!
//! let preds = booster.predict(&dtrain).unwrap();
//! assert_eq!(preds.nrows(), 10);
//!
//! booster.dispose();
//! assert_eq!(booster.handle(), 0);
//! ```

pub mod booster;
mod checkpoint;
pub mod data;
pub mod dump;
pub mod error;
pub mod native;
pub mod params;
pub mod persist;
pub mod predict;
pub mod testing;
pub mod training;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use booster::Booster;
pub use data::{DMatrix, EvalSet};
pub use dump::{FeatureMap, FeatureMapError, FeatureScore, FeatureType, ModelDump};
pub use error::{BoosterError, ContractViolation, Phase, Result};
pub use native::{NativeApi, RawHandle};
pub use params::{BoosterConfig, Params};
pub use persist::BoosterSeed;
pub use predict::{decode_predictions, PredictOptions};
