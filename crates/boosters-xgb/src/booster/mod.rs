//! The [`Booster`] handle.
//!
//! A `Booster` exclusively owns one native booster. It is created over zero or
//! more cached datasets (or from a saved model), configured with string
//! parameters, trained one iteration at a time, and released exactly once,
//! either through [`Booster::dispose`] or when it is dropped.
//!
//! # Concurrency
//!
//! `Booster` is `Send + Sync`. Prediction, serialization, dumps and disposal
//! take `&self` and are serialized on an internal lock, since the native side
//! hands out buffers it reuses on the next call. Configuration and training
//! take `&mut self`: sharing a booster between threads therefore only allows
//! the read-side operations.

mod handle;

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ndarray::Array2;

use crate::data::{handles_of, DMatrix};
use crate::dump::{FeatureMap, FeatureScore, ModelDump};
use crate::error::{check_call, ensure_no_nul, BoosterError, ContractViolation, Phase, Result};
use crate::native::{NativeApi, RawHandle};
use crate::params::{BoosterConfig, Params};
use crate::predict::{decode_predictions, PredictOptions};
use crate::training::eval::push_eval_entry;
use crate::training::{EvalFn, ObjectiveFn};

pub(crate) use handle::HandleCell;

/// Owned handle to a native gradient-boosted-tree model.
pub struct Booster {
    pub(crate) api: Arc<dyn NativeApi>,
    pub(crate) handle: HandleCell,
    lock: Mutex<()>,
}

impl std::fmt::Debug for Booster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Booster")
            .field("handle", &format_args!("{:#x}", self.handle.raw()))
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Construction and lifecycle
// =============================================================================

impl Booster {
    /// Create a booster caching `dmats`, then apply `params`.
    ///
    /// `seed=0` is applied before `params`, so a `seed` entry in `params`
    /// overrides it.
    pub fn new(api: Arc<dyn NativeApi>, dmats: &[&dyn DMatrix], params: &Params) -> Result<Self> {
        let config = BoosterConfig::builder().params(params.clone()).build();
        Self::with_config(api, dmats, &config)
    }

    /// Create a booster caching `dmats`, then apply the config's seed and params.
    pub fn with_config(
        api: Arc<dyn NativeApi>,
        dmats: &[&dyn DMatrix],
        config: &BoosterConfig,
    ) -> Result<Self> {
        let mut booster = Self::create(api, dmats)?;
        booster.set_params(&config.applied())?;
        Ok(booster)
    }

    /// Load a model file saved with [`Booster::save_model`], then apply the
    /// default seed and `params`.
    pub fn load(api: Arc<dyn NativeApi>, path: impl AsRef<Path>, params: &Params) -> Result<Self> {
        let mut booster = Self::create(api, &[])?;
        booster.load_model(path)?;
        let config = BoosterConfig::builder().params(params.clone()).build();
        booster.set_params(&config.applied())?;
        Ok(booster)
    }

    /// Recreate a booster from bytes produced by [`Booster::to_bytes`].
    pub fn from_bytes(api: Arc<dyn NativeApi>, bytes: &[u8]) -> Result<Self> {
        let mut booster = Self::create(api, &[])?;
        booster.load_from_bytes(bytes)?;
        Ok(booster)
    }

    fn create(api: Arc<dyn NativeApi>, dmats: &[&dyn DMatrix]) -> Result<Self> {
        let handles = handles_of(dmats);
        let raw = check_call(&*api, Phase::Create, api.booster_create(&handles))?;
        if raw == 0 {
            return Err(BoosterError::Native {
                phase: Phase::Create,
                code: 0,
                message: "native create returned a null handle".to_string(),
            });
        }
        log::debug!("created booster {raw:#x} caching {} datasets", handles.len());
        Ok(Self {
            api,
            handle: HandleCell::new(raw),
            lock: Mutex::new(()),
        })
    }

    /// Current native handle; zero once disposed.
    pub fn handle(&self) -> RawHandle {
        self.handle.raw()
    }

    pub fn is_disposed(&self) -> bool {
        self.handle.raw() == 0
    }

    /// Release the native booster.
    ///
    /// Safe to call any number of times, from any thread: the native free runs
    /// at most once. A failing free is logged and otherwise ignored; the handle
    /// reads as zero afterwards either way.
    pub fn dispose(&self) {
        let _guard = self.guard();
        let Some(raw) = self.handle.take() else {
            return;
        };
        match self.api.booster_free(raw) {
            Ok(()) => log::debug!("freed booster {raw:#x}"),
            Err(status) => log::warn!(
                "failed to free booster {raw:#x} ({status}): {}",
                self.api.last_error()
            ),
        }
    }

    pub(crate) fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn api(&self) -> &dyn NativeApi {
        &*self.api
    }
}

impl Drop for Booster {
    fn drop(&mut self) {
        self.dispose();
    }
}

// =============================================================================
// Parameters
// =============================================================================

impl Booster {
    /// Forward one parameter, stringified with [`Display`](std::fmt::Display).
    pub fn set_param(&mut self, key: &str, value: impl std::fmt::Display) -> Result<()> {
        let value = value.to_string();
        ensure_no_nul("parameter name", key)?;
        ensure_no_nul("parameter value", &value)?;
        let handle = self.handle.live(Phase::Configure)?;
        check_call(
            self.api(),
            Phase::Configure,
            self.api.booster_set_param(handle, key, &value),
        )
    }

    /// Apply `params` in order, stopping at the first failure.
    pub fn set_params(&mut self, params: &Params) -> Result<()> {
        for (key, value) in params.iter() {
            self.set_param(key, value)?;
        }
        Ok(())
    }
}

// =============================================================================
// Training and evaluation
// =============================================================================

impl Booster {
    /// One boosting iteration using the natively configured objective.
    pub fn update(&mut self, dtrain: &dyn DMatrix, iteration: i32) -> Result<()> {
        let handle = self.handle.live(Phase::Train)?;
        check_call(
            self.api(),
            Phase::Train,
            self.api
                .booster_update_one_iter(handle, iteration, dtrain.handle()),
        )
    }

    /// One boosting iteration with gradients from a host-side objective.
    ///
    /// The objective sees the current raw margins on `dtrain`.
    pub fn update_custom<O>(&mut self, dtrain: &dyn DMatrix, objective: &mut O) -> Result<()>
    where
        O: ObjectiveFn + ?Sized,
    {
        let margins = self.predict_margin(dtrain)?;
        let (grad, hess) = objective.gradients(&margins, dtrain);
        self.boost(dtrain, &grad, &hess)
    }

    /// One boosting iteration with explicit gradients.
    ///
    /// Mismatched lengths are rejected without reaching the native side.
    pub fn boost(&mut self, dtrain: &dyn DMatrix, grad: &[f32], hess: &[f32]) -> Result<()> {
        if grad.len() != hess.len() {
            return Err(ContractViolation::GradientLengthMismatch {
                grad: grad.len(),
                hess: hess.len(),
            }
            .into());
        }
        let handle = self.handle.live(Phase::Train)?;
        check_call(
            self.api(),
            Phase::Train,
            self.api
                .booster_boost_one_iter(handle, dtrain.handle(), grad, hess),
        )
    }

    /// Evaluate the natively configured metrics; returns the native result line.
    pub fn eval_set(
        &mut self,
        dmats: &[&dyn DMatrix],
        names: &[&str],
        iteration: i32,
    ) -> Result<String> {
        check_eval_names(dmats, names)?;
        let handle = self.handle.live(Phase::Evaluate)?;
        let handles = handles_of(dmats);
        check_call(
            self.api(),
            Phase::Evaluate,
            self.api
                .booster_eval_one_iter(handle, iteration, &handles, names),
        )
    }

    /// Evaluate a host-side metric on each dataset in order.
    ///
    /// Returns one `"\t{name}-{metric}:{score}"` entry per dataset.
    pub fn eval_set_custom<E>(
        &mut self,
        dmats: &[&dyn DMatrix],
        names: &[&str],
        eval: &mut E,
    ) -> Result<String>
    where
        E: EvalFn + ?Sized,
    {
        check_eval_names(dmats, names)?;
        self.handle.live(Phase::Evaluate)?;
        let mut line = String::new();
        for (dmat, name) in dmats.iter().zip(names) {
            let predictions = self.predict(*dmat)?;
            let score = eval.eval(&predictions, *dmat);
            push_eval_entry(&mut line, name, eval.metric_name(), score);
        }
        Ok(line)
    }
}

fn check_eval_names(dmats: &[&dyn DMatrix], names: &[&str]) -> Result<()> {
    if dmats.len() != names.len() {
        return Err(ContractViolation::EvalNamesMismatch {
            dmats: dmats.len(),
            names: names.len(),
        }
        .into());
    }
    names
        .iter()
        .try_for_each(|name| ensure_no_nul("eval name", name))
}

// =============================================================================
// Prediction
// =============================================================================

impl Booster {
    /// Transformed predictions from all trees.
    pub fn predict(&self, dmat: &dyn DMatrix) -> Result<Array2<f32>> {
        self.predict_with(dmat, &PredictOptions::value())
    }

    /// Raw margins from all trees.
    pub fn predict_margin(&self, dmat: &dyn DMatrix) -> Result<Array2<f32>> {
        self.predict_with(dmat, &PredictOptions::margin())
    }

    /// Leaf index per tree; `tree_limit` 0 uses every tree.
    pub fn predict_leaf(&self, dmat: &dyn DMatrix, tree_limit: u32) -> Result<Array2<f32>> {
        self.predict_with(dmat, &PredictOptions::leaf().with_tree_limit(tree_limit))
    }

    /// Predict with explicit options; one row per dataset row.
    pub fn predict_with(&self, dmat: &dyn DMatrix, options: &PredictOptions) -> Result<Array2<f32>> {
        let mask = options.option_mask()?;
        let n_rows = dmat.num_rows();
        if n_rows == 0 {
            return Err(ContractViolation::EmptyDataset.into());
        }
        let buffer = {
            let _guard = self.guard();
            let handle = self.handle.live(Phase::Predict)?;
            check_call(
                self.api(),
                Phase::Predict,
                self.api
                    .booster_predict(handle, dmat.handle(), mask, options.tree_limit),
            )?
        };
        decode_predictions(buffer, n_rows)
    }
}

// =============================================================================
// Model files and dumps
// =============================================================================

impl Booster {
    /// Save the model to `path` in the native on-disk format.
    pub fn save_model(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let _guard = self.guard();
        let handle = self.handle.live(Phase::Serialize)?;
        check_call(
            self.api(),
            Phase::Serialize,
            self.api.booster_save_model(handle, path),
        )
    }

    /// Replace the model with one saved at `path`.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let handle = self.handle.live(Phase::Serialize)?;
        check_call(
            self.api(),
            Phase::Serialize,
            self.api.booster_load_model(handle, path),
        )?;
        log::debug!("loaded booster {handle:#x} from {}", path.display());
        Ok(())
    }

    /// Per-tree text dump, optionally with split statistics and feature names
    /// taken from a feature map file.
    pub fn dump(&self, with_stats: bool, fmap: Option<&Path>) -> Result<ModelDump> {
        let fmap = match fmap {
            None => "",
            Some(path) => path.to_str().ok_or_else(|| {
                BoosterError::io(
                    Phase::Dump,
                    path,
                    io::Error::new(io::ErrorKind::InvalidInput, "path is not valid UTF-8"),
                )
            })?,
        };
        ensure_no_nul("feature map path", fmap)?;
        let _guard = self.guard();
        let handle = self.handle.live(Phase::Dump)?;
        let trees = check_call(
            self.api(),
            Phase::Dump,
            self.api.booster_dump_model(handle, fmap, with_stats),
        )?;
        Ok(ModelDump::new(trees))
    }

    /// Dump using an in-memory feature map.
    pub fn dump_with_feature_map(&self, with_stats: bool, fmap: &FeatureMap) -> Result<ModelDump> {
        let file = write_feature_map(fmap)?;
        self.dump(with_stats, Some(file.path()))
    }

    /// Write the text dump to `path`, one `booster [i]:` header per tree.
    pub fn dump_model(
        &self,
        path: impl AsRef<Path>,
        with_stats: bool,
        fmap: Option<&Path>,
    ) -> Result<()> {
        let path = path.as_ref();
        let dump = self.dump(with_stats, fmap)?;
        let file = File::create(path).map_err(|e| BoosterError::io(Phase::Dump, path, e))?;
        dump.write_to(BufWriter::new(file))
            .map_err(|e| BoosterError::io(Phase::Dump, path, e))?;
        log::debug!("wrote {} trees to {}", dump.len(), path.display());
        Ok(())
    }

    /// Number of splits per feature across all trees.
    pub fn feature_score(&self, fmap: Option<&Path>) -> Result<FeatureScore> {
        Ok(self.dump(false, fmap)?.feature_score())
    }

    pub fn feature_score_with_map(&self, fmap: &FeatureMap) -> Result<FeatureScore> {
        Ok(self.dump_with_feature_map(false, fmap)?.feature_score())
    }
}

fn write_feature_map(fmap: &FeatureMap) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("fmap")
        .suffix(".txt")
        .tempfile()
        .map_err(|e| BoosterError::io(Phase::Dump, std::env::temp_dir(), e))?;
    fmap.write_to(file.as_file_mut())
        .map_err(|e| BoosterError::io(Phase::Dump, file.path(), e))?;
    Ok(file)
}
