//! In-memory native library for tests.
//!
//! [`FakeNative`] implements [`NativeApi`] with a tiny deterministic model:
//! every boosting iteration appends one stump, predictions are a closed-form
//! function of the row index and the stumps, and model bytes are the model
//! state encoded as JSON. It records every call and can be told to fail the
//! next call of a given kind, which is what most of this crate's tests rely on.
//!
//! ```
//! use boosters_xgb::testing::{FakeNative, NativeOp};
//! use boosters_xgb::{Booster, Params};
//!
//! let api = FakeNative::new();
//! let dtrain = api.dmatrix(3);
//! let mut booster = Booster::new(api.clone(), &[&dtrain], &Params::new()).unwrap();
//!
//! api.fail_next(NativeOp::UpdateOneIter, "out of memory");
//! let err = booster.update(&dtrain, 0).unwrap_err();
//! assert!(err.to_string().ends_with("out of memory"));
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::data::DMatrix;
use crate::dump::FeatureMap;
use crate::native::{NativeApi, NativeResult, RawHandle, StatusCode, PRED_LEAF, PRED_OUTPUT_MARGIN};

const BASE_SCORE: f32 = 0.5;
const DEFAULT_ETA: f32 = 0.3;
const N_FEATURES: usize = 3;

/// Native primitive, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeOp {
    Create,
    Free,
    SetParam,
    UpdateOneIter,
    BoostOneIter,
    EvalOneIter,
    Predict,
    SaveModel,
    LoadModel,
    DumpModel,
    GetModelRaw,
    LoadModelFromBuffer,
    LoadCheckpoint,
    SaveCheckpoint,
}

/// One recorded native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub op: NativeOp,
    pub handle: RawHandle,
}

// =============================================================================
// Model state
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Stump {
    feature: usize,
    weight: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct FakeModel {
    params: Vec<(String, String)>,
    trees: Vec<Stump>,
}

impl FakeModel {
    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn eta(&self) -> f32 {
        self.param("eta")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ETA)
    }

    fn num_class(&self) -> usize {
        self.param("num_class")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1usize)
            .max(1)
    }

    fn eval_metrics(&self) -> Vec<&str> {
        let metrics: Vec<&str> = self
            .params
            .iter()
            .filter(|(k, _)| k == "eval_metric")
            .map(|(_, v)| v.as_str())
            .collect();
        if metrics.is_empty() {
            vec!["rmse"]
        } else {
            metrics
        }
    }

    fn push_tree(&mut self, weight: f32) {
        let feature = self.trees.len() % N_FEATURES;
        self.trees.push(Stump { feature, weight });
    }

    fn margin(&self, row: usize, class: usize, n_trees: usize) -> f32 {
        let scale = (1.0 + 0.1 * row as f32) * (class + 1) as f32;
        BASE_SCORE
            + self.trees[..n_trees]
                .iter()
                .map(|t| t.weight * scale)
                .sum::<f32>()
    }

    fn predict(&self, n_rows: usize, option_mask: i32, tree_limit: u32) -> Vec<f32> {
        let n_trees = match tree_limit as usize {
            0 => self.trees.len(),
            limit => limit.min(self.trees.len()),
        };
        if option_mask & PRED_LEAF != 0 {
            return (0..n_rows)
                .flat_map(|row| (0..n_trees).map(move |t| ((row + t) % 2 + 1) as f32))
                .collect();
        }

        let n_class = self.num_class();
        let objective = self.param("objective").unwrap_or("reg:squarederror");
        let raw = option_mask & PRED_OUTPUT_MARGIN != 0;
        let mut out = Vec::with_capacity(n_rows * n_class);
        for row in 0..n_rows {
            let margins: Vec<f32> = (0..n_class)
                .map(|class| self.margin(row, class, n_trees))
                .collect();
            if raw {
                out.extend(margins);
            } else if objective.ends_with(":logistic") {
                out.extend(margins.iter().map(|m| 1.0 / (1.0 + (-m).exp())));
            } else if objective == "multi:softprob" {
                let max = margins.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let exp: Vec<f32> = margins.iter().map(|m| (m - max).exp()).collect();
                let total: f32 = exp.iter().sum();
                out.extend(exp.iter().map(|e| e / total));
            } else {
                out.extend(margins);
            }
        }
        out
    }

    fn dump(&self, names: Option<&FeatureMap>, with_stats: bool) -> Vec<String> {
        self.trees
            .iter()
            .map(|tree| {
                let feature = names
                    .and_then(|fmap| fmap.name(tree.feature))
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("f{}", tree.feature));
                let w = tree.weight;
                if with_stats {
                    format!(
                        "0:[{feature}<0.5] yes=1,no=2,missing=1,gain={:.6},cover=2\n\t1:leaf={w:.6},cover=1\n\t2:leaf={:.6},cover=1\n",
                        w.abs(),
                        -w
                    )
                } else {
                    format!("0:[{feature}<0.5] yes=1,no=2,missing=1\n\t1:leaf={w:.6}\n\t2:leaf={:.6}\n", -w)
                }
            })
            .collect()
    }
}

// =============================================================================
// FakeNative
// =============================================================================

#[derive(Default)]
struct State {
    boosters: HashMap<RawHandle, FakeModel>,
    dmats: HashMap<RawHandle, usize>,
    calls: Vec<Call>,
    pending_failure: Option<(NativeOp, String)>,
    corrupt_next_predict: bool,
    null_next_create: bool,
    checkpoint: Option<(i32, FakeModel)>,
    last_error: String,
}

/// Deterministic in-memory [`NativeApi`].
#[derive(Default)]
pub struct FakeNative {
    state: Mutex<State>,
    next_handle: AtomicUsize,
}

impl std::fmt::Debug for FakeNative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("FakeNative")
            .field("boosters", &state.boosters.len())
            .field("dmats", &state.dmats.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl FakeNative {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<FakeNative> {
        Arc::new(FakeNative::default())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_handle(&self) -> RawHandle {
        // Spread handles out so booster and dataset handles are easy to tell apart in logs.
        (self.next_handle.fetch_add(1, Ordering::Relaxed) + 1) * 0x10
    }

    /// Register a dataset with `n_rows` rows.
    pub fn dmatrix(&self, n_rows: usize) -> FakeDMatrix {
        let handle = self.next_handle();
        self.lock().dmats.insert(handle, n_rows);
        FakeDMatrix { handle, n_rows }
    }

    /// Overwrite the message returned by [`NativeApi::last_error`].
    pub fn set_last_error(&self, message: impl Into<String>) {
        self.lock().last_error = message.into();
    }

    /// Make the next call of kind `op` fail with `message`.
    pub fn fail_next(&self, op: NativeOp, message: impl Into<String>) {
        self.lock().pending_failure = Some((op, message.into()));
    }

    /// Drop the last element of the next prediction buffer.
    pub fn corrupt_next_predict(&self) {
        self.lock().corrupt_next_predict = true;
    }

    /// Make the next create report success with a null handle.
    pub fn null_next_create(&self) {
        self.lock().null_next_create = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: NativeOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    pub fn free_count(&self) -> usize {
        self.count(NativeOp::Free)
    }

    /// Boosters created and not yet freed.
    pub fn live_boosters(&self) -> usize {
        self.lock().boosters.len()
    }

    /// Every parameter set on `handle`, in order.
    pub fn params(&self, handle: RawHandle) -> Vec<(String, String)> {
        self.lock()
            .boosters
            .get(&handle)
            .map(|m| m.params.clone())
            .unwrap_or_default()
    }

    /// Effective value of `key` on `handle` (the last one set).
    pub fn param(&self, handle: RawHandle, key: &str) -> Option<String> {
        self.lock()
            .boosters
            .get(&handle)
            .and_then(|m| m.param(key).map(str::to_owned))
    }

    pub fn num_trees(&self, handle: RawHandle) -> usize {
        self.lock()
            .boosters
            .get(&handle)
            .map_or(0, |m| m.trees.len())
    }

    /// Record the call, then fail it if a failure is pending for `op`.
    fn enter(&self, op: NativeOp, handle: RawHandle) -> NativeResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(Call { op, handle });
        if matches!(&state.pending_failure, Some((pending, _)) if *pending == op) {
            if let Some((_, message)) = state.pending_failure.take() {
                state.last_error = message;
            }
            return Err(StatusCode::FAILURE);
        }
        Ok(state)
    }
}

fn fail<T>(state: &mut State, message: String) -> NativeResult<T> {
    state.last_error = message;
    Err(StatusCode::FAILURE)
}

fn model<'s>(state: &'s mut State, handle: RawHandle) -> NativeResult<&'s mut FakeModel> {
    if !state.boosters.contains_key(&handle) {
        return fail(state, format!("invalid booster handle {handle:#x}"));
    }
    state
        .boosters
        .get_mut(&handle)
        .ok_or(StatusCode::FAILURE)
}

fn rows(state: &mut State, dmat: RawHandle) -> NativeResult<usize> {
    match state.dmats.get(&dmat) {
        Some(&n) => Ok(n),
        None => fail(state, format!("invalid DMatrix handle {dmat:#x}")),
    }
}

impl NativeApi for FakeNative {
    fn last_error(&self) -> String {
        self.lock().last_error.clone()
    }

    fn booster_create(&self, dmats: &[RawHandle]) -> NativeResult<RawHandle> {
        let mut state = self.enter(NativeOp::Create, 0)?;
        for &dmat in dmats {
            rows(&mut state, dmat)?;
        }
        if std::mem::take(&mut state.null_next_create) {
            return Ok(0);
        }
        let handle = self.next_handle();
        state.boosters.insert(handle, FakeModel::default());
        Ok(handle)
    }

    fn booster_free(&self, handle: RawHandle) -> NativeResult<()> {
        let mut state = self.enter(NativeOp::Free, handle)?;
        match state.boosters.remove(&handle) {
            Some(_) => Ok(()),
            None => fail(&mut state, format!("double free of booster {handle:#x}")),
        }
    }

    fn booster_set_param(&self, handle: RawHandle, name: &str, value: &str) -> NativeResult<()> {
        let mut state = self.enter(NativeOp::SetParam, handle)?;
        if name == "num_class" && value.parse::<usize>().is_err() {
            return fail(&mut state, format!("invalid num_class: {value:?}"));
        }
        model(&mut state, handle)?
            .params
            .push((name.to_owned(), value.to_owned()));
        Ok(())
    }

    fn booster_update_one_iter(
        &self,
        handle: RawHandle,
        _iteration: i32,
        dtrain: RawHandle,
    ) -> NativeResult<()> {
        let mut state = self.enter(NativeOp::UpdateOneIter, handle)?;
        rows(&mut state, dtrain)?;
        let model = model(&mut state, handle)?;
        let weight = model.eta() * 0.5f32.powi(model.trees.len() as i32);
        model.push_tree(weight);
        Ok(())
    }

    fn booster_boost_one_iter(
        &self,
        handle: RawHandle,
        dtrain: RawHandle,
        grad: &[f32],
        hess: &[f32],
    ) -> NativeResult<()> {
        let mut state = self.enter(NativeOp::BoostOneIter, handle)?;
        let n_rows = rows(&mut state, dtrain)?;
        let n_class = model(&mut state, handle)?.num_class();
        if grad.len() != n_rows * n_class || hess.len() != grad.len() {
            return fail(
                &mut state,
                format!(
                    "grad/hess size {}/{} does not match {} rows",
                    grad.len(),
                    hess.len(),
                    n_rows
                ),
            );
        }
        let model = model(&mut state, handle)?;
        let grad_sum: f32 = grad.iter().sum();
        let hess_sum: f32 = hess.iter().sum::<f32>().max(1e-6);
        let weight = -model.eta() * grad_sum / hess_sum;
        model.push_tree(weight);
        Ok(())
    }

    fn booster_eval_one_iter(
        &self,
        handle: RawHandle,
        iteration: i32,
        dmats: &[RawHandle],
        names: &[&str],
    ) -> NativeResult<String> {
        let mut state = self.enter(NativeOp::EvalOneIter, handle)?;
        for &dmat in dmats {
            rows(&mut state, dmat)?;
        }
        let model = model(&mut state, handle)?;
        let n_trees = model.trees.len() as f64;
        let mut line = format!("[{iteration}]");
        for (set, name) in names.iter().enumerate() {
            for metric in model.eval_metrics() {
                let loss = (1.0 + 0.1 * set as f64) / (1.0 + n_trees);
                let score = if matches!(metric, "auc" | "aucpr" | "map") {
                    1.0 - loss / 2.0
                } else {
                    loss
                };
                let _ = write!(line, "\t{name}-{metric}:{score:.6}");
            }
        }
        Ok(line)
    }

    fn booster_predict(
        &self,
        handle: RawHandle,
        dmat: RawHandle,
        option_mask: i32,
        ntree_limit: u32,
    ) -> NativeResult<Vec<f32>> {
        let mut state = self.enter(NativeOp::Predict, handle)?;
        let n_rows = rows(&mut state, dmat)?;
        let mut buffer = model(&mut state, handle)?.predict(n_rows, option_mask, ntree_limit);
        if std::mem::take(&mut state.corrupt_next_predict) {
            buffer.pop();
        }
        Ok(buffer)
    }

    fn booster_save_model(&self, handle: RawHandle, path: &Path) -> NativeResult<()> {
        let mut state = self.enter(NativeOp::SaveModel, handle)?;
        let bytes = encode(model(&mut state, handle)?);
        match std::fs::write(path, bytes) {
            Ok(()) => Ok(()),
            Err(e) => fail(&mut state, format!("cannot write {}: {e}", path.display())),
        }
    }

    fn booster_load_model(&self, handle: RawHandle, path: &Path) -> NativeResult<()> {
        let mut state = self.enter(NativeOp::LoadModel, handle)?;
        model(&mut state, handle)?;
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => return fail(&mut state, format!("cannot read {}: {e}", path.display())),
        };
        let loaded = decode(&mut state, &bytes)?;
        state.boosters.insert(handle, loaded);
        Ok(())
    }

    fn booster_dump_model(
        &self,
        handle: RawHandle,
        fmap: &str,
        with_stats: bool,
    ) -> NativeResult<Vec<String>> {
        let mut state = self.enter(NativeOp::DumpModel, handle)?;
        let names = if fmap.is_empty() {
            None
        } else {
            let parsed = std::fs::read_to_string(fmap)
                .map_err(|e| e.to_string())
                .and_then(|text| text.parse::<FeatureMap>().map_err(|e| e.to_string()));
            match parsed {
                Ok(names) => Some(names),
                Err(e) => return fail(&mut state, format!("cannot load feature map {fmap}: {e}")),
            }
        };
        Ok(model(&mut state, handle)?.dump(names.as_ref(), with_stats))
    }

    fn booster_get_model_raw(&self, handle: RawHandle) -> NativeResult<Vec<u8>> {
        let mut state = self.enter(NativeOp::GetModelRaw, handle)?;
        Ok(encode(model(&mut state, handle)?))
    }

    fn booster_load_model_from_buffer(&self, handle: RawHandle, buf: &[u8]) -> NativeResult<()> {
        let mut state = self.enter(NativeOp::LoadModelFromBuffer, handle)?;
        model(&mut state, handle)?;
        let loaded = decode(&mut state, buf)?;
        state.boosters.insert(handle, loaded);
        Ok(())
    }

    fn booster_load_rabit_checkpoint(&self, handle: RawHandle) -> NativeResult<i32> {
        let mut state = self.enter(NativeOp::LoadCheckpoint, handle)?;
        model(&mut state, handle)?;
        match state.checkpoint.clone() {
            None => Ok(0),
            Some((version, saved)) => {
                state.boosters.insert(handle, saved);
                Ok(version)
            }
        }
    }

    fn booster_save_rabit_checkpoint(&self, handle: RawHandle) -> NativeResult<()> {
        let mut state = self.enter(NativeOp::SaveCheckpoint, handle)?;
        let snapshot = model(&mut state, handle)?.clone();
        let version = state.checkpoint.as_ref().map_or(0, |(v, _)| *v) + 1;
        state.checkpoint = Some((version, snapshot));
        Ok(())
    }
}

fn encode(model: &FakeModel) -> Vec<u8> {
    serde_json::to_vec(model).unwrap_or_default()
}

fn decode(state: &mut State, bytes: &[u8]) -> NativeResult<FakeModel> {
    match serde_json::from_slice(bytes) {
        Ok(model) => Ok(model),
        Err(e) => fail(state, format!("invalid model buffer: {e}")),
    }
}

// =============================================================================
// FakeDMatrix
// =============================================================================

/// Dataset registered with a [`FakeNative`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeDMatrix {
    handle: RawHandle,
    n_rows: usize,
}

impl DMatrix for FakeDMatrix {
    fn handle(&self) -> RawHandle {
        self.handle
    }

    fn num_rows(&self) -> usize {
        self.n_rows
    }
}
