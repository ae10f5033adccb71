//! [`NativeApi`] over the XGBoost C API.
//!
//! Enabled with the `xgboost` feature. The library is initialized once per
//! process through [`XgbNative::global`]; a failed initialization is cached and
//! reported to every caller.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::{ptr, slice};

use super::{status, NativeApi, NativeResult, RawHandle, StatusCode};
use crate::data::DMatrix;
use crate::error::{check_call, BoosterError, ContractViolation, Phase, Result};

thread_local! {
    // Errors raised on the Rust side of the boundary (e.g. path encoding).
    static LOCAL_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

static GLOBAL: OnceLock<std::result::Result<Arc<XgbNative>, String>> = OnceLock::new();

fn local_failure(message: String) -> StatusCode {
    LOCAL_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
    StatusCode::FAILURE
}

fn to_cstring(value: &str) -> NativeResult<CString> {
    CString::new(value).map_err(|_| local_failure(format!("string contains NUL byte: {value:?}")))
}

fn path_to_cstring(path: &Path) -> NativeResult<CString> {
    match path.to_str() {
        Some(s) => to_cstring(s),
        None => Err(local_failure(format!(
            "path is not valid UTF-8: {}",
            path.display()
        ))),
    }
}

fn booster(handle: RawHandle) -> xgboost_sys::BoosterHandle {
    handle as *mut c_void as xgboost_sys::BoosterHandle
}

fn dmatrix(handle: RawHandle) -> xgboost_sys::DMatrixHandle {
    handle as *mut c_void as xgboost_sys::DMatrixHandle
}

/// Run a native call, clearing any stale Rust-side error first.
fn call(code: i32) -> NativeResult<()> {
    LOCAL_ERROR.with(|slot| slot.borrow_mut().take());
    status(code)
}

/// The XGBoost C library.
#[derive(Debug)]
pub struct XgbNative {
    _private: (),
}

impl XgbNative {
    /// Process-wide instance, initialized on first use.
    pub fn global() -> Result<Arc<XgbNative>> {
        GLOBAL
            .get_or_init(|| Self::initialize().map(Arc::new))
            .clone()
            .map_err(BoosterError::Init)
    }

    /// Probe the library by creating and releasing an empty booster.
    fn initialize() -> std::result::Result<XgbNative, String> {
        let native = XgbNative { _private: () };
        let handle = native
            .booster_create(&[])
            .map_err(|_| native.last_error())?;
        native
            .booster_free(handle)
            .map_err(|_| native.last_error())?;
        log::debug!("XGBoost native library initialized");
        Ok(native)
    }
}

impl NativeApi for XgbNative {
    fn last_error(&self) -> String {
        if let Some(local) = LOCAL_ERROR.with(|slot| slot.borrow_mut().take()) {
            return local;
        }
        let message = unsafe { xgboost_sys::XGBGetLastError() };
        if message.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }

    fn booster_create(&self, dmats: &[RawHandle]) -> NativeResult<RawHandle> {
        let handles: Vec<xgboost_sys::DMatrixHandle> = dmats.iter().map(|&h| dmatrix(h)).collect();
        let mut out: xgboost_sys::BoosterHandle = ptr::null_mut();
        call(unsafe {
            xgboost_sys::XGBoosterCreate(handles.as_ptr(), handles.len() as _, &mut out)
        })?;
        Ok(out as RawHandle)
    }

    fn booster_free(&self, handle: RawHandle) -> NativeResult<()> {
        call(unsafe { xgboost_sys::XGBoosterFree(booster(handle)) })
    }

    fn booster_set_param(&self, handle: RawHandle, name: &str, value: &str) -> NativeResult<()> {
        let name = to_cstring(name)?;
        let value = to_cstring(value)?;
        call(unsafe {
            xgboost_sys::XGBoosterSetParam(booster(handle), name.as_ptr(), value.as_ptr())
        })
    }

    fn booster_update_one_iter(
        &self,
        handle: RawHandle,
        iteration: i32,
        dtrain: RawHandle,
    ) -> NativeResult<()> {
        call(unsafe {
            xgboost_sys::XGBoosterUpdateOneIter(booster(handle), iteration, dmatrix(dtrain))
        })
    }

    fn booster_boost_one_iter(
        &self,
        handle: RawHandle,
        dtrain: RawHandle,
        grad: &[f32],
        hess: &[f32],
    ) -> NativeResult<()> {
        // The C signature takes mutable pointers; hand it owned copies.
        let mut grad = grad.to_vec();
        let mut hess = hess.to_vec();
        call(unsafe {
            xgboost_sys::XGBoosterBoostOneIter(
                booster(handle),
                dmatrix(dtrain),
                grad.as_mut_ptr(),
                hess.as_mut_ptr(),
                grad.len() as _,
            )
        })
    }

    fn booster_eval_one_iter(
        &self,
        handle: RawHandle,
        iteration: i32,
        dmats: &[RawHandle],
        names: &[&str],
    ) -> NativeResult<String> {
        let mut handles: Vec<xgboost_sys::DMatrixHandle> =
            dmats.iter().map(|&h| dmatrix(h)).collect();
        let names = names
            .iter()
            .map(|name| to_cstring(name))
            .collect::<NativeResult<Vec<CString>>>()?;
        let mut name_ptrs: Vec<*const c_char> = names.iter().map(|n| n.as_ptr()).collect();

        let mut out: *const c_char = ptr::null();
        call(unsafe {
            xgboost_sys::XGBoosterEvalOneIter(
                booster(handle),
                iteration,
                handles.as_mut_ptr(),
                name_ptrs.as_mut_ptr(),
                handles.len() as _,
                &mut out,
            )
        })?;
        if out.is_null() {
            return Ok(String::new());
        }
        Ok(unsafe { CStr::from_ptr(out) }.to_string_lossy().into_owned())
    }

    fn booster_predict(
        &self,
        handle: RawHandle,
        dmat: RawHandle,
        option_mask: i32,
        ntree_limit: u32,
    ) -> NativeResult<Vec<f32>> {
        let mut out_len = 0;
        let mut out: *const f32 = ptr::null();
        call(unsafe {
            xgboost_sys::XGBoosterPredict(
                booster(handle),
                dmatrix(dmat),
                option_mask,
                ntree_limit as _,
                &mut out_len,
                &mut out,
            )
        })?;
        if out.is_null() || out_len == 0 {
            return Ok(Vec::new());
        }
        // The buffer is owned by the booster and reused by the next call.
        Ok(unsafe { slice::from_raw_parts(out, out_len as usize) }.to_vec())
    }

    fn booster_save_model(&self, handle: RawHandle, path: &Path) -> NativeResult<()> {
        let fname = path_to_cstring(path)?;
        call(unsafe { xgboost_sys::XGBoosterSaveModel(booster(handle), fname.as_ptr()) })
    }

    fn booster_load_model(&self, handle: RawHandle, path: &Path) -> NativeResult<()> {
        let fname = path_to_cstring(path)?;
        call(unsafe { xgboost_sys::XGBoosterLoadModel(booster(handle), fname.as_ptr()) })
    }

    fn booster_dump_model(
        &self,
        handle: RawHandle,
        fmap: &str,
        with_stats: bool,
    ) -> NativeResult<Vec<String>> {
        let fmap = to_cstring(fmap)?;
        let mut out_len = 0;
        let mut out: *mut *const c_char = ptr::null_mut();
        call(unsafe {
            xgboost_sys::XGBoosterDumpModel(
                booster(handle),
                fmap.as_ptr(),
                with_stats as i32,
                &mut out_len,
                &mut out,
            )
        })?;
        if out.is_null() {
            return Ok(Vec::new());
        }
        let trees = unsafe { slice::from_raw_parts(out, out_len as usize) };
        Ok(trees
            .iter()
            .map(|&tree| unsafe { CStr::from_ptr(tree) }.to_string_lossy().into_owned())
            .collect())
    }

    fn booster_get_model_raw(&self, handle: RawHandle) -> NativeResult<Vec<u8>> {
        let mut out_len = 0;
        let mut out: *const c_char = ptr::null();
        call(unsafe { xgboost_sys::XGBoosterGetModelRaw(booster(handle), &mut out_len, &mut out) })?;
        if out.is_null() {
            return Ok(Vec::new());
        }
        Ok(unsafe { slice::from_raw_parts(out as *const u8, out_len as usize) }.to_vec())
    }

    fn booster_load_model_from_buffer(&self, handle: RawHandle, buf: &[u8]) -> NativeResult<()> {
        call(unsafe {
            xgboost_sys::XGBoosterLoadModelFromBuffer(
                booster(handle),
                buf.as_ptr() as *const c_void,
                buf.len() as _,
            )
        })
    }

    fn booster_load_rabit_checkpoint(&self, handle: RawHandle) -> NativeResult<i32> {
        let mut version = 0;
        call(unsafe { xgboost_sys::XGBoosterLoadRabitCheckpoint(booster(handle), &mut version) })?;
        Ok(version)
    }

    fn booster_save_rabit_checkpoint(&self, handle: RawHandle) -> NativeResult<()> {
        call(unsafe { xgboost_sys::XGBoosterSaveRabitCheckpoint(booster(handle)) })
    }
}

// =============================================================================
// XgbDMatrix
// =============================================================================

/// A dense XGBoost dataset owned by the Rust side.
#[derive(Debug)]
pub struct XgbDMatrix {
    handle: RawHandle,
    n_rows: usize,
}

impl XgbDMatrix {
    /// Build from row-major dense data. `NaN` marks missing values.
    pub fn from_dense(native: &XgbNative, data: &[f32], n_rows: usize) -> Result<Self> {
        if n_rows == 0 {
            return Err(ContractViolation::EmptyDataset.into());
        }
        if data.len() % n_rows != 0 {
            return Err(ContractViolation::RaggedPredictions {
                len: data.len(),
                n_rows,
            }
            .into());
        }
        let n_cols = data.len() / n_rows;
        let mut out: xgboost_sys::DMatrixHandle = ptr::null_mut();
        check_call(
            native,
            Phase::Create,
            call(unsafe {
                xgboost_sys::XGDMatrixCreateFromMat(
                    data.as_ptr(),
                    n_rows as _,
                    n_cols as _,
                    f32::NAN,
                    &mut out,
                )
            }),
        )?;
        Ok(XgbDMatrix {
            handle: out as RawHandle,
            n_rows,
        })
    }

    /// Attach training labels.
    pub fn set_labels(&mut self, native: &XgbNative, labels: &[f32]) -> Result<()> {
        check_call(
            native,
            Phase::Configure,
            call(unsafe {
                xgboost_sys::XGDMatrixSetFloatInfo(
                    dmatrix(self.handle),
                    c"label".as_ptr(),
                    labels.as_ptr(),
                    labels.len() as _,
                )
            }),
        )
    }
}

impl DMatrix for XgbDMatrix {
    fn handle(&self) -> RawHandle {
        self.handle
    }

    fn num_rows(&self) -> usize {
        self.n_rows
    }
}

impl Drop for XgbDMatrix {
    fn drop(&mut self) {
        let code = unsafe { xgboost_sys::XGDMatrixFree(dmatrix(self.handle)) };
        if code != 0 {
            log::warn!("failed to free DMatrix handle {:#x}", self.handle);
        }
    }
}

#[cfg(all(test, feature = "xgboost"))]
mod tests {
    use super::*;
    use crate::{Booster, Params};

    const N_ROWS: usize = 8;

    fn training_data(native: &XgbNative) -> XgbDMatrix {
        let data: Vec<f32> = (0..N_ROWS)
            .flat_map(|i| [i as f32, (i % 3) as f32])
            .collect();
        let labels: Vec<f32> = (0..N_ROWS).map(|i| if i < N_ROWS / 2 { 0.0 } else { 1.0 }).collect();
        let mut dtrain = XgbDMatrix::from_dense(native, &data, N_ROWS).unwrap();
        dtrain.set_labels(native, &labels).unwrap();
        dtrain
    }

    fn trained(api: Arc<dyn NativeApi>, dtrain: &XgbDMatrix, rounds: i32) -> Booster {
        let params = Params::new()
            .set("objective", "reg:squarederror")
            .set("max_depth", 2)
            .set("min_child_weight", 0)
            .set("nthread", 1);
        let mut booster = Booster::new(api, &[dtrain], &params).unwrap();
        booster.set_param("eta", 0.5).unwrap();
        for i in 0..rounds {
            booster.update(dtrain, i).unwrap();
        }
        booster
    }

    #[test]
    fn global_is_initialized_once() {
        let first = XgbNative::global().unwrap();
        let second = XgbNative::global().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn from_dense_rejects_ragged_input() {
        let native = XgbNative::global().unwrap();
        let err = XgbDMatrix::from_dense(&native, &[1.0, 2.0, 3.0], 2).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn train_predict_and_round_trip_bytes() {
        let native = XgbNative::global().unwrap();
        let api: Arc<dyn NativeApi> = native.clone();
        let dtrain = training_data(&native);
        let booster = trained(api.clone(), &dtrain, 3);

        let preds = booster.predict(&dtrain).unwrap();
        assert_eq!(preds.dim(), (N_ROWS, 1));
        assert!(preds[[N_ROWS - 1, 0]] > preds[[0, 0]]);

        let restored = Booster::from_bytes(api, &booster.to_bytes().unwrap()).unwrap();
        let reloaded = restored.predict(&dtrain).unwrap();
        let same_bits = preds
            .iter()
            .zip(reloaded.iter())
            .all(|(a, b)| a.to_bits() == b.to_bits());
        assert!(same_bits);
    }

    #[test]
    fn dump_and_feature_score() {
        let native = XgbNative::global().unwrap();
        let dtrain = training_data(&native);
        let booster = trained(native.clone(), &dtrain, 2);

        let dump = booster.dump(true, None).unwrap();
        assert_eq!(dump.len(), 2);
        assert!(dump.trees()[0].contains("leaf="));

        let scores = booster.feature_score(None).unwrap();
        assert!(!scores.is_empty());
        assert!(scores.keys().all(|k| k == "f0" || k == "f1"));
        assert!(scores.values().all(|&count| count >= 1));
    }

    #[test]
    fn dispose_twice_is_harmless() {
        let native = XgbNative::global().unwrap();
        let dtrain = training_data(&native);
        let booster = trained(native.clone(), &dtrain, 1);

        booster.dispose();
        assert!(booster.is_disposed());
        booster.dispose();
        assert_eq!(booster.handle(), 0);
        assert!(booster.predict(&dtrain).unwrap_err().is_contract_violation());
    }

    #[test]
    fn native_error_message_is_surfaced() {
        let native = XgbNative::global().unwrap();
        let dtrain = training_data(&native);
        let booster = trained(native.clone(), &dtrain, 1);

        let err = booster.save_model("/nonexistent-dir/model.bin").unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Serialize));
        assert!(matches!(
            err,
            BoosterError::Native { ref message, .. } if !message.is_empty()
        ));
    }
}
