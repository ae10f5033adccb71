//! Prediction options and output decoding.
//!
//! The native side returns predictions as a flat buffer. Its shape is not
//! carried with it: the row count comes from the dataset that was predicted
//! on, and the column count is whatever is left after dividing by it.
//!
//! # Layout
//!
//! The buffer is **row-major**: element `i` lands at `(i / n_cols, i % n_cols)`.
//! Depending on the options and the model this is
//!
//! - one column for regression / binary classification,
//! - `num_class` columns for multiclass models,
//! - one column per tree when leaf indices are requested.

use ndarray::Array2;

use crate::error::{ContractViolation, Result};
use crate::native::{PRED_LEAF, PRED_OUTPUT_MARGIN};

// =============================================================================
// PredictOptions
// =============================================================================

/// What kind of prediction output to request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictOptions {
    /// Return raw, untransformed margins instead of transformed values.
    pub output_margin: bool,
    /// Number of trees to use; 0 means all trees.
    pub tree_limit: u32,
    /// Return the leaf index reached in each tree instead of a score.
    pub pred_leaf: bool,
}

impl PredictOptions {
    /// Transformed predictions from all trees.
    pub fn value() -> Self {
        Self::default()
    }

    /// Raw margins from all trees.
    pub fn margin() -> Self {
        Self {
            output_margin: true,
            ..Self::default()
        }
    }

    /// Leaf indices, one column per tree.
    pub fn leaf() -> Self {
        Self {
            pred_leaf: true,
            ..Self::default()
        }
    }

    pub fn with_tree_limit(mut self, tree_limit: u32) -> Self {
        self.tree_limit = tree_limit;
        self
    }

    /// Native option mask.
    ///
    /// Margin and leaf output are mutually exclusive; asking for both is
    /// rejected instead of letting one silently win.
    pub fn option_mask(&self) -> Result<i32> {
        match (self.output_margin, self.pred_leaf) {
            (true, true) => Err(ContractViolation::ConflictingPredictOptions.into()),
            (true, false) => Ok(PRED_OUTPUT_MARGIN),
            (false, true) => Ok(PRED_LEAF),
            (false, false) => Ok(0),
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Reshape a flat native prediction buffer into an `n_rows x n_cols` matrix.
///
/// Fails if `n_rows` is zero or the buffer length is not an exact multiple of
/// `n_rows`; a remainder means the buffer does not belong to this dataset.
pub fn decode_predictions(buffer: Vec<f32>, n_rows: usize) -> Result<Array2<f32>> {
    if n_rows == 0 {
        return Err(ContractViolation::EmptyDataset.into());
    }
    let len = buffer.len();
    if len % n_rows != 0 {
        return Err(ContractViolation::RaggedPredictions { len, n_rows }.into());
    }
    let n_cols = len / n_rows;
    Array2::from_shape_vec((n_rows, n_cols), buffer)
        .map_err(|_| ContractViolation::RaggedPredictions { len, n_rows }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoosterError;
    use rstest::rstest;

    #[rstest]
    #[case(PredictOptions::value(), 0)]
    #[case(PredictOptions::margin(), 1)]
    #[case(PredictOptions::leaf(), 2)]
    #[case(PredictOptions::margin().with_tree_limit(3), 1)]
    fn option_mask_encoding(#[case] options: PredictOptions, #[case] expected: i32) {
        assert_eq!(options.option_mask().unwrap(), expected);
    }

    #[test]
    fn margin_and_leaf_conflict() {
        let options = PredictOptions {
            output_margin: true,
            pred_leaf: true,
            tree_limit: 0,
        };
        let err = options.option_mask().unwrap_err();
        assert!(matches!(
            err,
            BoosterError::Contract(ContractViolation::ConflictingPredictOptions)
        ));
    }

    #[test]
    fn decodes_row_major() {
        let buffer: Vec<f32> = (0..6).map(|i| i as f32).collect();
        let matrix = decode_predictions(buffer, 2).unwrap();

        assert_eq!(matrix.dim(), (2, 3));
        assert_eq!(matrix[[0, 0]], 0.0);
        assert_eq!(matrix[[0, 2]], 2.0);
        assert_eq!(matrix[[1, 0]], 3.0);
        assert_eq!(matrix[[1, 2]], 5.0);
    }

    #[test]
    fn single_column() {
        let matrix = decode_predictions(vec![0.25, 0.75, 0.5], 3).unwrap();
        assert_eq!(matrix.dim(), (3, 1));
        assert_eq!(matrix.column(0).to_vec(), vec![0.25, 0.75, 0.5]);
    }

    #[test]
    fn empty_buffer_gives_zero_columns() {
        let matrix = decode_predictions(Vec::new(), 4).unwrap();
        assert_eq!(matrix.dim(), (4, 0));
    }

    #[test]
    fn zero_rows_rejected() {
        let err = decode_predictions(vec![1.0], 0).unwrap_err();
        assert!(matches!(
            err,
            BoosterError::Contract(ContractViolation::EmptyDataset)
        ));
    }

    #[test]
    fn ragged_buffer_rejected() {
        let err = decode_predictions(vec![1.0; 7], 2).unwrap_err();
        assert!(matches!(
            err,
            BoosterError::Contract(ContractViolation::RaggedPredictions { len: 7, n_rows: 2 })
        ));
    }
}
