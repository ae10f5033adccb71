//! Dataset references.
//!
//! Datasets live on the native side and are owned elsewhere. The booster only
//! reads their handle and row count; it never mutates or frees them.

use crate::native::RawHandle;

/// A native dataset the booster can train, evaluate or predict on.
pub trait DMatrix {
    /// Native handle of the dataset.
    fn handle(&self) -> RawHandle;

    /// Number of rows, used to reshape prediction buffers.
    fn num_rows(&self) -> usize;
}

impl<T: DMatrix + ?Sized> DMatrix for &T {
    fn handle(&self) -> RawHandle {
        (**self).handle()
    }

    fn num_rows(&self) -> usize {
        (**self).num_rows()
    }
}

/// Named evaluation dataset.
#[derive(Clone, Copy)]
pub struct EvalSet<'a> {
    pub name: &'a str,
    pub dmat: &'a dyn DMatrix,
}

impl<'a> EvalSet<'a> {
    pub fn new(name: &'a str, dmat: &'a dyn DMatrix) -> Self {
        Self { name, dmat }
    }
}

impl std::fmt::Debug for EvalSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalSet")
            .field("name", &self.name)
            .field("handle", &self.dmat.handle())
            .field("num_rows", &self.dmat.num_rows())
            .finish()
    }
}

/// Collect the raw handles of a dataset list.
pub(crate) fn handles_of(dmats: &[&dyn DMatrix]) -> Vec<RawHandle> {
    dmats.iter().map(|d| d.handle()).collect()
}
