//! Claim-then-free handle storage.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{ContractViolation, Phase, Result};
use crate::native::RawHandle;

/// Atomically cleared native handle.
///
/// Live handles are non-zero. [`HandleCell::take`] swaps in zero, so of any
/// number of racing callers exactly one receives the live handle and becomes
/// responsible for freeing it.
#[derive(Debug)]
pub(crate) struct HandleCell(AtomicUsize);

impl HandleCell {
    pub(crate) fn new(handle: RawHandle) -> Self {
        Self(AtomicUsize::new(handle))
    }

    /// Current handle, or zero once taken.
    pub(crate) fn raw(&self) -> RawHandle {
        self.0.load(Ordering::Acquire)
    }

    /// Current handle, failing if it has been disposed.
    pub(crate) fn live(&self, phase: Phase) -> Result<RawHandle> {
        match self.raw() {
            0 => Err(ContractViolation::Disposed { phase }.into()),
            handle => Ok(handle),
        }
    }

    /// Claim the handle for freeing. Returns `None` if already claimed.
    pub(crate) fn take(&self) -> Option<RawHandle> {
        match self.0.swap(0, Ordering::AcqRel) {
            0 => None,
            handle => Some(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn take_once() {
        let cell = HandleCell::new(42);
        assert_eq!(cell.live(Phase::Train).unwrap(), 42);
        assert_eq!(cell.take(), Some(42));
        assert_eq!(cell.take(), None);
        assert_eq!(cell.raw(), 0);
        assert!(cell.live(Phase::Predict).is_err());
    }

    #[test]
    fn racing_takers_claim_once() {
        let cell = Arc::new(HandleCell::new(7));
        let claims: usize = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || cell.take().is_some())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| t.join().unwrap() as usize)
            .sum();
        assert_eq!(claims, 1);
    }
}
