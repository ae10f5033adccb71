//! Distributed-training checkpoints.
//!
//! These forward to the native library's thread-local checkpoint store, which
//! the surrounding distributed coordinator uses to resume after a worker
//! failure. Nothing is kept on the Rust side.

use crate::booster::Booster;
use crate::error::{check_call, Phase, Result};

impl Booster {
    /// Restore the model from the current thread's checkpoint.
    ///
    /// Returns the checkpoint version; `0` means no checkpoint was stored
    /// and the model is unchanged.
    pub fn load_checkpoint(&mut self) -> Result<i32> {
        let handle = self.handle.live(Phase::Checkpoint)?;
        let version = check_call(
            self.api(),
            Phase::Checkpoint,
            self.api.booster_load_rabit_checkpoint(handle),
        )?;
        log::debug!("booster {handle:#x} restored checkpoint version {version}");
        Ok(version)
    }

    /// Store the model in the current thread's checkpoint.
    pub fn save_checkpoint(&self) -> Result<()> {
        let _guard = self.guard();
        let handle = self.handle.live(Phase::Checkpoint)?;
        check_call(
            self.api(),
            Phase::Checkpoint,
            self.api.booster_save_rabit_checkpoint(handle),
        )
    }
}
