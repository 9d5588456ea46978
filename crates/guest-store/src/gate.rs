use crate::{StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, Ordering};

/// One mutating request at a time. The permit reopens the gate on drop, so
/// an error never leaves it closed.
#[derive(Debug, Default)]
pub struct SubmitGate(AtomicBool);

impl SubmitGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> StoreResult<SubmitPermit<'_>> {
        if self.0.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Busy);
        }
        Ok(SubmitPermit(&self.0))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct SubmitPermit<'a>(&'a AtomicBool);

impl Drop for SubmitPermit<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
