use serde::{Deserialize, Serialize};

/// Point-in-time counts for one batch.
///
/// `pending + in_flight + succeeded + failed == total` holds for every
/// snapshot handed out.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ProgressSnapshot {
    /// Fresh snapshot with every query pending
    pub fn starting(total: usize) -> Self {
        Self {
            total,
            pending: total,
            ..Default::default()
        }
    }

    pub fn finished(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.finished() == self.total
    }

    pub fn is_consistent(&self) -> bool {
        self.pending + self.in_flight + self.succeeded + self.failed == self.total
    }
}
