use flightdesk_core::FlightResult;
use flightdesk_shared::{BatchId, ProgressSnapshot};
use std::time::Duration;
use tokio::sync::oneshot;

/// Everything a batch tells its consumer, in the order it happens
#[derive(Debug)]
pub enum BatchEvent {
    /// Counts after a state transition
    Progress(ProgressSnapshot),
    /// A successful result waiting for the operator (sequential mode only)
    AwaitingReview(ReviewRequest),
    /// Final answer for one query
    Delivered(Delivery),
    /// Every query reached a terminal state; nothing follows
    Complete(BatchSummary),
}

/// How a delivered result was accepted into the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Parallel mode success, accepted without operator input
    AutoAccepted,
    /// Operator accepted it
    Accepted,
    /// Operator rejected it; the fetched status was discarded
    Rejected,
    /// Failures and cancellations, which are never put up for review
    NotReviewed,
}

impl Disposition {
    pub fn is_accepted(self) -> bool {
        matches!(self, Disposition::AutoAccepted | Disposition::Accepted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Zero-based index of the query in the submitted batch
    pub position: usize,
    pub result: FlightResult,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Accept,
    Reject,
}

/// Single-slot handoff for one operator decision.
///
/// The engine holds delivery of everything after this result until the
/// request is answered. Dropping it unanswered counts as a rejection.
#[derive(Debug)]
pub struct ReviewRequest {
    pub(crate) position: usize,
    pub(crate) result: FlightResult,
    pub(crate) reply: oneshot::Sender<ReviewDecision>,
}

impl ReviewRequest {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn result(&self) -> &FlightResult {
        &self.result
    }

    /// Returns false when the batch stopped waiting (cancelled) before the answer arrived
    pub fn accept(self) -> bool {
        self.decide(ReviewDecision::Accept)
    }

    pub fn reject(self) -> bool {
        self.decide(ReviewDecision::Reject)
    }

    pub fn decide(self, decision: ReviewDecision) -> bool {
        self.reply.send(decision).is_ok()
    }
}

/// Terminal "batch complete" marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub snapshot: ProgressSnapshot,
    pub cancelled: bool,
    pub elapsed: Duration,
}
