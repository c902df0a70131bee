use flightdesk_shared::{FlightQuery, ProgressSnapshot};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

/// Lifecycle bucket a query is counted under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl QueryState {
    fn can_move_to(self, to: QueryState) -> bool {
        matches!(
            (self, to),
            (QueryState::Pending, QueryState::InFlight)
                | (QueryState::Pending, QueryState::Failed)
                | (QueryState::InFlight, QueryState::Succeeded)
                | (QueryState::InFlight, QueryState::Failed)
        )
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryState::Pending => write!(f, "PENDING"),
            QueryState::InFlight => write!(f, "IN_FLIGHT"),
            QueryState::Succeeded => write!(f, "SUCCEEDED"),
            QueryState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Receives every committed snapshot, in commit order.
///
/// Called while the tracker lock is held, so implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, snapshot: &ProgressSnapshot);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressError {
    #[error("Invalid progress transition from {from} to {to}")]
    InvalidTransition { from: QueryState, to: QueryState },

    #[error("No query is counted as {0}")]
    EmptyState(QueryState),
}

/// Thread-safe aggregate of per-query states for one batch
pub struct ProgressTracker {
    counts: Mutex<ProgressSnapshot>,
    updates: watch::Sender<ProgressSnapshot>,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        let initial = ProgressSnapshot::starting(total);
        let (updates, _) = watch::channel(initial);
        Self {
            counts: Mutex::new(initial),
            updates,
            sink: None,
        }
    }

    pub fn with_sink(total: usize, sink: Arc<dyn ProgressSink>) -> Self {
        let mut tracker = Self::new(total);
        tracker.sink = Some(sink);
        tracker
    }

    /// Move one query between buckets and publish the result.
    ///
    /// The whole update is one critical section; a rejected transition
    /// leaves the counts untouched.
    pub fn report_transition(
        &self,
        query: &FlightQuery,
        from: QueryState,
        to: QueryState,
    ) -> Result<ProgressSnapshot, ProgressError> {
        self.report_transition_then(query, from, to, |_| {})
    }

    /// Like [`report_transition`](Self::report_transition), but runs `announce`
    /// after the counts change and before the snapshot is published.
    ///
    /// `announce` runs under the tracker lock and is skipped when the
    /// transition is rejected.
    pub fn report_transition_then(
        &self,
        query: &FlightQuery,
        from: QueryState,
        to: QueryState,
        announce: impl FnOnce(&ProgressSnapshot),
    ) -> Result<ProgressSnapshot, ProgressError> {
        if !from.can_move_to(to) {
            return Err(ProgressError::InvalidTransition { from, to });
        }

        let mut counts = self.counts.lock();
        let source_bucket = bucket(&mut counts, from);
        if *source_bucket == 0 {
            return Err(ProgressError::EmptyState(from));
        }
        *source_bucket -= 1;
        *bucket(&mut counts, to) += 1;

        let snapshot = *counts;
        trace!("{}: {} -> {} ({:?})", query, from, to, snapshot);

        announce(&snapshot);
        self.updates.send_replace(snapshot);
        if let Some(sink) = &self.sink {
            sink.publish(&snapshot);
        }

        Ok(snapshot)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.counts.lock()
    }

    /// Latest-value channel for observers that only care about the newest counts
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.updates.subscribe()
    }
}

fn bucket(counts: &mut ProgressSnapshot, state: QueryState) -> &mut usize {
    match state {
        QueryState::Pending => &mut counts.pending,
        QueryState::InFlight => &mut counts.in_flight,
        QueryState::Succeeded => &mut counts.succeeded,
        QueryState::Failed => &mut counts.failed,
    }
}
