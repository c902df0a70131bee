use flightdesk_core::{FetchError, FlightResult, ProgressSink, ProgressTracker, QueryState, SourceChain};
use flightdesk_shared::{BatchId, FlightQuery, FlightStatus, ProgressSnapshot};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::{BatchEvent, BatchSummary, Delivery, Disposition, ReviewDecision, ReviewRequest};
use crate::handle::BatchHandle;
use crate::options::{BatchOptions, DispatchMode};
use crate::{DispatchError, DispatchResult};

/// Fans a batch of queries out over a bounded worker pool.
///
/// The engine itself is stateless between batches; each call to
/// [`submit_batch`](Self::submit_batch) owns its own queue, tracker and
/// workers for as long as the batch runs.
#[derive(Clone)]
pub struct QueryDispatchEngine {
    chain: SourceChain,
}

/// A query together with its place in the submitted batch
struct Ticket {
    position: usize,
    query: FlightQuery,
}

/// A ticket that reached the end of its fetch (or never started)
struct Completed {
    ticket: Ticket,
    from: QueryState,
    outcome: Result<FlightStatus, FetchError>,
    /// Held from claim until final delivery
    slot: Option<OwnedSemaphorePermit>,
}

/// Forwards tracker commits into the batch event stream
struct EventSink(mpsc::UnboundedSender<BatchEvent>);

impl ProgressSink for EventSink {
    fn publish(&self, snapshot: &ProgressSnapshot) {
        let _ = self.0.send(BatchEvent::Progress(*snapshot));
    }
}

/// State shared by the workers of one batch
struct Batch {
    id: BatchId,
    chain: SourceChain,
    queue: Mutex<VecDeque<Ticket>>,
    /// One permit per in-flight query, fetched or awaiting review
    slots: Arc<Semaphore>,
    tracker: Arc<ProgressTracker>,
    events: mpsc::UnboundedSender<BatchEvent>,
    cancel: CancellationToken,
}

impl QueryDispatchEngine {
    pub fn new(chain: SourceChain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &SourceChain {
        &self.chain
    }

    /// Start resolving `queries` in the background.
    ///
    /// Fails fast, before any fetch, on an empty batch or a concurrency
    /// limit outside `1..=5`. Must be called from within a Tokio runtime.
    pub fn submit_batch(
        &self,
        queries: Vec<FlightQuery>,
        options: BatchOptions,
    ) -> DispatchResult<BatchHandle> {
        options.validate()?;
        if queries.is_empty() {
            return Err(DispatchError::InvalidConfiguration(
                "batch contains no queries".to_string(),
            ));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let tracker = Arc::new(ProgressTracker::with_sink(
            queries.len(),
            Arc::new(EventSink(events_tx.clone())),
        ));
        let cancel = CancellationToken::new();

        let batch = Arc::new(Batch {
            id: Uuid::new_v4(),
            chain: self.chain.clone(),
            queue: Mutex::new(
                queries
                    .into_iter()
                    .enumerate()
                    .map(|(position, query)| Ticket { position, query })
                    .collect(),
            ),
            slots: Arc::new(Semaphore::new(options.concurrency_limit)),
            tracker: tracker.clone(),
            events: events_tx,
            cancel: cancel.clone(),
        });

        info!(
            "Batch {} started: {} queries, {} mode, {} worker(s), sources [{}]",
            batch.id,
            tracker.snapshot().total,
            options.mode,
            options.concurrency_limit,
            self.chain.source_names().join(", ")
        );

        let handle = BatchHandle::new(batch.id, options.mode, events_rx, cancel, tracker);
        tokio::spawn(run_batch(batch, options));
        Ok(handle)
    }
}

async fn run_batch(batch: Arc<Batch>, options: BatchOptions) {
    let started = Instant::now();

    let (review_tx, reviewer) = match options.mode {
        DispatchMode::Sequential => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(tokio::spawn(review_in_order(batch.clone(), rx))))
        }
        DispatchMode::Parallel => (None, None),
    };

    let mut workers = JoinSet::new();
    for worker_id in 0..options.concurrency_limit {
        workers.spawn(run_worker(worker_id, batch.clone(), review_tx.clone()));
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!("Batch {} worker terminated abnormally: {}", batch.id, e);
        }
    }

    if !batch.cancel.is_cancelled() && !batch.queue.lock().is_empty() {
        error!("Batch {} lost its workers with queries still queued; draining inline", batch.id);
        run_worker(options.concurrency_limit, batch.clone(), review_tx.clone()).await;
    }

    // Only cancellation leaves tickets behind now
    let leftovers: Vec<Ticket> = batch.queue.lock().drain(..).collect();
    if !leftovers.is_empty() {
        warn!(
            "Batch {} cancelled with {} queries never dispatched",
            batch.id,
            leftovers.len()
        );
    }
    for ticket in leftovers {
        let completed = Completed {
            ticket,
            from: QueryState::Pending,
            outcome: Err(FetchError::Cancelled),
            slot: None,
        };
        route(&batch, review_tx.as_ref(), completed);
    }

    drop(review_tx);
    if let Some(reviewer) = reviewer {
        if let Err(e) = reviewer.await {
            error!("Batch {} review stage terminated abnormally: {}", batch.id, e);
        }
    }

    let snapshot = batch.tracker.snapshot();
    let summary = BatchSummary {
        batch_id: batch.id,
        snapshot,
        cancelled: batch.cancel.is_cancelled(),
        elapsed: started.elapsed(),
    };
    info!(
        "Batch {} complete in {:?}: {} succeeded, {} failed of {}",
        batch.id, summary.elapsed, snapshot.succeeded, snapshot.failed, snapshot.total
    );
    let _ = batch.events.send(BatchEvent::Complete(summary));
}

/// Claim tickets one at a time until the queue drains or the batch is cancelled
async fn run_worker(
    worker_id: usize,
    batch: Arc<Batch>,
    review_tx: Option<mpsc::UnboundedSender<Completed>>,
) {
    loop {
        let slot = tokio::select! {
            biased;
            _ = batch.cancel.cancelled() => None,
            permit = batch.slots.clone().acquire_owned() => permit.ok(),
        };
        let Some(slot) = slot else {
            debug!("Batch {} worker {} stopping: cancelled", batch.id, worker_id);
            break;
        };
        // A cancel can land between winning a slot and claiming a ticket
        if batch.cancel.is_cancelled() {
            debug!("Batch {} worker {} stopping: cancelled", batch.id, worker_id);
            break;
        }
        let Some(ticket) = batch.queue.lock().pop_front() else {
            break;
        };

        if let Err(e) = batch
            .tracker
            .report_transition(&ticket.query, QueryState::Pending, QueryState::InFlight)
        {
            error!("Batch {} progress rejected dispatch of {}: {}", batch.id, ticket.query, e);
        }
        debug!("Batch {} worker {} fetching {}", batch.id, worker_id, ticket.query);

        let outcome = batch.chain.resolve(&ticket.query).await;
        let completed = Completed {
            ticket,
            from: QueryState::InFlight,
            outcome,
            slot: Some(slot),
        };
        route(&batch, review_tx.as_ref(), completed);
    }
}

/// Deliver straight away in parallel mode, or hand over to the review stage
fn route(batch: &Batch, review_tx: Option<&mpsc::UnboundedSender<Completed>>, completed: Completed) {
    match review_tx {
        Some(tx) => {
            if let Err(mpsc::error::SendError(completed)) = tx.send(completed) {
                error!("Batch {} review stage is gone; delivering directly", batch.id);
                let disposition = Disposition::NotReviewed;
                finish(batch, completed.ticket, completed.from, completed.outcome, disposition);
            }
        }
        None => {
            let disposition = if completed.outcome.is_ok() {
                Disposition::AutoAccepted
            } else {
                Disposition::NotReviewed
            };
            finish(batch, completed.ticket, completed.from, completed.outcome, disposition);
        }
    }
}

/// Sequential delivery: release results strictly in submission order,
/// waiting on the operator for every success.
async fn review_in_order(batch: Arc<Batch>, mut completions: mpsc::UnboundedReceiver<Completed>) {
    let mut waiting: BTreeMap<usize, Completed> = BTreeMap::new();
    let mut next = 0;

    while let Some(completed) = completions.recv().await {
        waiting.insert(completed.ticket.position, completed);
        while let Some(completed) = waiting.remove(&next) {
            next += 1;
            review(&batch, completed).await;
        }
    }

    // A worker that died mid-fetch leaves a gap; flush whatever is left
    for (_, completed) in waiting {
        review(&batch, completed).await;
    }
}

async fn review(batch: &Batch, completed: Completed) {
    let Completed {
        ticket,
        from,
        outcome,
        slot: _slot,
    } = completed;

    let status = match outcome {
        Ok(status) if !batch.cancel.is_cancelled() => status,
        Ok(_) => {
            finish(batch, ticket, from, Err(FetchError::Cancelled), Disposition::NotReviewed);
            return;
        }
        Err(e) => {
            finish(batch, ticket, from, Err(e), Disposition::NotReviewed);
            return;
        }
    };

    let result = FlightResult::new(ticket.query.clone(), Ok(status));
    let (reply, decision) = oneshot::channel();
    let request = ReviewRequest {
        position: ticket.position,
        result: result.clone(),
        reply,
    };
    if batch.events.send(BatchEvent::AwaitingReview(request)).is_err() {
        debug!("Batch {} consumer is gone; review of {} dropped", batch.id, ticket.query);
    }

    let decision = tokio::select! {
        biased;
        answer = decision => Some(answer.unwrap_or(ReviewDecision::Reject)),
        _ = batch.cancel.cancelled() => None,
    };

    match decision {
        Some(ReviewDecision::Accept) => {
            debug!("Batch {} operator accepted {}", batch.id, ticket.query);
            finish(batch, ticket, from, result.outcome, Disposition::Accepted);
        }
        Some(ReviewDecision::Reject) => {
            debug!("Batch {} operator rejected {}", batch.id, ticket.query);
            finish(batch, ticket, from, Err(FetchError::RejectedByOperator), Disposition::Rejected);
        }
        None => {
            finish(batch, ticket, from, Err(FetchError::Cancelled), Disposition::NotReviewed);
        }
    }
}

/// Publish the final result for a ticket and move it to its terminal bucket.
///
/// The delivery is sent inside the tracker commit, so a consumer that sees
/// `Delivered` and then reads the tracker finds the query already counted,
/// and the matching `Progress` event follows the delivery.
fn finish(
    batch: &Batch,
    ticket: Ticket,
    from: QueryState,
    outcome: Result<FlightStatus, FetchError>,
    disposition: Disposition,
) {
    let to = if outcome.is_ok() {
        QueryState::Succeeded
    } else {
        QueryState::Failed
    };
    let query = ticket.query.clone();
    let result = FlightResult::new(ticket.query, outcome);
    debug!("Batch {} delivering {}", batch.id, result.summary());

    let mut delivery = Some(Delivery {
        position: ticket.position,
        result,
        disposition,
    });
    let announce = |_: &ProgressSnapshot| {
        if let Some(delivery) = delivery.take() {
            let _ = batch.events.send(BatchEvent::Delivered(delivery));
        }
    };
    if let Err(e) = batch.tracker.report_transition_then(&query, from, to, announce) {
        error!("Batch {} progress rejected completion of {}: {}", batch.id, query, e);
    }
    // Deliver even when the tracker refused the transition
    if let Some(delivery) = delivery {
        let _ = batch.events.send(BatchEvent::Delivered(delivery));
    }
}
