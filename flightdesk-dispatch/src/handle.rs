use flightdesk_core::{FlightResult, ProgressTracker};
use flightdesk_shared::{BatchId, ProgressSnapshot};
use futures_util::{future, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::events::{BatchEvent, Delivery};
use crate::options::DispatchMode;

/// Consumer side of a running batch.
///
/// Dropping the handle cancels the batch.
pub struct BatchHandle {
    id: BatchId,
    mode: DispatchMode,
    events: BatchEvents,
    cancel: CancellationToken,
    tracker: Arc<ProgressTracker>,
}

/// Everything a drained batch produced
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: BatchId,
    /// Deliveries in the order they were made
    pub deliveries: Vec<Delivery>,
    pub snapshot: ProgressSnapshot,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl BatchOutcome {
    pub fn results(&self) -> impl Iterator<Item = &FlightResult> {
        self.deliveries.iter().map(|d| &d.result)
    }
}

impl BatchHandle {
    pub(crate) fn new(
        id: BatchId,
        mode: DispatchMode,
        events: mpsc::UnboundedReceiver<BatchEvent>,
        cancel: CancellationToken,
        tracker: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            id,
            mode,
            events: BatchEvents {
                inner: UnboundedReceiverStream::new(events),
                finished: false,
                _guard: cancel.clone().drop_guard(),
            },
            cancel,
            tracker,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Next event, or `None` once the completion marker has been handed out
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.next().await
    }

    /// Stop claiming new queries; fetches already running finish normally
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current counts; already include every query whose `Delivered` event was handed out
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tracker.subscribe()
    }

    pub fn into_event_stream(self) -> BatchEvents {
        self.events
    }

    /// Deliveries as a stream, accepting every review on the way
    pub fn into_delivery_stream(self) -> impl Stream<Item = Delivery> {
        self.events.filter_map(|event| {
            future::ready(match event {
                BatchEvent::AwaitingReview(request) => {
                    request.accept();
                    None
                }
                BatchEvent::Delivered(delivery) => Some(delivery),
                BatchEvent::Progress(_) | BatchEvent::Complete(_) => None,
            })
        })
    }

    /// Drain the batch to completion, accepting every review
    pub async fn collect(mut self) -> BatchOutcome {
        let mut deliveries = Vec::new();
        let mut summary = None;

        while let Some(event) = self.next_event().await {
            match event {
                BatchEvent::AwaitingReview(request) => {
                    request.accept();
                }
                BatchEvent::Delivered(delivery) => deliveries.push(delivery),
                BatchEvent::Complete(done) => summary = Some(done),
                BatchEvent::Progress(_) => {}
            }
        }

        let snapshot = self.snapshot();
        BatchOutcome {
            batch_id: self.id,
            deliveries,
            snapshot,
            cancelled: summary
                .as_ref()
                .map(|s| s.cancelled)
                .unwrap_or_else(|| self.cancel.is_cancelled()),
            elapsed: summary.map(|s| s.elapsed).unwrap_or_default(),
        }
    }
}

/// Event stream of one batch; ends right after [`BatchEvent::Complete`].
///
/// Keeps the batch alive: dropping the stream cancels it.
pub struct BatchEvents {
    inner: UnboundedReceiverStream<BatchEvent>,
    finished: bool,
    _guard: DropGuard,
}

impl Stream for BatchEvents {
    type Item = BatchEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                if matches!(event, BatchEvent::Complete(_)) {
                    this.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
