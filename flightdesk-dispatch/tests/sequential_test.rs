mod common;

use common::{arrivals, pair, single, ScriptedSource};
use flightdesk_core::{ErrorKind, SourceError};
use flightdesk_dispatch::{BatchEvent, BatchOptions, DispatchMode, Disposition, QueryDispatchEngine};
use flightdesk_shared::SourceRole;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reviews_arrive_in_submission_order() {
    // Later flights answer faster, so completion order is the reverse of submission order
    let primary = Arc::new(
        ScriptedSource::new("primary")
            .with_delay_for("AA100", Duration::from_millis(60))
            .with_delay_for("AA101", Duration::from_millis(40))
            .with_delay_for("AA102", Duration::from_millis(20)),
    );
    let engine = QueryDispatchEngine::new(single(&primary));
    let options = BatchOptions {
        concurrency_limit: 3,
        mode: DispatchMode::Sequential,
    };
    let mut handle = engine.submit_batch(arrivals(4), options).unwrap();

    let mut reviewed = Vec::new();
    let mut delivered = Vec::new();
    while let Some(event) = handle.next_event().await {
        match event {
            BatchEvent::AwaitingReview(request) => {
                reviewed.push(request.position());
                assert!(request.accept());
            }
            BatchEvent::Delivered(delivery) => {
                assert_eq!(delivery.disposition, Disposition::Accepted);
                delivered.push(delivery.position);
            }
            _ => {}
        }
    }

    assert_eq!(reviewed, vec![0, 1, 2, 3]);
    assert_eq!(delivered, vec![0, 1, 2, 3]);
    assert_eq!(handle.snapshot().succeeded, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fetching_continues_while_a_review_is_pending() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let primary = Arc::new(ScriptedSource::new("primary").reporting_starts(started_tx));
    let engine = QueryDispatchEngine::new(single(&primary));
    let options = BatchOptions {
        concurrency_limit: 3,
        mode: DispatchMode::Sequential,
    };
    let mut handle = engine.submit_batch(arrivals(5), options).unwrap();

    let mut first_review_held = false;
    let mut delivered = 0;
    while let Some(event) = handle.next_event().await {
        match event {
            BatchEvent::Progress(snapshot) => {
                assert!(snapshot.in_flight <= 3, "{:?}", snapshot);
            }
            BatchEvent::AwaitingReview(request) if !first_review_held => {
                first_review_held = true;
                assert_eq!(request.position(), 0);
                // The other workers keep fetching until every slot is taken
                for _ in 0..3 {
                    started_rx.recv().await.expect("fetch started");
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                assert_eq!(primary.calls.load(Ordering::SeqCst), 3);
                assert_eq!(handle.snapshot().in_flight, 3);
                assert!(request.accept());
            }
            BatchEvent::AwaitingReview(request) => assert!(request.accept()),
            BatchEvent::Delivered(_) => delivered += 1,
            BatchEvent::Complete(_) => {}
        }
    }

    assert!(first_review_held);
    assert_eq!(delivered, 5);
    assert_eq!(primary.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_rejection_counts_as_failed_and_delivery_continues() {
    let primary = Arc::new(ScriptedSource::new("primary"));
    let engine = QueryDispatchEngine::new(single(&primary));
    let mut handle = engine
        .submit_batch(arrivals(3), BatchOptions::sequential())
        .unwrap();

    let mut deliveries = Vec::new();
    while let Some(event) = handle.next_event().await {
        match event {
            BatchEvent::AwaitingReview(request) => {
                if request.result().query.flight_number == "AA101" {
                    request.reject();
                } else {
                    request.accept();
                }
            }
            BatchEvent::Progress(snapshot) => {
                // A fetched result stays in flight until the operator decides
                assert!(snapshot.is_consistent());
                assert_eq!(snapshot.succeeded + snapshot.failed, deliveries.len());
            }
            BatchEvent::Delivered(delivery) => deliveries.push(delivery),
            BatchEvent::Complete(_) => {}
        }
    }

    let positions: Vec<usize> = deliveries.iter().map(|d| d.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
    assert_eq!(deliveries[1].disposition, Disposition::Rejected);
    assert_eq!(deliveries[1].result.error_kind(), Some(ErrorKind::RejectedByOperator));
    assert!(deliveries[0].result.is_success());
    assert!(deliveries[2].result.is_success());

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.succeeded, 2);
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.in_flight, 0);
}

#[tokio::test]
async fn test_dropped_review_counts_as_rejection() {
    let primary = Arc::new(ScriptedSource::new("primary"));
    let engine = QueryDispatchEngine::new(single(&primary));
    let mut handle = engine
        .submit_batch(arrivals(2), BatchOptions::sequential())
        .unwrap();

    let mut dispositions = Vec::new();
    while let Some(event) = handle.next_event().await {
        match event {
            BatchEvent::AwaitingReview(request) => drop(request),
            BatchEvent::Delivered(delivery) => dispositions.push(delivery.disposition),
            _ => {}
        }
    }

    assert_eq!(dispositions, vec![Disposition::Rejected, Disposition::Rejected]);
    assert_eq!(handle.snapshot().failed, 2);
}

#[tokio::test]
async fn test_failures_are_delivered_without_review() {
    let primary = Arc::new(
        ScriptedSource::new("primary").failing_for("AA100", SourceError::NotFound("AA100".to_string())),
    );
    let secondary = Arc::new(
        ScriptedSource::new("secondary").failing_for("AA100", SourceError::Parse("empty page".to_string())),
    );
    let engine = QueryDispatchEngine::new(pair(&primary, &secondary));
    let mut handle = engine
        .submit_batch(arrivals(2), BatchOptions::sequential())
        .unwrap();

    let mut reviews = 0;
    let mut deliveries = Vec::new();
    while let Some(event) = handle.next_event().await {
        match event {
            BatchEvent::AwaitingReview(request) => {
                reviews += 1;
                assert_eq!(request.result().source_used(), Some(SourceRole::Primary));
                request.accept();
            }
            BatchEvent::Delivered(delivery) => deliveries.push(delivery),
            _ => {}
        }
    }

    assert_eq!(reviews, 1);
    assert_eq!(deliveries[0].disposition, Disposition::NotReviewed);
    assert_eq!(deliveries[0].result.error_kind(), Some(ErrorKind::AllSourcesExhausted));
    assert_eq!(deliveries[1].disposition, Disposition::Accepted);
}
