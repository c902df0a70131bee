use async_trait::async_trait;
use flightdesk_core::FlightResult;
use flightdesk_dispatch::{BatchEvent, BatchHandle, BatchOptions, BatchSummary, DispatchMode, ReviewDecision};
use flightdesk_roster::{render_time, EntryState, ProcessedRoster, Roster, RosterEntry, NO_TIME};
use flightdesk_shared::ProgressSnapshot;
use flightdesk_store::DispatchConfig;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

/// Answers review requests in sequential batches
#[async_trait]
pub trait Reviewer: Send {
    async fn decide(&mut self, entry: &RosterEntry, result: &FlightResult) -> ReviewDecision;
}

/// Used for parallel batches, which never ask
pub struct AcceptAll;

#[async_trait]
impl Reviewer for AcceptAll {
    async fn decide(&mut self, _entry: &RosterEntry, _result: &FlightResult) -> ReviewDecision {
        ReviewDecision::Accept
    }
}

/// Prompts on stdout and reads `y`/`n` from stdin; end of input rejects
pub struct TerminalReviewer {
    lines: Lines<BufReader<Stdin>>,
}

impl TerminalReviewer {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for TerminalReviewer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reviewer for TerminalReviewer {
    async fn decide(&mut self, entry: &RosterEntry, result: &FlightResult) -> ReviewDecision {
        print!("{}  accept? [y/N] ", review_prompt(entry, result));
        let _ = std::io::stdout().flush();

        match self.lines.next_line().await {
            Ok(Some(answer)) => parse_answer(&answer),
            Ok(None) => ReviewDecision::Reject,
            Err(e) => {
                warn!("Failed to read review answer: {}", e);
                ReviewDecision::Reject
            }
        }
    }
}

pub fn parse_answer(answer: &str) -> ReviewDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ReviewDecision::Accept,
        _ => ReviewDecision::Reject,
    }
}

/// `[row 3] CA0984 /PEK -> 1541  CA984: Landed`
pub fn review_prompt(entry: &RosterEntry, result: &FlightResult) -> String {
    let shown = result
        .status()
        .map(|status| render_time(status, entry.query.date))
        .unwrap_or_else(|| NO_TIME.to_string());
    let delayed = if result.status().is_some_and(|s| s.is_delayed()) {
        " DELAYED"
    } else {
        ""
    };
    format!(
        "[row {}] {} /{} -> {}{}  {}",
        entry.row,
        entry.flight_token(),
        entry.airport_token(),
        shown,
        delayed,
        result.summary()
    )
}

/// Config values, overridden by command-line flags when given
pub fn batch_options(config: &DispatchConfig, mode: Option<DispatchMode>, concurrency: Option<usize>) -> BatchOptions {
    match mode.unwrap_or(config.mode) {
        DispatchMode::Sequential => BatchOptions::sequential(),
        DispatchMode::Parallel => BatchOptions::parallel(concurrency.unwrap_or(config.concurrency_limit)),
    }
}

pub fn progress_line(snapshot: &ProgressSnapshot) -> String {
    format!(
        "{}/{} done ({} ok, {} failed), {} in flight, {} pending",
        snapshot.finished(),
        snapshot.total,
        snapshot.succeeded,
        snapshot.failed,
        snapshot.in_flight,
        snapshot.pending
    )
}

pub struct BatchReport {
    pub processed: ProcessedRoster,
    pub summary: Option<BatchSummary>,
}

impl BatchReport {
    pub fn summary_line(&self) -> String {
        let states = [
            EntryState::Updated,
            EntryState::NoTimeFound,
            EntryState::Failed,
            EntryState::Rejected,
            EntryState::Cancelled,
        ];
        let counts: Vec<String> = states
            .iter()
            .map(|state| format!("{} {}", self.processed.count(*state), state))
            .collect();
        match &self.summary {
            Some(summary) if summary.cancelled => format!("Batch cancelled: {}", counts.join(", ")),
            Some(summary) => format!("Batch finished in {:.1?}: {}", summary.elapsed, counts.join(", ")),
            None => format!("Batch ended early: {}", counts.join(", ")),
        }
    }
}

/// Drain a batch, routing reviews to `reviewer` and writing accepted times into the roster.
///
/// Positions in the batch must follow `roster.entries`.
pub async fn drive_batch<R: Reviewer>(mut handle: BatchHandle, roster: &Roster, reviewer: &mut R) -> BatchReport {
    let mut processed = ProcessedRoster::new(roster);
    let cancel = handle.cancellation_token();
    let mut summary = None;

    while let Some(event) = handle.next_event().await {
        match event {
            BatchEvent::Progress(snapshot) => info!("{}", progress_line(&snapshot)),
            BatchEvent::AwaitingReview(request) => {
                let Some(entry) = roster.entries.get(request.position()) else {
                    warn!("Review for unknown position {}", request.position());
                    continue;
                };
                let decision = tokio::select! {
                    decision = reviewer.decide(entry, request.result()) => Some(decision),
                    _ = cancel.cancelled() => None,
                };
                if let Some(decision) = decision {
                    request.decide(decision);
                }
            }
            BatchEvent::Delivered(delivery) => {
                if let Some(state) = processed.apply(&delivery) {
                    info!("{} -> {}", delivery.result.summary(), state);
                }
            }
            BatchEvent::Complete(done) => summary = Some(done),
        }
    }

    BatchReport { processed, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use flightdesk_core::{FlightDataSource, SourceChain};
    use flightdesk_dispatch::QueryDispatchEngine;
    use flightdesk_roster::{parse_with_today, RosterSettings};
    use flightdesk_store::RecordedSource;
    use std::sync::Arc;

    const ROSTER: &str = "JCSY:CA0984/11DEC24/LAX,I\nFLT/ ARPT TIME\nCA0984 /PEK 1530\nAM0782 /MEX\nDL0300 /ATL GATE 4";

    const PRIMARY: &str = r#"{
        "CA984/2024-12-11/ARR": { "scheduled_time": "2024-12-11T15:30:00", "actual_time": "2024-12-11T15:41:00", "status_text": "Landed" },
        "AM782/2024-12-11/ARR": { "error": "unavailable", "message": "502" },
        "DL300/2024-12-11/ARR": { "scheduled_time": "2024-12-11T17:12:00", "actual_time": "2024-12-11T17:58:00", "status_text": "Landed" }
    }"#;

    const SECONDARY: &str = r#"{
        "AM782/2024-12-11/ARR": { "scheduled_time": "2024-12-11T16:05:00", "actual_time": "2024-12-11T16:01:00", "status_text": "Landed" }
    }"#;

    /// Rejects one flight number, accepts the rest
    struct RejectFlight(&'static str);

    #[async_trait]
    impl Reviewer for RejectFlight {
        async fn decide(&mut self, _entry: &RosterEntry, result: &FlightResult) -> ReviewDecision {
            if result.query.flight_number == self.0 {
                ReviewDecision::Reject
            } else {
                ReviewDecision::Accept
            }
        }
    }

    fn setup() -> (QueryDispatchEngine, Roster) {
        let sources: Vec<Arc<dyn FlightDataSource>> = vec![
            Arc::new(RecordedSource::from_json("flightview", PRIMARY).unwrap()),
            Arc::new(RecordedSource::from_json("flightstats", SECONDARY).unwrap()),
        ];
        let engine = QueryDispatchEngine::new(SourceChain::new(sources).unwrap());
        let today = NaiveDate::from_ymd_opt(2024, 12, 11).unwrap();
        let roster = parse_with_today(ROSTER, &RosterSettings::default(), today).unwrap();
        (engine, roster)
    }

    #[tokio::test]
    async fn test_parallel_batch_rewrites_roster() {
        let (engine, roster) = setup();
        let handle = engine.submit_batch(roster.queries(), BatchOptions::parallel(3)).unwrap();

        let report = drive_batch(handle, &roster, &mut AcceptAll).await;

        assert_eq!(
            report.processed.render(),
            "JCSY:CA0984/11DEC24/LAX,I\nFLT/ ARPT TIME\nCA0984 /PEK 1541\nAM0782 /MEX 1601*\nDL0300 /ATL 1758 GATE 4"
        );
        assert!(report.summary_line().starts_with("Batch finished"));
        assert!(report.summary_line().contains("3 updated"));
    }

    #[tokio::test]
    async fn test_sequential_batch_honours_rejections() {
        let (engine, roster) = setup();
        let handle = engine.submit_batch(roster.queries(), BatchOptions::sequential()).unwrap();

        let report = drive_batch(handle, &roster, &mut RejectFlight("AM782")).await;

        assert_eq!(report.processed.state(0), Some(EntryState::Updated));
        assert_eq!(report.processed.state(1), Some(EntryState::Rejected));
        assert_eq!(report.processed.state(2), Some(EntryState::Updated));
        assert!(report.processed.render().contains("AM0782 /MEX\n"));
        let summary = report.summary.unwrap();
        assert_eq!(summary.snapshot.succeeded, 2);
        assert_eq!(summary.snapshot.failed, 1);
    }

    #[test]
    fn test_flags_override_config() {
        let config = DispatchConfig::default();
        assert_eq!(batch_options(&config, None, None), BatchOptions::parallel(5));
        assert_eq!(batch_options(&config, None, Some(2)), BatchOptions::parallel(2));
        assert_eq!(
            batch_options(&config, Some(DispatchMode::Sequential), Some(4)),
            BatchOptions::sequential()
        );
    }

    #[test]
    fn test_answers_and_prompt() {
        assert_eq!(parse_answer(" Y "), ReviewDecision::Accept);
        assert_eq!(parse_answer("yes"), ReviewDecision::Accept);
        assert_eq!(parse_answer(""), ReviewDecision::Reject);
        assert_eq!(parse_answer("no"), ReviewDecision::Reject);

        let (_, roster) = setup();
        let entry = &roster.entries[0];
        let result = FlightResult::cancelled(entry.query.clone());
        assert!(review_prompt(entry, &result).starts_with("[row 3] CA0984 /PEK -> ----"));
    }

    #[test]
    fn test_progress_line() {
        let snapshot = ProgressSnapshot {
            total: 4,
            pending: 1,
            in_flight: 1,
            succeeded: 1,
            failed: 1,
        };
        assert_eq!(progress_line(&snapshot), "2/4 done (1 ok, 1 failed), 1 in flight, 1 pending");
    }
}
