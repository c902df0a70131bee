use flightdesk_core::{ErrorKind, FlightResult};
use flightdesk_dispatch::{Delivery, Disposition};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::display::rewrite_line;
use crate::parser::{Roster, RosterEntry};

/// Where a roster flight line ended up after its batch result arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Updated,
    /// Accepted, but the source reported no usable time
    NoTimeFound,
    Failed,
    Rejected,
    Cancelled,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntryState::Pending => "pending",
            EntryState::Updated => "updated",
            EntryState::NoTimeFound => "no time found",
            EntryState::Failed => "failed",
            EntryState::Rejected => "rejected",
            EntryState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// The operator's roster text with accepted times written back in
#[derive(Debug, Clone)]
pub struct ProcessedRoster {
    lines: Vec<String>,
    entries: Vec<RosterEntry>,
    states: Vec<EntryState>,
    /// Row of each entry keyed by batch position
    by_position: HashMap<usize, usize>,
}

impl ProcessedRoster {
    /// Batch positions follow `roster.entries` order
    pub fn new(roster: &Roster) -> Self {
        Self {
            lines: roster.lines.clone(),
            entries: roster.entries.clone(),
            states: vec![EntryState::Pending; roster.entries.len()],
            by_position: roster
                .entries
                .iter()
                .enumerate()
                .map(|(position, entry)| (position, entry.row))
                .collect(),
        }
    }

    /// Record one delivery; returns the new state of the matching entry
    pub fn apply(&mut self, delivery: &Delivery) -> Option<EntryState> {
        let Some(&row) = self.by_position.get(&delivery.position) else {
            warn!("Delivery for unknown batch position {}", delivery.position);
            return None;
        };
        let position = delivery.position;
        let entry = &self.entries[position];

        let (state, rewritten) = classify(entry, &delivery.result, delivery.disposition);
        if let Some(line) = rewritten {
            debug!("Row {} rewritten: {}", row, line);
            self.lines[row - 1] = line;
        }
        self.states[position] = state;
        Some(state)
    }

    pub fn state(&self, position: usize) -> Option<EntryState> {
        self.states.get(position).copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&RosterEntry, EntryState)> {
        self.entries.iter().zip(self.states.iter().copied())
    }

    pub fn count(&self, state: EntryState) -> usize {
        self.states.iter().filter(|s| **s == state).count()
    }

    /// Roster text in original line order
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

fn classify(
    entry: &RosterEntry,
    result: &FlightResult,
    disposition: Disposition,
) -> (EntryState, Option<String>) {
    if disposition == Disposition::Rejected {
        return (EntryState::Rejected, None);
    }
    match &result.outcome {
        Ok(status) if disposition.is_accepted() => match rewrite_line(entry, status) {
            Some(line) => (EntryState::Updated, Some(line)),
            None => (EntryState::NoTimeFound, None),
        },
        Ok(_) => (EntryState::Pending, None),
        Err(e) if e.kind() == ErrorKind::Cancelled => (EntryState::Cancelled, None),
        Err(e) if e.kind() == ErrorKind::RejectedByOperator => (EntryState::Rejected, None),
        Err(_) => (EntryState::Failed, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_with_today, RosterSettings};
    use chrono::NaiveDate;
    use flightdesk_core::{FetchError, SourceError, SourceFailure};
    use flightdesk_shared::{FlightStatus, SourceReport, SourceRole};

    const ROSTER: &str = "JCSY:CA0984/11DEC24/LAX,I\nFLT/ ARPT TIME\nCA0984 /PEK 1530\nAM0782 /MEX\n## end\nDL0300 /ATL VIP";

    fn roster() -> Roster {
        let today = NaiveDate::from_ymd_opt(2024, 12, 11).unwrap();
        parse_with_today(ROSTER, &RosterSettings::default(), today).unwrap()
    }

    fn landed(roster: &Roster, position: usize, role: SourceRole) -> FlightResult {
        let query = roster.entries[position].query.clone();
        let report = SourceReport {
            scheduled_time: query.date.and_hms_opt(15, 30, 0),
            actual_time: query.date.and_hms_opt(15, 52, 0),
            status_text: "Landed".to_string(),
            ..Default::default()
        };
        FlightResult::new(query, Ok(FlightStatus::from_report(report, role, "test")))
    }

    #[test]
    fn test_accepted_results_rewrite_lines() {
        let roster = roster();
        let mut processed = ProcessedRoster::new(&roster);

        let state = processed.apply(&Delivery {
            position: 0,
            result: landed(&roster, 0, SourceRole::Primary),
            disposition: Disposition::AutoAccepted,
        });
        assert_eq!(state, Some(EntryState::Updated));

        processed.apply(&Delivery {
            position: 2,
            result: landed(&roster, 2, SourceRole::Secondary),
            disposition: Disposition::Accepted,
        });

        assert_eq!(
            processed.render(),
            "JCSY:CA0984/11DEC24/LAX,I\nFLT/ ARPT TIME\nCA0984 /PEK 1552\nAM0782 /MEX\n## end\nDL0300 /ATL 1552* VIP"
        );
        assert_eq!(processed.state(1), Some(EntryState::Pending));
        assert_eq!(processed.count(EntryState::Updated), 2);
    }

    #[test]
    fn test_rejected_and_failed_keep_original_lines() {
        let roster = roster();
        let mut processed = ProcessedRoster::new(&roster);

        processed.apply(&Delivery {
            position: 0,
            result: FlightResult::new(roster.entries[0].query.clone(), Err(FetchError::RejectedByOperator)),
            disposition: Disposition::Rejected,
        });
        processed.apply(&Delivery {
            position: 1,
            result: FlightResult::new(
                roster.entries[1].query.clone(),
                Err(FetchError::AllSourcesExhausted {
                    failures: vec![SourceFailure {
                        source: "primary".to_string(),
                        role: SourceRole::Primary,
                        error: SourceError::NotFound("AM782".to_string()),
                    }],
                }),
            ),
            disposition: Disposition::NotReviewed,
        });
        processed.apply(&Delivery {
            position: 2,
            result: FlightResult::cancelled(roster.entries[2].query.clone()),
            disposition: Disposition::NotReviewed,
        });

        assert_eq!(processed.render(), ROSTER);
        let states: Vec<EntryState> = processed.entries().map(|(_, s)| s).collect();
        assert_eq!(states, vec![EntryState::Rejected, EntryState::Failed, EntryState::Cancelled]);
    }

    #[test]
    fn test_accepted_without_time() {
        let roster = roster();
        let mut processed = ProcessedRoster::new(&roster);
        let query = roster.entries[1].query.clone();
        let status = FlightStatus::from_report(SourceReport::default(), SourceRole::Primary, "test");

        let state = processed.apply(&Delivery {
            position: 1,
            result: FlightResult::new(query, Ok(status)),
            disposition: Disposition::Accepted,
        });
        assert_eq!(state, Some(EntryState::NoTimeFound));
        let stray = Delivery {
            position: 9,
            result: landed(&roster, 0, SourceRole::Primary),
            disposition: Disposition::Accepted,
        };
        assert_eq!(processed.apply(&stray), None);
    }
}
