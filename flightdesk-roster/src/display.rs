use chrono::{NaiveDate, NaiveDateTime};
use flightdesk_shared::FlightStatus;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

use crate::parser::RosterEntry;

/// A time cell written by an earlier pass, e.g. `1530`, `0912*+` or `----`
static TIME_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4}|-{4})\*?[+-]?$").unwrap());

pub const NO_TIME: &str = "----";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeKind {
    Actual,
    Estimated,
    Scheduled,
}

/// Calendar day of the shown time relative to the roster date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOffset {
    Same,
    Later,
    Earlier,
}

impl DayOffset {
    pub fn between(time: NaiveDateTime, date: NaiveDate) -> Self {
        match time.date().cmp(&date) {
            Ordering::Equal => DayOffset::Same,
            Ordering::Greater => DayOffset::Later,
            Ordering::Less => DayOffset::Earlier,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            DayOffset::Same => "",
            DayOffset::Later => "+",
            DayOffset::Earlier => "-",
        }
    }
}

/// The one time an operator sees for a flight, with its markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayTime {
    pub time: NaiveDateTime,
    pub kind: TimeKind,
    pub offset: DayOffset,
    /// Resolved by a source other than the primary
    pub fallback: bool,
}

impl DisplayTime {
    pub fn for_status(status: &FlightStatus, roster_date: NaiveDate) -> Option<Self> {
        let (time, kind) = select_time(status)?;
        Some(Self {
            time,
            kind,
            offset: DayOffset::between(time, roster_date),
            fallback: !status.source_used.is_primary(),
        })
    }
}

impl fmt::Display for DisplayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.time.format("%H%M"))?;
        if self.fallback {
            f.write_str("*")?;
        }
        f.write_str(self.offset.marker())
    }
}

/// Actual beats estimated, which only counts when the status says so; scheduled is last
pub fn select_time(status: &FlightStatus) -> Option<(NaiveDateTime, TimeKind)> {
    if let Some(actual) = status.actual_time {
        return Some((actual, TimeKind::Actual));
    }
    if let Some(estimated) = status.estimated_time {
        let text = status.status_text.to_ascii_lowercase();
        if text.contains("estimated") || text.contains("expected") {
            return Some((estimated, TimeKind::Estimated));
        }
    }
    status.scheduled_time.map(|s| (s, TimeKind::Scheduled))
}

/// `HHMM` with markers, or `----` when nothing usable was reported
pub fn render_time(status: &FlightStatus, roster_date: NaiveDate) -> String {
    DisplayTime::for_status(status, roster_date)
        .map(|t| t.to_string())
        .unwrap_or_else(|| NO_TIME.to_string())
}

/// Rebuild a roster line as `FLT /ARPT HHMM` plus any remarks that followed.
///
/// Returns `None` when the status has no time to show.
pub fn rewrite_line(entry: &RosterEntry, status: &FlightStatus) -> Option<String> {
    let shown = DisplayTime::for_status(status, entry.query.date)?;

    let mut line = format!("{} /{} {}", entry.flight_token(), entry.airport_token(), shown);
    let mut remarks = entry.trailing_tokens();
    if remarks.first().is_some_and(|t| TIME_CELL.is_match(t)) {
        remarks.remove(0);
    }
    if !remarks.is_empty() {
        line.push(' ');
        line.push_str(&remarks.join(" "));
    }
    Some(line)
}
