pub mod parser;
pub mod display;
pub mod processed;

pub use display::{render_time, rewrite_line, select_time, DayOffset, DisplayTime, TimeKind, NO_TIME};
pub use parser::{
    normalize_flight_number, parse, parse_with_today, Roster, RosterEntry, RosterError, RosterHeader,
    RosterSettings, SkippedLine,
};
pub use processed::{EntryState, ProcessedRoster};
