use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Position of a source in the fallback order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceRole {
    Primary,
    Secondary,
    /// Any source configured after the secondary, by zero-based chain position
    Additional(usize),
}

impl SourceRole {
    pub fn for_position(position: usize) -> Self {
        match position {
            0 => SourceRole::Primary,
            1 => SourceRole::Secondary,
            n => SourceRole::Additional(n),
        }
    }

    pub fn is_primary(self) -> bool {
        matches!(self, SourceRole::Primary)
    }
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRole::Primary => write!(f, "primary"),
            SourceRole::Secondary => write!(f, "secondary"),
            SourceRole::Additional(n) => write!(f, "fallback #{}", n),
        }
    }
}

/// What a single source reports for a flight, before provenance is attached.
///
/// Times are local to the airport the source describes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceReport {
    pub scheduled_time: Option<NaiveDateTime>,
    pub estimated_time: Option<NaiveDateTime>,
    pub actual_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SourceReport {
    /// True when the source answered but gave no usable time at all
    pub fn is_placeholder(&self) -> bool {
        self.scheduled_time.is_none() && self.estimated_time.is_none() && self.actual_time.is_none()
    }
}

/// Resolved status of one flight
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlightStatus {
    pub scheduled_time: Option<NaiveDateTime>,
    pub estimated_time: Option<NaiveDateTime>,
    pub actual_time: Option<NaiveDateTime>,
    pub status_text: String,
    pub source_used: SourceRole,
    pub source_name: String,
    pub raw_metadata: BTreeMap<String, String>,
}

impl FlightStatus {
    pub fn from_report(report: SourceReport, source_used: SourceRole, source_name: impl Into<String>) -> Self {
        Self {
            scheduled_time: report.scheduled_time,
            estimated_time: report.estimated_time,
            actual_time: report.actual_time,
            status_text: report.status_text,
            source_used,
            source_name: source_name.into(),
            raw_metadata: report.metadata,
        }
    }

    /// A flight counts as delayed once it actually moved later than scheduled
    pub fn is_delayed(&self) -> bool {
        match (self.actual_time, self.scheduled_time) {
            (Some(actual), Some(scheduled)) => actual > scheduled,
            _ => false,
        }
    }
}
