use flightdesk_shared::{FlightQuery, FlightStatus, SourceRole};

use crate::fetch::FetchError;
use crate::ErrorKind;

/// Terminal answer for one submitted query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightResult {
    pub query: FlightQuery,
    pub outcome: Result<FlightStatus, FetchError>,
}

impl FlightResult {
    pub fn new(query: FlightQuery, outcome: Result<FlightStatus, FetchError>) -> Self {
        Self { query, outcome }
    }

    pub fn cancelled(query: FlightQuery) -> Self {
        Self::new(query, Err(FetchError::Cancelled))
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn status(&self) -> Option<&FlightStatus> {
        self.outcome.as_ref().ok()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.outcome.as_ref().err().map(FetchError::kind)
    }

    pub fn source_used(&self) -> Option<SourceRole> {
        self.status().map(|s| s.source_used)
    }

    /// Operator-facing one-liner explaining the outcome
    pub fn summary(&self) -> String {
        match &self.outcome {
            Ok(status) if status.source_used.is_primary() => {
                format!("{}: {}", self.query.flight_number, status.status_text)
            }
            Ok(status) => format!(
                "{}: {} (via {} source {})",
                self.query.flight_number, status.status_text, status.source_used, status.source_name
            ),
            Err(err) => format!("{}: {}", self.query.flight_number, err),
        }
    }
}
