use async_trait::async_trait;
use flightdesk_shared::{FlightQuery, SourceReport};

use crate::ErrorKind;

/// External flight tracker the engine can ask for a status.
///
/// Implementations own their transport, retries and rate limiting; the
/// engine only cares whether a report came back.
#[async_trait]
pub trait FlightDataSource: Send + Sync {
    /// Short label used in logs and shown to the operator (e.g. "flightview")
    fn name(&self) -> &str;

    /// Look up one flight
    async fn fetch(&self, query: &FlightQuery) -> Result<SourceReport, SourceError>;
}

/// Why a single source could not answer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Flight not found: {0}")]
    NotFound(String),

    #[error("Response could not be interpreted: {0}")]
    Parse(String),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Unavailable(_) => ErrorKind::SourceUnavailable,
            SourceError::NotFound(_) => ErrorKind::NotFound,
            SourceError::Parse(_) => ErrorKind::ParseError,
        }
    }
}
