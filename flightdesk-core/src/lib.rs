pub mod source;
pub mod fetch;
pub mod progress;
pub mod result;

pub use fetch::{FetchError, FetchPolicy, SourceChain, SourceFailure};
pub use progress::{ProgressError, ProgressSink, ProgressTracker, QueryState};
pub use result::FlightResult;
pub use source::{FlightDataSource, SourceError};

use serde::{Deserialize, Serialize};

/// Flat view of every failure the engine can report, for presentation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidConfiguration,
    SourceUnavailable,
    NotFound,
    ParseError,
    AllSourcesExhausted,
    Cancelled,
    RejectedByOperator,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::InvalidConfiguration => "invalid configuration",
            ErrorKind::SourceUnavailable => "source unavailable",
            ErrorKind::NotFound => "not found",
            ErrorKind::ParseError => "parse error",
            ErrorKind::AllSourcesExhausted => "all sources exhausted",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::RejectedByOperator => "rejected by operator",
        };
        f.write_str(label)
    }
}
