pub mod options;
pub mod events;
pub mod engine;
pub mod handle;

pub use engine::QueryDispatchEngine;
pub use events::{BatchEvent, BatchSummary, Delivery, Disposition, ReviewDecision, ReviewRequest};
pub use handle::{BatchEvents, BatchHandle, BatchOutcome};
pub use options::{BatchOptions, DispatchMode, MAX_CONCURRENCY};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl DispatchError {
    pub fn kind(&self) -> flightdesk_core::ErrorKind {
        match self {
            DispatchError::InvalidConfiguration(_) => flightdesk_core::ErrorKind::InvalidConfiguration,
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
