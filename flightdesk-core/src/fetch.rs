use flightdesk_shared::{FlightQuery, FlightStatus, SourceReport, SourceRole};
use futures_util::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::source::{FlightDataSource, SourceError};
use crate::ErrorKind;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Knobs applied to every source attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Upper bound for a single source call; expiry counts as unavailable
    pub fetch_timeout: Duration,
    /// Accept reports that carry no scheduled, estimated or actual time.
    /// When off, such reports fall through to the next source.
    pub accept_placeholder_status: bool,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            accept_placeholder_status: false,
        }
    }
}

/// One failed source attempt, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub role: SourceRole,
    pub error: SourceError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.role, self.source, self.error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("No flight data sources configured")]
    NoSources,

    #[error("All sources exhausted: {}", describe_failures(.failures))]
    AllSourcesExhausted { failures: Vec<SourceFailure> },

    #[error("Cancelled before the flight was resolved")]
    Cancelled,

    #[error("Rejected by operator")]
    RejectedByOperator,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::NoSources => ErrorKind::InvalidConfiguration,
            FetchError::AllSourcesExhausted { .. } => ErrorKind::AllSourcesExhausted,
            FetchError::Cancelled => ErrorKind::Cancelled,
            FetchError::RejectedByOperator => ErrorKind::RejectedByOperator,
        }
    }

    /// Per-source reasons, empty unless every source was tried
    pub fn failures(&self) -> &[SourceFailure] {
        match self {
            FetchError::AllSourcesExhausted { failures } => failures,
            _ => &[],
        }
    }
}

fn describe_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Priority-ordered list of sources plus the policy used to query them.
///
/// Cheap to clone; every worker of a batch shares the same chain.
#[derive(Clone)]
pub struct SourceChain {
    sources: Arc<[Arc<dyn FlightDataSource>]>,
    policy: FetchPolicy,
}

impl SourceChain {
    pub fn new(sources: Vec<Arc<dyn FlightDataSource>>) -> Result<Self, FetchError> {
        if sources.is_empty() {
            return Err(FetchError::NoSources);
        }
        Ok(Self {
            sources: sources.into(),
            policy: FetchPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Resolve a query by trying each source in order until one answers.
    ///
    /// Every kind of source failure moves on to the next source; a flight
    /// missing from one tracker may well exist on another.
    pub async fn resolve(&self, query: &FlightQuery) -> Result<FlightStatus, FetchError> {
        let mut failures = Vec::new();

        for (position, source) in self.sources.iter().enumerate() {
            let role = SourceRole::for_position(position);

            match self.attempt(source.as_ref(), query).await {
                Ok(report) => {
                    if !role.is_primary() {
                        info!(
                            "Resolved {} via {} source {} after {} failure(s)",
                            query,
                            role,
                            source.name(),
                            failures.len()
                        );
                    }
                    return Ok(FlightStatus::from_report(report, role, source.name()));
                }
                Err(error) => {
                    debug!("{} source {} failed for {}: {}", role, source.name(), query, error);
                    failures.push(SourceFailure {
                        source: source.name().to_string(),
                        role,
                        error,
                    });
                }
            }
        }

        warn!("Every source failed for {}: {}", query, describe_failures(&failures));
        Err(FetchError::AllSourcesExhausted { failures })
    }

    async fn attempt(
        &self,
        source: &dyn FlightDataSource,
        query: &FlightQuery,
    ) -> Result<SourceReport, SourceError> {
        // A panicking source is just another unavailable source
        let guarded = AssertUnwindSafe(source.fetch(query)).catch_unwind();
        let report = tokio::time::timeout(self.policy.fetch_timeout, guarded)
            .await
            .map_err(|_| {
                SourceError::Unavailable(format!(
                    "timed out after {}ms",
                    self.policy.fetch_timeout.as_millis()
                ))
            })?
            .map_err(|panic| {
                let reason = panic_message(panic.as_ref());
                error!("Source {} panicked on {}: {}", source.name(), query, reason);
                SourceError::Unavailable(format!("source panicked: {}", reason))
            })??;

        if report.is_placeholder() && !self.policy.accept_placeholder_status {
            return Err(SourceError::Parse(format!(
                "no scheduled, estimated or actual time (status: {:?})",
                report.status_text
            )));
        }

        Ok(report)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
