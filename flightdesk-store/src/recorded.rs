use async_trait::async_trait;
use flightdesk_core::{FlightDataSource, SourceError};
use flightdesk_shared::{FlightQuery, SourceReport};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum RecordedSourceError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid recording: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum FailureKind {
    Unavailable,
    NotFound,
    Parse,
}

/// A recorded failure; any entry with an `error` key must parse as one
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordedFailure {
    error: FailureKind,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
enum Recorded {
    Failure(RecordedFailure),
    Report(SourceReport),
}

impl Recorded {
    fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.get("error").is_some() {
            serde_json::from_value(value).map(Recorded::Failure)
        } else {
            serde_json::from_value(value).map(Recorded::Report)
        }
    }
}

/// Flight data source answering from a JSON recording keyed by `FlightQuery::key()`.
///
/// ```json
/// {
///   "CA984/2024-12-11/ARR": { "scheduled_time": "2024-12-11T15:30:00", "status_text": "Landed" },
///   "AM782/2024-12-11/ARR": { "error": "unavailable", "message": "502 Bad Gateway" }
/// }
/// ```
pub struct RecordedSource {
    name: String,
    answers: HashMap<String, Recorded>,
    latency: Duration,
}

impl RecordedSource {
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self, RecordedSourceError> {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let answers = raw
            .into_iter()
            .map(|(key, value)| Ok((key, Recorded::from_value(value)?)))
            .collect::<Result<HashMap<_, _>, serde_json::Error>>()?;
        Ok(Self {
            name: name.into(),
            answers,
            latency: Duration::ZERO,
        })
    }

    pub fn from_path(name: impl Into<String>, path: &Path) -> Result<Self, RecordedSourceError> {
        let json = std::fs::read_to_string(path).map_err(|source| RecordedSourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source = Self::from_json(name, &json)?;
        info!("Loaded {} recorded answers for {} from {}", source.len(), source.name, path.display());
        Ok(source)
    }

    /// Sleep this long before every answer
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

#[async_trait]
impl FlightDataSource for RecordedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, query: &FlightQuery) -> Result<SourceReport, SourceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let key = query.key();
        debug!("{} looking up {}", self.name, key);
        match self.answers.get(&key) {
            Some(Recorded::Report(report)) => Ok(report.clone()),
            Some(Recorded::Failure(failure)) => {
                let message = failure.message.clone();
                Err(match failure.error {
                    FailureKind::Unavailable => SourceError::Unavailable(message),
                    FailureKind::NotFound => SourceError::NotFound(message),
                    FailureKind::Parse => SourceError::Parse(message),
                })
            }
            None => Err(SourceError::NotFound(format!("no recorded status for {}", key))),
        }
    }
}
