use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{DispatchError, DispatchResult};

/// Largest worker pool a batch may ask for
pub const MAX_CONCURRENCY: usize = 5;

/// How results reach the operator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Every successful result waits for an accept/reject decision, in submission order
    Sequential,
    /// Results are accepted automatically as soon as they complete
    Parallel,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Sequential => write!(f, "sequential"),
            DispatchMode::Parallel => write!(f, "parallel"),
        }
    }
}

impl FromStr for DispatchMode {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "manual" => Ok(DispatchMode::Sequential),
            "parallel" | "auto" => Ok(DispatchMode::Parallel),
            other => Err(DispatchError::InvalidConfiguration(format!(
                "unknown dispatch mode '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub concurrency_limit: usize,
    pub mode: DispatchMode,
}

impl BatchOptions {
    /// Manual review with a single worker
    pub fn sequential() -> Self {
        Self {
            concurrency_limit: 1,
            mode: DispatchMode::Sequential,
        }
    }

    pub fn parallel(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit,
            mode: DispatchMode::Parallel,
        }
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency_limit) {
            return Err(DispatchError::InvalidConfiguration(format!(
                "concurrency limit must be between 1 and {}, got {}",
                MAX_CONCURRENCY, self.concurrency_limit
            )));
        }
        Ok(())
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::parallel(MAX_CONCURRENCY)
    }
}
