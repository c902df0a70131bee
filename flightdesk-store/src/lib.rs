pub mod app_config;
pub mod recorded;

pub use app_config::{Config, DeskConfig, DispatchConfig, RecordedSourceConfig, SourcesConfig};
pub use recorded::{RecordedSource, RecordedSourceError};

use flightdesk_core::{FetchError, FlightDataSource, SourceChain};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Recorded source error: {0}")]
    Recorded(#[from] RecordedSourceError),
    #[error("Source chain error: {0}")]
    Chain(#[from] FetchError),
}

/// Open every configured source, in fallback order, and wrap them in a chain
/// carrying the configured fetch policy.
pub fn build_chain(config: &Config, base_dir: &Path) -> Result<SourceChain, StoreError> {
    let mut sources: Vec<Arc<dyn FlightDataSource>> = Vec::new();
    for source in config.sources.in_order() {
        let recorded = RecordedSource::from_path(&source.name, &source.resolve_path(base_dir))?
            .with_latency(Duration::from_millis(source.latency_ms));
        sources.push(Arc::new(recorded));
    }
    Ok(SourceChain::new(sources)?.with_policy(config.dispatch.fetch_policy()))
}
