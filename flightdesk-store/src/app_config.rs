use flightdesk_core::FetchPolicy;
use flightdesk_dispatch::{BatchOptions, DispatchMode};
use flightdesk_shared::Direction;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub desk: DeskConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeskConfig {
    #[serde(default = "default_home_airport")]
    pub home_airport: String,
    #[serde(default = "default_list_type")]
    pub list_type: Direction,
}

fn default_home_airport() -> String { "LAX".to_string() }
fn default_list_type() -> Direction { Direction::Arrival }

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            home_airport: default_home_airport(),
            list_type: default_list_type(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_mode")]
    pub mode: DispatchMode,
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
    #[serde(default)]
    pub accept_placeholder_status: bool,
}

fn default_mode() -> DispatchMode { DispatchMode::Parallel }
fn default_concurrency_limit() -> usize { flightdesk_dispatch::MAX_CONCURRENCY }
fn default_fetch_timeout_seconds() -> u64 { 15 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            concurrency_limit: default_concurrency_limit(),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
            accept_placeholder_status: false,
        }
    }
}

impl DispatchConfig {
    /// Sequential batches always run a single worker
    pub fn batch_options(&self) -> BatchOptions {
        match self.mode {
            DispatchMode::Sequential => BatchOptions::sequential(),
            DispatchMode::Parallel => BatchOptions::parallel(self.concurrency_limit),
        }
    }

    /// A zero timeout would fail every source before it could answer
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.fetch_timeout_seconds == 0 {
            return Err(config::ConfigError::Message(
                "dispatch.fetch_timeout_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            fetch_timeout: Duration::from_secs(self.fetch_timeout_seconds),
            accept_placeholder_status: self.accept_placeholder_status,
        }
    }
}

/// Sources in fallback order: primary, secondary, then any extras
#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    pub primary: RecordedSourceConfig,
    pub secondary: Option<RecordedSourceConfig>,
    #[serde(default)]
    pub additional: Vec<RecordedSourceConfig>,
}

impl SourcesConfig {
    pub fn in_order(&self) -> impl Iterator<Item = &RecordedSourceConfig> {
        std::iter::once(&self.primary)
            .chain(self.secondary.iter())
            .chain(self.additional.iter())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordedSourceConfig {
    pub name: String,
    /// Relative paths are resolved against the config directory
    pub fixture_path: PathBuf,
    /// Simulated lookup latency
    #[serde(default)]
    pub latency_ms: u64,
}

impl RecordedSourceConfig {
    pub fn resolve_path(&self, base_dir: &Path) -> PathBuf {
        if self.fixture_path.is_absolute() {
            self.fixture_path.clone()
        } else {
            base_dir.join(&self.fixture_path)
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(Path::new("config"))
    }

    pub fn load_from(dir: &Path) -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::from(dir.join("default")))
            // Per-environment overrides, optional
            .add_source(config::File::from(dir.join(&run_mode)).required(false))
            // Operator's own overrides; not checked in
            .add_source(config::File::from(dir.join("local")).required(false))
            // Eg. `FLIGHTDESK__DISPATCH__MODE=sequential`
            .add_source(config::Environment::with_prefix("FLIGHTDESK").separator("__"))
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.dispatch.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, config::ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.dispatch.validate()?;
        Ok(config)
    }
}
