#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use flightdesk_core::{FlightDataSource, SourceChain, SourceError};
use flightdesk_shared::{Direction, FlightQuery, SourceReport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

/// Test source with per-flight answers, optional latency and a peak-concurrency gauge
pub struct ScriptedSource {
    name: &'static str,
    failures: HashMap<String, SourceError>,
    default_failure: Option<SourceError>,
    panics_for: Option<String>,
    delays: HashMap<String, Duration>,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    started: Option<mpsc::UnboundedSender<String>>,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            failures: HashMap::new(),
            default_failure: None,
            panics_for: None,
            delays: HashMap::new(),
            delay: Duration::ZERO,
            gate: None,
            started: None,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_for(mut self, flight_number: &str, error: SourceError) -> Self {
        self.failures.insert(flight_number.to_string(), error);
        self
    }

    pub fn always_failing(mut self, error: SourceError) -> Self {
        self.default_failure = Some(error);
        self
    }

    pub fn panicking_for(mut self, flight_number: &str) -> Self {
        self.panics_for = Some(flight_number.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_delay_for(mut self, flight_number: &str, delay: Duration) -> Self {
        self.delays.insert(flight_number.to_string(), delay);
        self
    }

    /// Every fetch waits for a permit from `gate` before answering
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Report each fetch's flight number as soon as it starts
    pub fn reporting_starts(mut self, started: mpsc::UnboundedSender<String>) -> Self {
        self.started = Some(started);
        self
    }
}

#[async_trait]
impl FlightDataSource for ScriptedSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, query: &FlightQuery) -> Result<SourceReport, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        if let Some(started) = &self.started {
            let _ = started.send(query.flight_number.clone());
        }
        if let Some(gate) = &self.gate {
            // Permits are handed back so one release wakes every waiter eventually
            let _permit = gate.acquire().await;
        }
        let delay = self
            .delays
            .get(&query.flight_number)
            .copied()
            .unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.panics_for.as_deref() == Some(query.flight_number.as_str()) {
            panic!("{} choked on {}", self.name, query.flight_number);
        }
        if let Some(error) = self.failures.get(&query.flight_number) {
            return Err(error.clone());
        }
        if let Some(error) = &self.default_failure {
            return Err(error.clone());
        }
        Ok(landed(query))
    }
}

pub fn landed(query: &FlightQuery) -> SourceReport {
    SourceReport {
        scheduled_time: query.date.and_hms_opt(15, 30, 0),
        actual_time: query.date.and_hms_opt(15, 41, 0),
        status_text: "Landed".to_string(),
        ..Default::default()
    }
}

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 11).unwrap()
}

pub fn query(flight_number: &str, direction: Direction) -> FlightQuery {
    FlightQuery::new(flight_number, date(), direction)
}

pub fn arrivals(count: usize) -> Vec<FlightQuery> {
    (0..count)
        .map(|n| query(&format!("AA{}", 100 + n), Direction::Arrival))
        .collect()
}

pub fn single(primary: &Arc<ScriptedSource>) -> SourceChain {
    let sources: Vec<Arc<dyn FlightDataSource>> = vec![primary.clone()];
    SourceChain::new(sources).expect("at least one source")
}

pub fn pair(primary: &Arc<ScriptedSource>, secondary: &Arc<ScriptedSource>) -> SourceChain {
    let sources: Vec<Arc<dyn FlightDataSource>> = vec![primary.clone(), secondary.clone()];
    SourceChain::new(sources).expect("at least one source")
}
