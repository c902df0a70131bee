use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one submitted batch
pub type BatchId = Uuid;

/// Whether the flight is tracked on its way in to or out of the home airport
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[serde(alias = "arrival")]
    Arrival,
    #[serde(alias = "departure")]
    Departure,
}

impl Direction {
    pub fn short_code(self) -> &'static str {
        match self {
            Direction::Arrival => "ARR",
            Direction::Departure => "DEP",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Arrival => write!(f, "arrival"),
            Direction::Departure => write!(f, "departure"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Route {
    pub origin: String,
    pub destination: String,
}

/// Everything a source needs to locate one flight's status.
///
/// Queries are immutable once built; the engine only ever clones them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FlightQuery {
    pub flight_number: String,
    pub date: NaiveDate,
    pub direction: Direction,
    pub route: Option<Route>,
}

impl FlightQuery {
    pub fn new(flight_number: impl Into<String>, date: NaiveDate, direction: Direction) -> Self {
        Self {
            flight_number: flight_number.into(),
            date,
            direction,
            route: None,
        }
    }

    pub fn with_route(mut self, origin: impl Into<String>, destination: impl Into<String>) -> Self {
        self.route = Some(Route {
            origin: origin.into(),
            destination: destination.into(),
        });
        self
    }

    /// Two-letter carrier prefix (e.g. "CA" for "CA984")
    pub fn airline(&self) -> &str {
        let end = self
            .flight_number
            .char_indices()
            .nth(2)
            .map(|(i, _)| i)
            .unwrap_or(self.flight_number.len());
        &self.flight_number[..end]
    }

    /// Numeric part following the carrier prefix
    pub fn number(&self) -> &str {
        &self.flight_number[self.airline().len()..]
    }

    /// Stable lookup key, e.g. `CA984/2024-12-11/ARR`
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.flight_number,
            self.date.format("%Y-%m-%d"),
            self.direction.short_code()
        )
    }
}

impl fmt::Display for FlightQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.flight_number, self.date, self.direction)
    }
}
