use chrono::{Datelike, Local, NaiveDate};
use flightdesk_shared::{Direction, FlightQuery};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

static FLIGHT_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{2,3}\d{1,4}$").unwrap());
static AIRPORT_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());
static HEADER_FLIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^JCSY:(\w+)$").unwrap());
static HEADER_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})([A-Za-z]{3})(\d{2})?$").unwrap());

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("Roster has no JCSY header line")]
    MissingHeader,
    #[error("Invalid JCSY header on line {row}: {reason}")]
    InvalidHeader { row: usize, reason: String },
}

/// Which way the roster's flights move relative to the home airport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterSettings {
    pub home_airport: String,
    pub list_type: Direction,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            home_airport: "LAX".to_string(),
            list_type: Direction::Arrival,
        }
    }
}

/// The `JCSY:` line: the controlling flight and the roster date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterHeader {
    pub row: usize,
    pub flight_number: String,
    pub date: NaiveDate,
}

/// One flight line and the query built from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// 1-based line number in the pasted text
    pub row: usize,
    pub line: String,
    pub query: FlightQuery,
}

impl RosterEntry {
    /// Flight token exactly as the operator typed it
    pub fn flight_token(&self) -> &str {
        self.line.split_whitespace().next().unwrap_or_default()
    }

    /// Counterpart airport, without its leading slash
    pub fn airport_token(&self) -> &str {
        self.line
            .split_whitespace()
            .nth(1)
            .map(|t| t.trim_start_matches('/'))
            .unwrap_or_default()
    }

    /// Whatever followed the airport on the original line
    pub fn trailing_tokens(&self) -> Vec<&str> {
        self.line.split_whitespace().skip(2).collect()
    }
}

/// A line that looked like a flight but could not be turned into a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub row: usize,
    pub line: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    pub header: RosterHeader,
    pub settings: RosterSettings,
    /// Every line of the input, in order
    pub lines: Vec<String>,
    pub entries: Vec<RosterEntry>,
    pub skipped: Vec<SkippedLine>,
}

impl Roster {
    pub fn queries(&self) -> Vec<FlightQuery> {
        self.entries.iter().map(|e| e.query.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a pasted roster, resolving year-less header dates against today
pub fn parse(text: &str, settings: &RosterSettings) -> Result<Roster, RosterError> {
    parse_with_today(text, settings, Local::now().date_naive())
}

pub fn parse_with_today(
    text: &str,
    settings: &RosterSettings,
    today: NaiveDate,
) -> Result<Roster, RosterError> {
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    let header = parse_header(&lines, today)?;
    debug!(
        "Roster header {} dated {} ({} list, home {})",
        header.flight_number, header.date, settings.list_type, settings.home_airport
    );

    let mut entries = Vec::new();
    let mut skipped = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        let row = index + 1;
        if is_structural(line) {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            continue;
        }

        match build_query(&tokens, header.date, settings) {
            Ok(query) => entries.push(RosterEntry {
                row,
                line: line.clone(),
                query,
            }),
            Err(reason) => {
                warn!("Skipping line {}: {} ({})", row, line, reason);
                skipped.push(SkippedLine {
                    row,
                    line: line.clone(),
                    reason,
                });
            }
        }
    }

    Ok(Roster {
        header,
        settings: settings.clone(),
        lines,
        entries,
        skipped,
    })
}

/// Header, column titles, comments and blank lines carry no flight
pub fn is_structural(line: &str) -> bool {
    line.starts_with("JCSY:") || line.starts_with("FLT/") || line.starts_with("##") || line.trim().is_empty()
}

/// `AM0782` becomes `AM782`: two-character carrier, digits without leading zeros
pub fn normalize_flight_number(token: &str) -> String {
    let split = token.char_indices().nth(2).map(|(i, _)| i).unwrap_or(token.len());
    let (airline, digits) = token.split_at(split);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        format!("{}0", airline)
    } else {
        format!("{}{}", airline, digits)
    }
}

fn build_query(tokens: &[&str], date: NaiveDate, settings: &RosterSettings) -> Result<FlightQuery, String> {
    let flight = tokens[0].trim();
    if !FLIGHT_TOKEN.is_match(flight) {
        return Err(format!("invalid flight number {:?}", flight));
    }
    let airport = tokens[1].trim().trim_start_matches('/');
    if !AIRPORT_TOKEN.is_match(airport) {
        return Err(format!("invalid airport {:?}", airport));
    }

    let home = settings.home_airport.as_str();
    let (origin, destination) = match settings.list_type {
        Direction::Arrival => (airport, home),
        Direction::Departure => (home, airport),
    };
    Ok(FlightQuery::new(normalize_flight_number(flight), date, settings.list_type).with_route(origin, destination))
}

fn parse_header(lines: &[String], today: NaiveDate) -> Result<RosterHeader, RosterError> {
    let (index, line) = lines
        .iter()
        .enumerate()
        .find(|(_, line)| line.starts_with("JCSY:"))
        .ok_or(RosterError::MissingHeader)?;
    let row = index + 1;
    let invalid = |reason: String| RosterError::InvalidHeader { row, reason };

    let mut parts = line.trim().split('/');
    let flight_part = parts.next().unwrap_or_default();
    let date_part = parts
        .next()
        .ok_or_else(|| invalid("expected JCSY:<FLT>/<DATE>".to_string()))?
        .trim();

    let flight = HEADER_FLIGHT
        .captures(flight_part)
        .and_then(|c| c.get(1))
        .ok_or_else(|| invalid(format!("bad flight {:?}", flight_part)))?;
    let date = parse_header_date(date_part, today).ok_or_else(|| invalid(format!("bad date {:?}", date_part)))?;

    Ok(RosterHeader {
        row,
        flight_number: normalize_flight_number(flight.as_str()),
        date,
    })
}

/// `11DEC24` or `11DEC`; a missing year is this year, or last year for a December
/// roster read in January
fn parse_header_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let captures = HEADER_DATE.captures(text)?;
    let day: u32 = captures[1].parse().ok()?;
    let month_name = captures[2].to_ascii_uppercase();
    let month = MONTHS.iter().position(|m| *m == month_name)? as u32 + 1;

    let year = match captures.get(3) {
        Some(yy) => {
            let yy: i32 = yy.as_str().parse().ok()?;
            if yy < 70 {
                2000 + yy
            } else {
                1900 + yy
            }
        }
        None if month == 12 && today.month() == 1 => today.year() - 1,
        None => today.year(),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}
