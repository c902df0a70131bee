pub mod models;

pub use models::progress::ProgressSnapshot;
pub use models::query::{BatchId, Direction, FlightQuery, Route};
pub use models::status::{FlightStatus, SourceReport, SourceRole};
