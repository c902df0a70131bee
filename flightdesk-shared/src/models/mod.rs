pub mod progress;
pub mod query;
pub mod status;
