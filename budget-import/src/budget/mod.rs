//! Budget import domain: rows, validation, header/line writes and the job pipeline

pub mod error;
pub mod headers;
pub mod jobs;
pub mod lines;
pub mod master_data;
pub mod models;
pub mod orchestrator;
pub mod sheet;
pub mod totals;
pub mod users;
pub mod validation;

pub use master_data::ReferenceDataCache;
pub use models::ImportStatus;
pub use orchestrator::ImportOrchestrator;
