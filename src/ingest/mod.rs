pub mod payload;
pub mod service;

pub use payload::{IngestPayload, SensorValues};
pub use service::IngestService;
