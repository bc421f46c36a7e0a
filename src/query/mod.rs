//! Read path: range resolution, bucketed aggregation and the cached
//! query service built on top of them.

pub mod aggregate;
pub mod bucket;
pub mod logs;
pub mod range;
pub mod series;
pub mod service;
pub mod status;

pub use aggregate::Aggregator;
pub use bucket::{Bucket, BucketKey};
pub use logs::{LogFilter, LogPage};
pub use range::{resolve, RangeSpec, RangeToken};
pub use series::SeriesPoint;
pub use service::{QuerySettings, SensorQueryService, Source};
pub use status::{HealthLevel, StatusSnapshot};
