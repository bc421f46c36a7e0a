use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    db::models::{Channel, Reading},
    query::{Bucket, RangeToken, SeriesPoint, Source, StatusSnapshot},
};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeviceParams {
    /// Defaults to the configured device.
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoricalParams {
    /// One of `1h, 6h, 12h, 1d, 15d, 1mo, 3mo, all`; anything else means `1h`.
    pub range: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogParams {
    /// First day included (UTC), `YYYY-MM-DD`.
    pub start: Option<NaiveDate>,
    /// Last day included (UTC), `YYYY-MM-DD`.
    pub end: Option<NaiveDate>,
    /// 1-based.
    pub page: Option<u32>,
    /// Defaults to 100, capped at 1000.
    pub per_page: Option<u32>,
    pub device_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Response envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RealtimeResponse {
    pub status: String,
    pub data: Option<Reading>,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoricalResponse {
    pub status: String,
    pub data: Vec<Bucket>,
    /// The range actually served, after fallback.
    pub range: RangeToken,
    pub count: usize,
    pub source: Source,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChannelSeriesResponse {
    pub status: String,
    pub data: Vec<SeriesPoint>,
    pub sensor_type: Channel,
    pub range: RangeToken,
    pub count: usize,
    pub source: Source,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub data: StatusSnapshot,
    pub source: Source,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogPageResponse {
    pub status: String,
    pub data: Vec<Reading>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub source: Source,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    pub status: String,
    pub message: String,
    pub data: Reading,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    pub error: String,
    /// Accepted channel names, on an unknown-channel error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_types: Option<Vec<String>>,
}
