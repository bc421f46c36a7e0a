use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use utoipa::OpenApi;

use super::{
    dto::{
        ChannelSeriesResponse, DeviceParams, ErrorResponse, HistoricalParams, HistoricalResponse,
        IngestResponse, LogPageResponse, LogParams, RealtimeResponse, StatusResponse,
    },
    errors::AppError,
    AppState,
};
use crate::{
    db::models::{Channel, Channels, Reading},
    error::IngestError,
    ingest::{IngestPayload, SensorValues},
    query::{
        status::{DatabaseStatus, HealthLevel, PerformanceStatus, SensorStatus},
        Bucket, BucketKey, LogFilter, RangeToken, SeriesPoint, Source, StatusSnapshot,
    },
};

// ---------------------------------------------------------------------------
// Read endpoints
// ---------------------------------------------------------------------------

/// Most recent reading of a device, preferring one from the last few minutes.
#[utoipa::path(
    get,
    path = "/sensor-data/realtime",
    params(DeviceParams),
    responses(
        (status = 200, description = "Latest reading, or null when none exists", body = RealtimeResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    ),
    tag = "sensor-data"
)]
pub async fn get_realtime(
    State(state): State<AppState>,
    Query(params): Query<DeviceParams>,
) -> Result<Json<RealtimeResponse>, AppError> {
    let device_id = params
        .device_id
        .as_deref()
        .unwrap_or(state.query.default_device_id());
    let (data, source) = state.query.get_latest(device_id).await?;

    let message = data
        .is_none()
        .then(|| "No sensor data available".to_owned());
    Ok(Json(RealtimeResponse {
        status: "success".to_owned(),
        data,
        source,
        message,
    }))
}

/// Bucketed series for a named range. Unknown ranges fall back to `1h`.
#[utoipa::path(
    get,
    path = "/sensor-data/historical",
    params(HistoricalParams),
    responses(
        (status = 200, description = "Ascending buckets for the range", body = HistoricalResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    ),
    tag = "sensor-data"
)]
pub async fn get_historical(
    State(state): State<AppState>,
    Query(params): Query<HistoricalParams>,
) -> Result<Json<HistoricalResponse>, AppError> {
    let range = RangeToken::parse_or_default(params.range.as_deref().unwrap_or_default());
    let device_id = params
        .device_id
        .as_deref()
        .unwrap_or(state.query.default_device_id());
    let (buckets, source) = state.query.get_historical(range, device_id).await?;

    Ok(Json(HistoricalResponse {
        status: "success".to_owned(),
        count: buckets.len(),
        data: (*buckets).clone(),
        range,
        source,
    }))
}

/// One channel's bucket means over a named range. Buckets without a value
/// for the channel are omitted.
#[utoipa::path(
    get,
    path = "/sensor-data/{channel}",
    params(
        ("channel" = String, Path, description = "current_in, current_out, voltage_in, voltage_out, temperature or battery_percentage"),
        HistoricalParams,
    ),
    responses(
        (status = 200, description = "Ascending points for the channel", body = ChannelSeriesResponse),
        (status = 400, description = "Unknown channel; the body lists valid ones", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    ),
    tag = "sensor-data"
)]
pub async fn get_channel_series(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Query(params): Query<HistoricalParams>,
) -> Result<Json<ChannelSeriesResponse>, AppError> {
    let channel: Channel = channel.parse()?;
    let range = RangeToken::parse_or_default(params.range.as_deref().unwrap_or_default());
    let device_id = params
        .device_id
        .as_deref()
        .unwrap_or(state.query.default_device_id());
    let (points, source) = state
        .query
        .get_channel_series(channel, range, device_id)
        .await?;

    Ok(Json(ChannelSeriesResponse {
        status: "success".to_owned(),
        count: points.len(),
        data: (*points).clone(),
        sensor_type: channel,
        range,
        source,
    }))
}

/// Paginated raw readings, newest first.
#[utoipa::path(
    get,
    path = "/sensor-data/logs",
    params(LogParams),
    responses(
        (status = 200, description = "One page of readings", body = LogPageResponse),
        (status = 400, description = "Malformed date or paging parameter"),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    ),
    tag = "sensor-data"
)]
pub async fn get_logs(
    State(state): State<AppState>,
    Query(params): Query<LogParams>,
) -> Result<Json<LogPageResponse>, AppError> {
    let device_id = params
        .device_id
        .unwrap_or_else(|| state.query.default_device_id().to_owned());
    let filter = LogFilter::new(device_id, params.start, params.end, params.page, params.per_page);
    let (page, source) = state.query.get_log_page(&filter).await?;

    Ok(Json(LogPageResponse {
        status: "success".to_owned(),
        data: page.data.clone(),
        total: page.total,
        page: filter.page,
        per_page: filter.per_page,
        start_date: filter.start_date,
        end_date: filter.end_date,
        source,
    }))
}

/// Store, sensor and process health.
#[utoipa::path(
    get,
    path = "/system/status",
    responses(
        (status = 200, description = "Status snapshot", body = StatusResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    ),
    tag = "system"
)]
pub async fn get_system_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, AppError> {
    let (snapshot, source) = state.query.get_status().await?;
    Ok(Json(StatusResponse {
        status: "success".to_owned(),
        data: (*snapshot).clone(),
        source,
    }))
}

// ---------------------------------------------------------------------------
// Write endpoints
// ---------------------------------------------------------------------------

/// Store one reading given in direct form.
#[utoipa::path(
    post,
    path = "/sensor-data",
    request_body = IngestPayload,
    responses(
        (status = 201, description = "Reading stored", body = IngestResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    ),
    tag = "ingest"
)]
pub async fn post_sensor_data(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let payload: IngestPayload = serde_json::from_value(body).map_err(IngestError::from)?;
    let reading = state.ingest.ingest(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            status: "success".to_owned(),
            message: "Sensor data stored successfully".to_owned(),
            data: reading,
        }),
    ))
}

/// Bridge webhook. Accepts the direct form, an oneM2M notification, or a
/// `content` wrapper.
#[utoipa::path(
    post,
    path = "/webhook/antares",
    request_body(
        content = IngestPayload,
        description = "Direct form shown; oneM2M `m2m:sgn` and `content` envelopes are also accepted"
    ),
    responses(
        (status = 200, description = "Webhook processed", body = IngestResponse),
        (status = 400, description = "Unrecognised payload", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    ),
    tag = "ingest"
)]
pub async fn antares_webhook(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<IngestResponse>, AppError> {
    let reading = state.ingest.ingest_envelope(body).await?;
    Ok(Json(IngestResponse {
        status: "success".to_owned(),
        message: "Webhook processed successfully".to_owned(),
        data: reading,
    }))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        get_realtime,
        get_historical,
        get_channel_series,
        get_logs,
        get_system_status,
        post_sensor_data,
        antares_webhook,
        health
    ),
    components(schemas(
        Reading,
        Channels,
        Channel,
        Bucket,
        SeriesPoint,
        BucketKey,
        RangeToken,
        Source,
        StatusSnapshot,
        DatabaseStatus,
        SensorStatus,
        PerformanceStatus,
        HealthLevel,
        IngestPayload,
        SensorValues,
        RealtimeResponse,
        HistoricalResponse,
        ChannelSeriesResponse,
        LogPageResponse,
        StatusResponse,
        IngestResponse,
        ErrorResponse
    )),
    tags(
        (name = "sensor-data", description = "Real-time, historical and log views"),
        (name = "ingest", description = "Reading ingestion"),
        (name = "system", description = "System endpoints"),
    ),
    info(
        title = "Sensor Telemetry API",
        version = "0.1.0",
        description = "REST API for sensor telemetry readings"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};

    use crate::{
        api::{router, AppState},
        cache::{InvalidationPolicy, MemoryCache},
        clock::FixedClock,
        query::QuerySettings,
        store::{testing::DownStore, MemoryReadingStore, ReadingStore},
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 19, 11, 5, 0).unwrap()
    }

    fn test_server_with(store: Arc<dyn ReadingStore>) -> TestServer {
        let state = AppState::new(
            store,
            Arc::new(MemoryCache::new()),
            Arc::new(FixedClock::new(now())),
            InvalidationPolicy::Ttl,
            QuerySettings::default(),
        );
        TestServer::new(router(state)).unwrap()
    }

    fn test_server() -> TestServer {
        test_server_with(Arc::new(MemoryReadingStore::new()))
    }

    async fn post_reading(server: &TestServer, timestamp: &str, temperature: f64) {
        server
            .post("/sensor-data")
            .json(&json!({
                "sensors": { "temperature": temperature, "voltage_in": 230.1234 },
                "timestamp": timestamp
            }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    // -----------------------------------------------------------------------
    // GET /sensor-data/realtime
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn realtime_empty_returns_null_with_message() {
        let server = test_server();
        let resp = server.get("/sensor-data/realtime").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert!(body["data"].is_null());
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "No sensor data available");
    }

    #[tokio::test]
    async fn realtime_reflects_each_new_write() {
        let server = test_server();
        post_reading(&server, "2025-07-19 11:00:00", 20.0).await;

        let body: Value = server.get("/sensor-data/realtime").await.json();
        assert_eq!(body["data"]["temperature"], 20.0);
        assert_eq!(body["source"], "database");

        let body: Value = server.get("/sensor-data/realtime").await.json();
        assert_eq!(body["source"], "cache");

        post_reading(&server, "2025-07-19 11:04:00", 21.0).await;
        let body: Value = server.get("/sensor-data/realtime").await.json();
        assert_eq!(body["data"]["temperature"], 21.0);
        assert_eq!(body["data"]["device_id"], "NANO_001");
    }

    // -----------------------------------------------------------------------
    // GET /sensor-data/historical
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn historical_one_hour_returns_raw_points() {
        let server = test_server();
        post_reading(&server, "2025-07-19 10:00:00", 20.0).await;
        post_reading(&server, "2025-07-19 10:30:00", 22.0).await;
        post_reading(&server, "2025-07-19 11:00:00", 24.0).await;

        let resp = server.get("/sensor-data/historical").add_query_param("range", "1h").await;
        resp.assert_status_ok();
        let body: Value = resp.json();

        assert_eq!(body["range"], "1h");
        assert_eq!(body["count"], 3);
        let temps: Vec<f64> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["temperature"].as_f64().unwrap())
            .collect();
        assert_eq!(temps, vec![20.0, 22.0, 24.0]);
        // Electrical channels keep three decimals.
        assert_eq!(body["data"][0]["voltage_in"], 230.123);
    }

    #[tokio::test]
    async fn historical_unknown_range_falls_back_to_one_hour() {
        let server = test_server();
        let resp = server
            .get("/sensor-data/historical")
            .add_query_param("range", "fortnight")
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["range"], "1h");
    }

    #[tokio::test]
    async fn historical_all_on_empty_store_is_empty() {
        let server = test_server();
        let body: Value = server
            .get("/sensor-data/historical")
            .add_query_param("range", "all")
            .await
            .json();
        assert_eq!(body["data"], json!([]));
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn historical_all_buckets_carry_week_labels() {
        let server = test_server();
        post_reading(&server, "2025-07-02 08:00:00", 20.0).await;

        let body: Value = server
            .get("/sensor-data/historical")
            .add_query_param("range", "all")
            .await
            .json();
        assert_eq!(body["data"][0]["time_group"], "2025-06-30");
        assert_eq!(body["data"][0]["week_label"], "2025-W27");
    }

    // -----------------------------------------------------------------------
    // GET /sensor-data/{channel}
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn channel_series_returns_one_channel() {
        let server = test_server();
        post_reading(&server, "2025-07-19 10:00:00", 20.0).await;
        post_reading(&server, "2025-07-19 10:30:00", 22.0).await;

        let resp = server
            .get("/sensor-data/temperature")
            .add_query_param("range", "1h")
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["sensor_type"], "temperature");
        assert_eq!(body["range"], "1h");
        assert_eq!(body["count"], 2);
        assert_eq!(body["data"][1]["value"], 22.0);
        assert_eq!(body["source"], "database");

        let body: Value = server
            .get("/sensor-data/temperature")
            .add_query_param("range", "1h")
            .await
            .json();
        assert_eq!(body["source"], "cache");
    }

    #[tokio::test]
    async fn channel_series_rejects_unknown_channel() {
        let server = test_server();
        let resp = server.get("/sensor-data/lux").await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Invalid sensor type");
        let valid = body["valid_types"].as_array().unwrap();
        assert_eq!(valid.len(), 6);
        assert!(valid.contains(&json!("battery_percentage")));
    }

    #[tokio::test]
    async fn fixed_routes_win_over_channel_route() {
        let server = test_server();
        let body: Value = server.get("/sensor-data/realtime").await.json();
        assert!(body.get("sensor_type").is_none());
        assert_eq!(body["status"], "success");
    }

    // -----------------------------------------------------------------------
    // GET /sensor-data/logs
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn logs_are_paginated_newest_first() {
        let server = test_server();
        post_reading(&server, "2025-07-18 09:00:00", 1.0).await;
        post_reading(&server, "2025-07-19 09:00:00", 2.0).await;
        post_reading(&server, "2025-07-19 10:00:00", 3.0).await;

        let resp = server
            .get("/sensor-data/logs")
            .add_query_param("start", "2025-07-19")
            .add_query_param("per_page", "1")
            .add_query_param("page", "2")
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();

        assert_eq!(body["total"], 2);
        assert_eq!(body["page"], 2);
        assert_eq!(body["per_page"], 1);
        assert_eq!(body["start_date"], "2025-07-19");
        assert_eq!(body["data"][0]["temperature"], 2.0);
    }

    #[tokio::test]
    async fn logs_reject_malformed_dates() {
        let server = test_server();
        let resp = server
            .get("/sensor-data/logs")
            .add_query_param("start", "19/07/2025")
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    // -----------------------------------------------------------------------
    // Ingest
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn post_without_sensors_is_bad_request() {
        let server = test_server();
        let resp = server
            .post("/sensor-data")
            .json(&json!({ "device_id": "NANO_001" }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert_eq!(body["status"], "error");
        assert!(body["error"].as_str().unwrap().contains("invalid payload"));
    }

    #[tokio::test]
    async fn webhook_accepts_m2m_notification() {
        let server = test_server();
        let con = json!({
            "device_id": "NANO_009",
            "sensors": { "current_in": 1.5 },
            "timestamp": "2025-07-19T11:00:00Z"
        })
        .to_string();
        let resp = server
            .post("/webhook/antares")
            .json(&json!({
                "m2m:sgn": { "m2m:nev": { "m2m:rep": { "m2m:cin": { "con": con } } } }
            }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["data"]["device_id"], "NANO_009");
        assert_eq!(body["data"]["current_in"], 1.5);
        assert_eq!(body["data"]["temperature"], 0.0);

        let latest: Value = server
            .get("/sensor-data/realtime")
            .add_query_param("device_id", "NANO_009")
            .await
            .json();
        assert_eq!(latest["data"]["current_in"], 1.5);
    }

    #[tokio::test]
    async fn webhook_rejects_unknown_format() {
        let server = test_server();
        let resp = server.post("/webhook/antares").json(&json!({ "ping": true })).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    // -----------------------------------------------------------------------
    // GET /system/status
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn status_reports_database_and_sensor_health() {
        let server = test_server();
        post_reading(&server, "2025-07-19 11:03:00", 20.0).await;

        let resp = server.get("/system/status").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["data"]["sensors"]["status"], "connected");
        assert_eq!(body["data"]["sensors"]["minutes_since_last"], 2);
        assert_eq!(body["data"]["performance"]["total_data_points"], 1);
        assert_eq!(body["source"], "database");
    }

    // -----------------------------------------------------------------------
    // Store outage
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn store_outage_is_service_unavailable() {
        let server = test_server_with(Arc::new(DownStore));

        let resp = server.get("/sensor-data/historical").add_query_param("range", "1d").await;
        resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = resp.json();
        assert_eq!(body["status"], "error");
        assert!(body["message"].is_string());

        server
            .post("/sensor-data")
            .json(&json!({ "sensors": {} }))
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);

        // The status endpoint reports the outage instead of failing.
        let body: Value = server.get("/system/status").await.json();
        assert_eq!(body["data"]["database"]["status"], "error");
    }

    // -----------------------------------------------------------------------
    // GET /health, GET /api-docs/openapi.json
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_returns_ok() {
        let server = test_server();
        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn openapi_spec_is_served() {
        let server = test_server();
        let resp = server.get("/api-docs/openapi.json").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["info"]["title"], "Sensor Telemetry API");
        assert!(body["paths"]["/sensor-data/historical"].is_object());
    }
}
