use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::dto::ErrorResponse;
use crate::{
    db::models::{Channel, InvalidChannel},
    error::{IngestError, StoreError},
};

#[derive(Debug)]
pub enum AppError {
    Store(StoreError),
    Ingest(IngestError),
    UnknownChannel(InvalidChannel),
    Internal(anyhow::Error),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Store(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Sensor data store unavailable",
                e.to_string(),
            ),
            AppError::Ingest(IngestError::Store(e)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Sensor data store unavailable",
                e.to_string(),
            ),
            AppError::Ingest(e) => (
                StatusCode::BAD_REQUEST,
                "Invalid sensor data payload",
                e.to_string(),
            ),
            AppError::UnknownChannel(e) => {
                (StatusCode::BAD_REQUEST, "Invalid sensor type", e.to_string())
            }
            AppError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                e.to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, error) = self.parts();
        let valid_types = matches!(self, AppError::UnknownChannel(_))
            .then(|| Channel::ALL.iter().map(|c| c.as_str().to_owned()).collect());
        if status.is_server_error() {
            tracing::error!(status = %status, error = %error, "{message}");
        } else {
            tracing::warn!(status = %status, error = %error, "{message}");
        }
        let body = Json(ErrorResponse {
            status: "error".to_owned(),
            message: message.to_owned(),
            error,
            valid_types,
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        Self::Ingest(e)
    }
}

impl From<InvalidChannel> for AppError {
    fn from(e: InvalidChannel) -> Self {
        Self::UnknownChannel(e)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}
