//! Service-level error kinds and their HTTP envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::forecast;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fewer than 23 h of PWS samples, an incomplete yesterday bucket, or a
    /// composition where neither source produced anything usable.
    #[error("insufficient weather data: {0}")]
    InsufficientData(String),

    /// The requested forecast-provider tag has no registered adapter.
    #[error("unknown forecast provider '{0}'")]
    InvalidProvider(String),

    /// An adapter failure that reached the caller undegraded.
    #[error(transparent)]
    Upstream(#[from] forecast::Error),

    /// Startup-time misconfiguration, e.g. an inaccessible persistence dir.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InsufficientData(_) => "insufficient_data",
            Error::InvalidProvider(_) => "invalid_provider",
            Error::Upstream(forecast::Error::MissingField(_)) => "missing_field",
            Error::Upstream(_) => "upstream_transient",
            Error::Configuration(_) => "configuration_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::InsufficientData(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidProvider(_) => StatusCode::BAD_REQUEST,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error envelope returned by every API route.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
