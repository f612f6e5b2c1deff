//! Shared HTTP plumbing: the error contract, health route, and small
//! request helpers.
//!
//! Every error response is a JSON object with a machine `error` code and an
//! optional human `message`. Downstream status codes are echoed under
//! `statusCode`; freeze rejections carry the full `freezeState` snapshot.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// A JSON API error with the DGC machine-code contract.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: Option<String>,
    downstream_status: Option<u16>,
    freeze_state: Option<Value>,
}

impl ApiError {
    /// Builds an error with a status and machine code.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: None,
            downstream_status: None,
            freeze_state: None,
        }
    }

    /// Attaches a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Echoes a downstream HTTP status under `statusCode`.
    #[must_use]
    pub const fn with_downstream_status(mut self, status: u16) -> Self {
        self.downstream_status = Some(status);
        self
    }

    /// Attaches a freeze-state snapshot (423 responses).
    #[must_use]
    pub fn with_freeze_state(mut self, freeze_state: Value) -> Self {
        self.freeze_state = Some(freeze_state);
        self
    }

    /// 400 with the given code.
    #[must_use]
    pub fn bad_request(code: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code)
    }

    /// 400 `invalid_request` with the parse failure as message.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::bad_request("invalid_request").with_message(message)
    }

    /// 404 with the given code.
    #[must_use]
    pub fn not_found(code: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code)
    }

    /// 409 with the given code.
    #[must_use]
    pub fn conflict(code: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code)
    }

    /// 502 with the given code.
    #[must_use]
    pub fn bad_gateway(code: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, code)
    }

    /// 503 with the given code.
    #[must_use]
    pub fn unavailable(code: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, code)
    }

    /// 500 `internal_error` wrapping a store or serialization failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error").with_message(message)
    }

    /// The machine code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.code });
        if let Some(message) = self.message {
            body["message"] = Value::String(message);
        }
        if let Some(status) = self.downstream_status {
            body["statusCode"] = Value::from(status);
        }
        if let Some(freeze_state) = self.freeze_state {
            body["freezeState"] = freeze_state;
        }
        (self.status, Json(body)).into_response()
    }
}

/// Decodes a typed request from an already-parsed JSON body, mapping
/// failures to 400 `invalid_request`.
///
/// Handlers take `Json<Value>` so the parsed body is also available for
/// idempotency hashing; this converts it to the typed request.
///
/// # Errors
///
/// Returns 400 `invalid_request` when the body does not match the schema.
pub fn decode_body<T: DeserializeOwned>(body: &Value) -> Result<T, ApiError> {
    serde_json::from_value(body.clone()).map_err(|e| ApiError::invalid_request(e.to_string()))
}

/// Current time as RFC 3339 UTC with millisecond precision.
#[must_use]
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Fresh prefixed identifier, e.g. `LST-5f6a...`.
#[must_use]
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

/// Parses a `limit` query value with a default and hard cap.
///
/// # Errors
///
/// Returns 400 `invalid_query` when the value is present but not a positive
/// integer.
pub fn parse_limit(raw: Option<&str>, default: usize, cap: usize) -> Result<usize, ApiError> {
    match raw {
        None => Ok(default.min(cap)),
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(|n| n.min(cap))
            .ok_or_else(|| {
                ApiError::bad_request("invalid_query")
                    .with_message(format!("limit '{raw}' is not a positive integer"))
            }),
    }
}

/// Health payload shared by all services.
#[must_use]
pub fn health_body(service: &'static str) -> Value {
    json!({ "status": "ok", "service": service, "time": now_iso() })
}
