//! Mapping from the domain error taxonomy to the OpenAI error envelope.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use mr_domain::error::Error;

/// Hint sent with 503 responses while the session store is unreachable.
const RETRY_AFTER_SECS: u64 = 5;

/// A user-visible API error in the OpenAI envelope shape
/// `{"error": {"message", "type", "code"}}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub error_type: &'static str,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error_type: "invalid_request_error",
            code: "invalid_request",
            message: message.into(),
        }
    }

    /// Translate a domain error into its user-visible shape.
    pub fn from_domain(e: &Error) -> Self {
        match e {
            Error::InvalidRequest(msg) => Self::invalid_request(msg.clone()),
            Error::ModelNotFound(model) => Self {
                status: StatusCode::BAD_REQUEST,
                error_type: "invalid_request_error",
                code: "model_not_found",
                message: format!("model \"{model}\" is not configured"),
            },
            Error::Provider {
                provider,
                status,
                message,
            } => Self {
                status: StatusCode::BAD_GATEWAY,
                error_type: "api_error",
                code: "provider_error",
                message: match status {
                    Some(s) => format!("provider {provider} returned HTTP {s}: {message}"),
                    None => format!("provider {provider}: {message}"),
                },
            },
            Error::Timeout(msg) => Self {
                status: StatusCode::GATEWAY_TIMEOUT,
                error_type: "timeout_error",
                code: "timeout",
                message: msg.clone(),
            },
            Error::Store(msg) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                error_type: "api_error",
                code: "service_unavailable",
                message: format!("session store unavailable: {msg}"),
            },
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error_type: "api_error",
                code: "internal_error",
                message: other.to_string(),
            },
        }
    }

    /// The JSON envelope, also used as a mid-stream `data:` error frame.
    pub fn envelope(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "message": self.message,
                "type": self.error_type,
                "code": self.code,
            }
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.envelope())).into_response();
        if self.status == StatusCode::SERVICE_UNAVAILABLE {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(RETRY_AFTER_SECS),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_not_found_maps_to_400_with_code() {
        let api = ApiError::from_domain(&Error::ModelNotFound("ghost/x".into()));
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.error_type, "invalid_request_error");
        assert_eq!(api.code, "model_not_found");
    }

    #[test]
    fn provider_error_carries_status_diagnostic() {
        let api = ApiError::from_domain(&Error::Provider {
            provider: "openai".into(),
            status: Some(500),
            message: "boom".into(),
        });
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert_eq!(api.code, "provider_error");
        assert!(api.message.contains("HTTP 500"));
    }

    #[test]
    fn timeout_maps_to_504() {
        let api = ApiError::from_domain(&Error::Timeout("slow".into()));
        assert_eq!(api.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(api.error_type, "timeout_error");
    }

    #[test]
    fn store_error_maps_to_503() {
        let api = ApiError::from_domain(&Error::Store("redis down".into()));
        assert_eq!(api.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api.code, "service_unavailable");
    }

    #[test]
    fn envelope_shape() {
        let v = ApiError::invalid_request("bad body").envelope();
        assert_eq!(v["error"]["type"], "invalid_request_error");
        assert_eq!(v["error"]["message"], "bad body");
        assert!(v["error"]["code"].is_string());
    }
}
