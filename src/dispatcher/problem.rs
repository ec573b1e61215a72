//! Caller-facing error bodies (`application/problem+json`).

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

const TYPE_BAD_REQUEST: &str = "https://tools.ietf.org/html/rfc7231#section-6.5.1";
const TYPE_METHOD_NOT_ALLOWED: &str = "https://tools.ietf.org/html/rfc7231#section-6.5.5";
const TYPE_PAYLOAD_TOO_LARGE: &str = "https://tools.ietf.org/html/rfc7231#section-6.5.11";
const TYPE_UNSUPPORTED_MEDIA_TYPE: &str = "https://tools.ietf.org/html/rfc7231#section-6.5.13";
const TYPE_INTERNAL: &str = "https://tools.ietf.org/html/rfc7231#section-6.6.1";
const TYPE_TOO_MANY_REQUESTS: &str = "https://tools.ietf.org/html/rfc6585#section-4";

/// A problem document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_uri: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl ProblemDetails {
    fn new(type_uri: &str, title: &str, status: u16, detail: impl Into<String>) -> Self {
        Self {
            type_uri: type_uri.to_string(),
            title: title.to_string(),
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(TYPE_BAD_REQUEST, "Bad Request", 400, detail)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(
            TYPE_METHOD_NOT_ALLOWED,
            "Method Not Allowed",
            405,
            "Only POST method is allowed",
        )
    }

    pub fn unsupported_media_type() -> Self {
        Self::new(
            TYPE_UNSUPPORTED_MEDIA_TYPE,
            "Unsupported Media Type",
            415,
            "Content-Type must be application/json",
        )
    }

    pub fn payload_too_large(max: usize) -> Self {
        Self::new(
            TYPE_PAYLOAD_TOO_LARGE,
            "Request Entity Too Large",
            413,
            format!("Request body too large (max {max} bytes)"),
        )
    }

    pub fn too_many_requests(detail: impl Into<String>) -> Self {
        Self::new(TYPE_TOO_MANY_REQUESTS, "Too Many Requests", 429, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(TYPE_INTERNAL, "Internal Server Error", 500, detail)
    }

    /// Classifies a worker status: 429 overload, other 4xx bad request,
    /// everything else internal. The worker's status code is kept.
    pub fn from_worker_status(status: u16, detail: impl Into<String>) -> Self {
        match status {
            429 => Self::too_many_requests(detail),
            400..=499 => Self::new(TYPE_BAD_REQUEST, "Bad Request", status, detail),
            _ => Self::new(TYPE_INTERNAL, "Internal Server Error", status, detail),
        }
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_vec(&self).unwrap_or_default();
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_statuses_are_classified() {
        let p = ProblemDetails::from_worker_status(429, "queue full");
        assert_eq!((p.status, p.title.as_str()), (429, "Too Many Requests"));
        assert_eq!(p.type_uri, TYPE_TOO_MANY_REQUESTS);

        let p = ProblemDetails::from_worker_status(400, "bad url");
        assert_eq!((p.status, p.title.as_str()), (400, "Bad Request"));

        let p = ProblemDetails::from_worker_status(504, "timeout");
        assert_eq!((p.status, p.title.as_str()), (504, "Internal Server Error"));
        assert_eq!(p.type_uri, TYPE_INTERNAL);
    }

    #[test]
    fn serializes_type_field_and_omits_empty_detail() {
        let json = serde_json::to_value(ProblemDetails::internal("")).unwrap();
        assert_eq!(json["type"], TYPE_INTERNAL);
        assert_eq!(json["status"], 500);
        assert!(json.get("detail").is_none());
    }
}
