//! HTTP routes for Lectern
//!
//! Handlers parse JSON bodies, call the core components, and serialize
//! outcomes back as `{success, message, ...}` envelopes. Error taxonomy
//! maps onto statuses here; internal errors are masked outside dev mode.

pub mod certificates;
pub mod health;
pub mod progress;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::types::LecternError;

/// Request bodies above this size are rejected
const MAX_BODY_BYTES: usize = 65536;

/// Error envelope returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"success":false,"message":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// Map an error onto its HTTP status and envelope.
///
/// Outside dev mode, internal errors collapse to a generic message so
/// exceptions are never exposed verbatim.
pub(crate) fn error_response(err: &LecternError, dev_mode: bool) -> Response<Full<Bytes>> {
    let status = match err {
        LecternError::Validation(_) => StatusCode::BAD_REQUEST,
        LecternError::NotFound(_) => StatusCode::NOT_FOUND,
        LecternError::Conflict(_) => StatusCode::CONFLICT,
        LecternError::Dependency { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if err.is_internal() && !dev_mode {
        "internal server error".to_string()
    } else {
        err.to_string()
    };

    json_response(
        status,
        &ErrorBody {
            success: false,
            message,
        },
    )
}

pub(crate) async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<Incoming>,
) -> Result<T, LecternError> {
    let body = req
        .collect()
        .await
        .map_err(|e| LecternError::Http(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.len() > MAX_BODY_BYTES {
        return Err(LecternError::Http("Request body too large".into()));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| LecternError::Validation(format!("Invalid JSON body: {}", e)))
}

/// Read one query-string parameter from the request URI
pub(crate) fn query_param(req: &Request<Incoming>, name: &str) -> Option<String> {
    req.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
    })
}

pub(crate) fn not_found() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &ErrorBody {
            success: false,
            message: "route not found".into(),
        },
    )
}

pub(crate) fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PATCH, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DependencyStep;

    #[test]
    fn test_error_statuses_follow_taxonomy() {
        let cases = [
            (LecternError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (LecternError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (LecternError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                LecternError::Dependency {
                    step: DependencyStep::Upload,
                    message: "x".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                LecternError::Database("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(error_response(&err, true).status(), expected);
        }
    }

    #[test]
    fn test_internal_errors_masked_in_production() {
        let err = LecternError::Database("connection string leaked".into());

        let masked = error_response(&err, false);
        let verbose = error_response(&err, true);

        // Bodies differ: production hides internals
        assert_eq!(masked.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(verbose.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
