//! mepauth response serialization and error formatting.
//!
//! Errors use one JSON shape:
//!
//! ```json
//! { "code": "Unauthorized", "message": "authentication failed" }
//! ```

use mepauth_token_core::TokenError;

use crate::body::MepAuthResponseBody;

/// Content type of every mepauth response body.
pub const CONTENT_TYPE: &str = "application/json";

/// Serialize an error code and message into a JSON error body.
#[must_use]
pub fn error_to_json(code: &str, message: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "code": code,
        "message": message,
    }))
    .expect("JSON serialization of error cannot fail")
}

/// Build a JSON error response.
#[must_use]
pub fn error_response(
    status: http::StatusCode,
    code: &str,
    message: &str,
) -> http::Response<MepAuthResponseBody> {
    json_response(status, error_to_json(code, message))
}

/// Convert a [`TokenError`] into a complete HTTP error response.
#[must_use]
pub fn token_error_to_response(error: &TokenError) -> http::Response<MepAuthResponseBody> {
    error_response(error.status_code(), error.code.as_str(), &error.message)
}

/// Build a response from JSON bytes.
#[must_use]
pub fn json_response(
    status: http::StatusCode,
    json: Vec<u8>,
) -> http::Response<MepAuthResponseBody> {
    let mut response = http::Response::new(MepAuthResponseBody::from_json(json));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(CONTENT_TYPE),
    );
    response
}
