//! HTTP helpers for Lambda functions.
//!
//! All browser-facing handlers answer with permissive CORS headers so the
//! marketing site can call them cross-origin without a proxy.

use lambda_http::{Body, Request, Response};
use serde::Serialize;
use serde_json::json;

/// Create a JSON response with the given status code, data, and CORS headers.
pub fn json_response<T: Serialize>(
    status: u16,
    data: &T,
) -> Result<Response<Body>, lambda_http::Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "Content-Type")
        .header("Access-Control-Allow-Methods", "POST, OPTIONS")
        .body(Body::from(serde_json::to_string(data)?))?)
}

/// Create an error response `{"status": false, "error": message}`.
pub fn error_response(
    status: u16,
    message: impl Into<String>,
) -> Result<Response<Body>, lambda_http::Error> {
    let message = message.into();
    json_response(status, &json!({ "status": false, "error": message }))
}

/// Empty 200 response for CORS preflight requests.
pub fn preflight_response() -> Result<Response<Body>, lambda_http::Error> {
    Ok(Response::builder()
        .status(200)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "Content-Type")
        .header("Access-Control-Allow-Methods", "POST, OPTIONS")
        .body(Body::Empty)?)
}

/// Look up a request header as a string (header names are case-insensitive).
pub fn header<'a>(event: &'a Request, name: &str) -> Option<&'a str> {
    event.headers().get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_shape() {
        let response = error_response(400, "name required").unwrap();
        assert_eq!(response.status(), 400);
        assert_eq!(
            response.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );

        let body: serde_json::Value = serde_json::from_slice(response.body().as_ref()).unwrap();
        assert_eq!(body["status"], false);
        assert_eq!(body["error"], "name required");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let event = lambda_http::http::Request::builder()
            .header("X-Cal-Signature-256", "abc123")
            .body(Body::Empty)
            .unwrap();
        assert_eq!(header(&event, "x-cal-signature-256"), Some("abc123"));
    }
}
