// API response utility functions module
//
// Every response carries the same permissive CORS header set, including
// errors and the empty preflight response.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::http::response::Builder;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::logger;

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// The fixed header set present on every response
fn with_cors(builder: Builder) -> Builder {
    builder
        .header("Access-Control-Allow-Origin", ALLOW_ORIGIN)
        .header("Access-Control-Allow-Methods", ALLOW_METHODS)
        .header("Access-Control-Allow-Headers", ALLOW_HEADERS)
        .header("Content-Type", "application/json")
}

/// Build a JSON response with the fixed CORS header set
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = match serde_json::to_string(body) {
        Ok(j) => j,
        Err(e) => {
            logger::log_error(&format!("Failed to serialize response: {e}"));
            return server_error("response serialization failed");
        }
    };

    with_cors(Response::builder().status(status))
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|e| {
            logger::log_error(&format!("Failed to build response: {e}"));
            Response::new(Full::new(Bytes::from("Error")))
        })
}

/// Empty 200 answering a CORS preflight request
pub fn preflight() -> Response<Full<Bytes>> {
    with_cors(Response::builder().status(StatusCode::OK))
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            logger::log_error(&format!("Failed to build preflight response: {e}"));
            Response::new(Full::new(Bytes::new()))
        })
}

/// 404 for any unmatched method/path pair
pub fn not_found() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": "Not found" }),
    )
}

/// 400 for a failed field-presence check
pub fn bad_request(message: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::BAD_REQUEST, &serde_json::json!({ "error": message }))
}

/// 413 for a declared body size above the configured limit
pub fn payload_too_large(max_body_size: u64) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        &serde_json::json!({
            "error": "Payload too large",
            "message": format!("request body exceeds {max_body_size} bytes"),
        }),
    )
}

/// 500 envelope for any unexpected failure: store errors, malformed
/// JSON bodies, body read failures
pub fn server_error(message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Server error",
        "message": message,
    });

    with_cors(Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR))
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|e| {
            logger::log_error(&format!("Failed to build error response: {e}"));
            Response::new(Full::new(Bytes::from("Server error")))
        })
}
