//! `GET /health` endpoint handler.
//!
//! Bypasses the signing pipeline entirely: a liveness probe must not
//! consume admission tokens or credentials. Returns 200 with no body.

use http::StatusCode;

pub async fn health_handler() -> StatusCode {
    StatusCode::OK
}
