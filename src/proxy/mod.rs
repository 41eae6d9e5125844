//! HTTP entry point: the response relay handler.
//!
//! The [`serve`] function is the Axum fallback that receives every
//! non-`/health` request, picks the signing identity for the inbound
//! `Host`, runs the orchestrator, and relays the result. Submodules hold
//! the orchestrator ([`client`]), service resolution ([`endpoints`]),
//! admission control ([`ratelimit`]), and the delivery engine ([`relay`]).

pub mod client;
pub mod endpoints;
pub mod ratelimit;
pub mod relay;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::Response;
use http::header::HOST;
use http::Request;

use crate::server::AppState;

pub async fn serve(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let client = state.identity(&host);

    match client.forward(req).await {
        Ok(upstream) => relay::respond(upstream).await,
        Err(e) => {
            tracing::error!(error = %e, "unable to proxy request");
            relay::bad_gateway(&e)
        }
    }
}
