//! Buffered vs. streamed delivery of the upstream response.
//!
//! The delivery mode is decided once per response and never revisited:
//! a response with a known content length and no chunked framing is
//! collected and written in one piece, preserving exact `Content-Length`
//! semantics for legacy consumers; everything else is streamed through in
//! bounded chunks, one client write per upstream read.

use axum::body::Body;
use bytes::Bytes;
use futures::StreamExt;
use http::header::{HeaderMap, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Response, StatusCode};
use http_body_util::BodyExt;

use super::client::is_chunked;

/// Upper bound on a single streamed write to the client.
const STREAM_CHUNK: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Buffered,
    Streamed,
}

impl Delivery {
    /// Buffered only when the response declares a usable length and is
    /// not chunk-framed; unknown length streams.
    #[must_use]
    pub fn choose(headers: &HeaderMap) -> Self {
        let known_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .is_some();

        if known_length && !is_chunked(headers) {
            Self::Buffered
        } else {
            Self::Streamed
        }
    }
}

/// The 502 sent for any pipeline failure that happens before the status
/// line has gone out.
pub(crate) fn bad_gateway(error: &dyn std::fmt::Display) -> Response<Body> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .body(Body::from(format!("unable to proxy request - {error}")))
        .unwrap_or_else(|_| {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::BAD_GATEWAY;
            response
        })
}

/// Relay the upstream response to the client: headers travel as-is, the
/// body goes out buffered or streamed per [`Delivery::choose`].
pub async fn respond(upstream: Response<Body>) -> Response<Body> {
    let (mut parts, body) = upstream.into_parts();

    match Delivery::choose(&parts.headers) {
        Delivery::Buffered => match body.collect().await {
            Ok(collected) => Response::from_parts(parts, Body::from(collected.to_bytes())),
            Err(e) => {
                // Nothing has been written yet, so the whole request can
                // still fail cleanly.
                tracing::error!(error = %e, "unable to read upstream response");
                bad_gateway(&e)
            }
        },
        Delivery::Streamed => {
            // Framing toward the client is re-derived from the streamed
            // body; the upstream marker no longer applies.
            parts.headers.remove(TRANSFER_ENCODING);
            Response::from_parts(parts, Body::from_stream(relay_stream(body)))
        }
    }
}

/// One upstream chunk becomes one client write (the server flushes per
/// frame) unless it exceeds [`STREAM_CHUNK`]; empty reads produce no
/// write and no flush. A client write failure stops the stream from the
/// outside — the connection is gone and there is nothing left to report
/// to. An upstream read failure is logged and a best-effort diagnostic
/// suffix is appended to the already-started body, since the status line
/// cannot be changed at that point.
fn relay_stream(body: Body) -> impl futures::Stream<Item = Result<Bytes, std::convert::Infallible>>
{
    async_stream::stream! {
        let mut upstream = body.into_data_stream();
        while let Some(next) = upstream.next().await {
            match next {
                Ok(mut chunk) => {
                    while chunk.len() > STREAM_CHUNK {
                        yield Ok(chunk.split_to(STREAM_CHUNK));
                    }
                    if !chunk.is_empty() {
                        yield Ok(chunk);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "unable to read upstream response");
                    yield Ok(Bytes::from(format!("\nunable to proxy response - {e}")));
                    break;
                }
            }
        }
    }
}
