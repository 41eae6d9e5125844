//! The signing orchestrator: builds, signs, and dispatches the outbound
//! request.
//!
//! [`ProxyClient::forward`] runs the whole pipeline for one request:
//! admission check, proxy-target computation, body materialization,
//! service resolution, signing, header policy, and the single transport
//! call. One `ProxyClient` exists per signing identity; its configuration
//! is read-only and shared by reference across concurrent requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::request::Parts;
use http::{Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use sha2::{Digest, Sha256};

use crate::error::{BoxError, GatewayError};
use crate::proxy::endpoints::{ResolvedEndpoint, ServiceResolver};
use crate::proxy::ratelimit::AdmissionGate;
use crate::signing::{PathEncoding, SignRequests, SigningScope};

/// Presigned URLs are valid for one hour from the signing call.
const PRESIGN_VALIDITY: Duration = Duration::from_secs(3600);

/// External HTTP transport collaborator: a single-call, non-retrying
/// client. The only network call in the pipeline goes through here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dispatch(&self, req: Request<Full<Bytes>>) -> Result<Response<Body>, BoxError>;
}

/// Static configuration for one signing identity. Supplied once at
/// startup, never mutated during request processing.
#[derive(Debug, Default, Clone)]
pub struct ProxyOptions {
    pub signing_name_override: Option<String>,
    pub signing_region_override: Option<String>,
    pub host_override: Option<String>,
    pub signing_host_override: Option<String>,
    pub scheme_override: Option<String>,
    pub strip_headers: Vec<HeaderName>,
    pub duplicate_headers: Vec<HeaderName>,
    pub custom_headers: HeaderMap,
    pub log_failed_requests: bool,
    pub unsigned_payload: bool,
}

pub struct ProxyClient {
    signer: Arc<dyn SignRequests>,
    transport: Arc<dyn Transport>,
    resolver: Arc<ServiceResolver>,
    gate: Arc<AdmissionGate>,
    options: ProxyOptions,
}

impl ProxyClient {
    pub fn new(
        signer: Arc<dyn SignRequests>,
        transport: Arc<dyn Transport>,
        resolver: Arc<ServiceResolver>,
        gate: Arc<AdmissionGate>,
        options: ProxyOptions,
    ) -> Self {
        Self {
            signer,
            transport,
            resolver,
            gate,
            options,
        }
    }

    /// Run the signing pipeline for one inbound request. Any failure is
    /// final for this request: nothing is retried or queued.
    pub async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, GatewayError> {
        if !self.gate.allow() {
            return Err(GatewayError::RateLimitExceeded);
        }

        let (mut inbound, inbound_body) = req.into_parts();
        let inbound_host = request_host(&inbound);

        let proxy_host = self
            .options
            .host_override
            .clone()
            .unwrap_or_else(|| inbound_host.clone());
        let scheme = self.options.scheme_override.as_deref().unwrap_or("https");

        // The signing step reads the body to hash it and the transport
        // reads it again to send it; buffering makes the rewind
        // unconditional whatever the original stream was. Per-request
        // memory is bounded by the inbound body size.
        let body = inbound_body
            .collect()
            .await
            .map_err(|e| GatewayError::BodyRead { source: e.into() })?
            .to_bytes();

        let chunked = is_chunked(&inbound.headers);
        let content_length = declared_content_length(&inbound.headers);
        let transfer_encodings: Vec<HeaderValue> = inbound
            .headers
            .get_all(TRANSFER_ENCODING)
            .iter()
            .cloned()
            .collect();

        // Framing is owned by the outbound decisions below; promote the
        // markers out of the pass-through set so the merge cannot smuggle
        // a stale content length past a chunked request.
        inbound.headers.remove(CONTENT_LENGTH);
        inbound.headers.remove(TRANSFER_ENCODING);

        let target: Uri = format!("{scheme}://{proxy_host}{}", path_and_query(&inbound.uri))
            .parse()
            .map_err(|e: http::uri::InvalidUri| GatewayError::InvalidTarget { source: e.into() })?;

        let (mut outbound, ()) = Request::builder()
            .method(inbound.method.clone())
            .uri(target)
            .body(())
            .map_err(|e| GatewayError::InvalidTarget { source: e.into() })?
            .into_parts();

        // A chunked request has no usable content length; otherwise the
        // declared value is propagated exactly, zero included.
        if !chunked {
            if let Some(length) = content_length {
                outbound.headers.insert(CONTENT_LENGTH, length);
            }
        }

        let endpoint = self.resolve_endpoint(&inbound_host, scheme, &proxy_host)?;

        // The Host header participates in the canonical signing string
        // independent of the actual network destination, so it must be in
        // place before the signer runs.
        let signing_host = self
            .options
            .signing_host_override
            .as_deref()
            .unwrap_or(&proxy_host);
        outbound.headers.insert(
            HOST,
            HeaderValue::from_str(signing_host)
                .map_err(|e| GatewayError::InvalidTarget { source: e.into() })?,
        );

        self.sign(&mut outbound, &body, &endpoint).await?;

        if chunked {
            // Pass the original markers through, nested encodings included.
            for value in &transfer_encodings {
                outbound.headers.append(TRANSFER_ENCODING, value.clone());
            }
        } else {
            // Without this marker a client facing a body of unknown or
            // zero length may fall back to chunked framing, which
            // signing-protected backends like object storage reject.
            outbound
                .headers
                .insert(TRANSFER_ENCODING, HeaderValue::from_static("identity"));
        }

        // Documented side effect: the strip list mutates the inbound
        // request's own header map, so a stripped header is gone before
        // the duplication pass looks for it.
        for header in &self.options.strip_headers {
            tracing::debug!(header = %header, "stripping header");
            inbound.headers.remove(header);
        }

        for header in &self.options.duplicate_headers {
            let value = inbound.headers.get(header);
            let Some(value) = value.filter(|v| !v.as_bytes().is_empty()) else {
                tracing::debug!(header = %header, "header empty, not duplicating");
                continue;
            };
            let name: HeaderName = format!("x-original-{header}").parse().map_err(
                |e: http::header::InvalidHeaderName| GatewayError::InvalidHeader {
                    name: header.to_string(),
                    message: e.to_string(),
                },
            )?;
            outbound.headers.insert(name, value.clone());
        }

        // Pass-through headers must never clobber what the signer wrote,
        // and statically configured custom headers rank below both.
        merge_without_overwrite(&mut outbound.headers, &inbound.headers);
        merge_without_overwrite(&mut outbound.headers, &self.options.custom_headers);

        let method = outbound.method.clone();
        let uri = outbound.uri.clone();
        tracing::debug!(method = %method, uri = %uri, "proxying request");

        let request = Request::from_parts(outbound, Full::new(body));
        let response = self
            .transport
            .dispatch(request)
            .await
            .map_err(|source| GatewayError::Transport { source })?;

        if response.status().as_u16() >= 400
            && (self.options.log_failed_requests || tracing::enabled!(tracing::Level::DEBUG))
        {
            return Ok(log_failed_response(&method, &uri, response).await);
        }

        Ok(response)
    }

    /// A configured override pair always wins and the resolver is never
    /// consulted; otherwise the ORIGINAL inbound host is resolved, not
    /// the rewritten proxy host.
    fn resolve_endpoint(
        &self,
        inbound_host: &str,
        scheme: &str,
        proxy_host: &str,
    ) -> Result<ResolvedEndpoint, GatewayError> {
        match (
            &self.options.signing_name_override,
            &self.options.signing_region_override,
        ) {
            (Some(name), Some(region)) => Ok(ResolvedEndpoint {
                url: format!("{scheme}://{proxy_host}"),
                signing_method: "v4".to_string(),
                signing_region: region.clone(),
                signing_name: name.clone(),
                partition_id: String::new(),
                signing_name_derived: false,
            }),
            _ => self
                .resolver
                .resolve(inbound_host)
                .ok_or_else(|| GatewayError::UnresolvedService(inbound_host.to_string())),
        }
    }

    async fn sign(
        &self,
        outbound: &mut Parts,
        body: &Bytes,
        endpoint: &ResolvedEndpoint,
    ) -> Result<(), GatewayError> {
        // Object storage signatures are computed over the unescaped path;
        // the per-call encoding keeps that from leaking into unrelated
        // requests signed through the same signer.
        let path_encoding = if endpoint.signing_name == "s3" {
            PathEncoding::Preserve
        } else {
            PathEncoding::DoubleEscape
        };
        let scope = SigningScope {
            service: &endpoint.signing_name,
            region: &endpoint.signing_region,
            path_encoding,
        };

        match endpoint.signing_method.as_str() {
            "v4" | "s3v4" => {
                let payload_hash = if self.options.unsigned_payload {
                    None
                } else {
                    Some(hex::encode(Sha256::digest(body)))
                };
                self.signer
                    .sign(outbound, payload_hash.as_deref(), scope)
                    .await
                    .map_err(|source| GatewayError::Signing { source })?;
            }
            "s3" => {
                self.signer
                    .presign(outbound, None, scope, PRESIGN_VALIDITY)
                    .await
                    .map_err(|source| GatewayError::Signing { source })?;
            }
            method => {
                return Err(GatewayError::UnsupportedSigningMethod {
                    method: method.to_string(),
                    service: endpoint.signing_name.clone(),
                });
            }
        }

        tracing::debug!(
            service = %endpoint.signing_name,
            region = %endpoint.signing_region,
            "signed request"
        );
        Ok(())
    }
}

/// Drain and log a failed upstream body, then hand the caller a fresh,
/// unconsumed body over the same bytes.
async fn log_failed_response(
    method: &http::Method,
    uri: &Uri,
    response: Response<Body>,
) -> Response<Body> {
    let (parts, body) = response.into_parts();
    let bytes = body
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .unwrap_or_default();
    tracing::error!(
        request = %format!("{method} {uri}"),
        status_code = parts.status.as_u16(),
        message = %String::from_utf8_lossy(&bytes),
        "error proxying request"
    );
    Response::from_parts(parts, Body::from(bytes))
}

fn request_host(parts: &Parts) -> String {
    parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(ToString::to_string))
        .unwrap_or_default()
}

fn path_and_query(uri: &Uri) -> &str {
    uri.path_and_query().map_or("/", |pq| pq.as_str())
}

/// RFC 9112 §6.1: a transfer coding other than "identity" means the body
/// length is defined by chunked framing; identity-only markers count as
/// no marker at all.
pub(crate) fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|coding| !coding.trim().eq_ignore_ascii_case("identity") && !coding.trim().is_empty())
}

fn declared_content_length(headers: &HeaderMap) -> Option<HeaderValue> {
    let value = headers.get(CONTENT_LENGTH)?;
    value.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(value.clone())
}

fn merge_without_overwrite(dst: &mut HeaderMap, src: &HeaderMap) {
    for name in src.keys() {
        if !dst.contains_key(name) {
            for value in src.get_all(name) {
                dst.append(name.clone(), value.clone());
            }
        }
    }
}
