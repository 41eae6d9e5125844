//! Integration tests driving a running gateway with stub collaborators.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::header::HeaderValue;
use http::request::Parts;
use http::{Request, Response};
use http_body_util::Full;
use tower::util::ServiceExt;

use signpost::error::BoxError;
use signpost::proxy::client::{ProxyClient, ProxyOptions, Transport};
use signpost::proxy::endpoints::{EndpointTable, ServiceResolver};
use signpost::proxy::ratelimit::AdmissionGate;
use signpost::server::{self, AppState};
use signpost::signing::{SignRequests, SigningScope};

/// Stamps a fixed signature; the relay does not care what it says.
struct StubSigner;

#[async_trait]
impl SignRequests for StubSigner {
    async fn sign(
        &self,
        parts: &mut Parts,
        _payload_hash: Option<&str>,
        _scope: SigningScope<'_>,
    ) -> Result<(), BoxError> {
        parts.headers.insert(
            "authorization",
            HeaderValue::from_static("AWS4-HMAC-SHA256 integration-test"),
        );
        Ok(())
    }

    async fn presign(
        &self,
        parts: &mut Parts,
        _payload_hash: Option<&str>,
        _scope: SigningScope<'_>,
        _valid_for: std::time::Duration,
    ) -> Result<(), BoxError> {
        let path = parts.uri.path().to_string();
        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.path_and_query = Some(format!("{path}?X-Amz-Signature=test").parse()?);
        parts.uri = http::Uri::from_parts(uri_parts)?;
        Ok(())
    }
}

/// Responds with request metadata in headers so tests can see what the
/// orchestrator actually sent.
struct EchoTransport {
    body: &'static str,
    streamed: bool,
}

impl EchoTransport {
    fn buffered(body: &'static str) -> Self {
        Self {
            body,
            streamed: false,
        }
    }

    fn streamed() -> Self {
        Self {
            body: "",
            streamed: true,
        }
    }
}

#[async_trait]
impl Transport for EchoTransport {
    async fn dispatch(&self, req: Request<Full<Bytes>>) -> Result<Response<Body>, BoxError> {
        let (parts, _) = req.into_parts();
        let signature = parts
            .headers
            .get("authorization")
            .cloned()
            .unwrap_or(HeaderValue::from_static("none"));
        let builder = Response::builder()
            .status(200)
            .header("x-signed-authorization", signature)
            .header("x-target", parts.uri.to_string());

        if self.streamed {
            let chunks = ["chunk-one|", "chunk-two|", "chunk-three"];
            let stream = futures::stream::iter(
                chunks
                    .into_iter()
                    .map(|chunk| Ok::<_, std::io::Error>(Bytes::from(chunk))),
            );
            Ok(builder.body(Body::from_stream(stream))?)
        } else {
            Ok(builder
                .header("content-length", self.body.len())
                .body(Body::from(self.body))?)
        }
    }
}

fn overrides() -> ProxyOptions {
    ProxyOptions {
        signing_name_override: Some("execute-api".to_string()),
        signing_region_override: Some("us-east-1".to_string()),
        ..ProxyOptions::default()
    }
}

fn stub_client(
    options: ProxyOptions,
    table: EndpointTable,
    gate: AdmissionGate,
    transport: EchoTransport,
) -> Arc<ProxyClient> {
    Arc::new(ProxyClient::new(
        Arc::new(StubSigner),
        Arc::new(transport),
        Arc::new(ServiceResolver::new(table)),
        Arc::new(gate),
        options,
    ))
}

fn single_identity_state(client: Arc<ProxyClient>) -> Arc<AppState> {
    Arc::new(AppState {
        default_client: client,
        host_clients: HashMap::new(),
        start_time: Instant::now(),
    })
}

async fn start_test_server(state: Arc<AppState>) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let router = server::build_router(state, 1_048_576);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    (addr, shutdown_tx)
}

#[tokio::test]
async fn health_endpoint_returns_200_with_no_body() {
    let state = single_identity_state(stub_client(
        overrides(),
        EndpointTable::default(),
        AdmissionGate::disabled(),
        EchoTransport::buffered("never sent"),
    ));
    let (addr, shutdown) = start_test_server(state).await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.bytes().await.unwrap().is_empty());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn proxied_request_is_signed_and_relayed() {
    let state = single_identity_state(stub_client(
        overrides(),
        EndpointTable::default(),
        AdmissionGate::disabled(),
        EchoTransport::buffered("upstream says hi"),
    ));
    let (addr, shutdown) = start_test_server(state).await;

    let resp = reqwest::get(format!("http://{addr}/some/path")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("x-signed-authorization").unwrap(),
        "AWS4-HMAC-SHA256 integration-test"
    );
    assert_eq!(resp.text().await.unwrap(), "upstream says hi");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unresolvable_host_is_a_502_with_a_diagnostic_body() {
    // No overrides and an empty table: nothing resolves.
    let state = single_identity_state(stub_client(
        ProxyOptions::default(),
        EndpointTable::default(),
        AdmissionGate::disabled(),
        EchoTransport::buffered("never sent"),
    ));
    let (addr, shutdown) = start_test_server(state).await;

    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), 502);

    let body = resp.text().await.unwrap();
    assert!(body.starts_with("unable to proxy request - "));
    assert!(body.contains("unable to determine service from host"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn rate_limited_requests_get_a_502() {
    // Positive rate with zero burst: the gate denies everything.
    let state = single_identity_state(stub_client(
        overrides(),
        EndpointTable::default(),
        AdmissionGate::new(5.0, 0),
        EchoTransport::buffered("never sent"),
    ));
    let (addr, shutdown) = start_test_server(state).await;

    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), 502);
    assert_eq!(
        resp.text().await.unwrap(),
        "unable to proxy request - rate limit exceeded"
    );

    let _ = shutdown.send(());
}

#[tokio::test]
async fn streamed_upstream_bodies_reach_the_client_intact() {
    let state = single_identity_state(stub_client(
        overrides(),
        EndpointTable::default(),
        AdmissionGate::disabled(),
        EchoTransport::streamed(),
    ));
    let (addr, shutdown) = start_test_server(state).await;

    let resp = reqwest::get(format!("http://{addr}/big/object")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "chunk-one|chunk-two|chunk-three");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn named_identities_are_selected_by_exact_host() {
    let default_client = stub_client(
        overrides(),
        EndpointTable::default(),
        AdmissionGate::disabled(),
        EchoTransport::buffered("from-default"),
    );
    let reports_client = stub_client(
        overrides(),
        EndpointTable::default(),
        AdmissionGate::disabled(),
        EchoTransport::buffered("from-reports"),
    );

    let state = Arc::new(AppState {
        default_client,
        host_clients: HashMap::from([(
            "reports.internal.example.com".to_string(),
            reports_client,
        )]),
        start_time: Instant::now(),
    });
    let router = server::build_router(state, 1_048_576);

    let matched = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("host", "reports.internal.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(matched.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, Bytes::from("from-reports"));

    // A sub-host of a configured identity is NOT suffix-matched here.
    let unmatched = router
        .oneshot(
            Request::builder()
                .uri("/")
                .header("host", "sub.reports.internal.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(unmatched.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, Bytes::from("from-default"));
}
