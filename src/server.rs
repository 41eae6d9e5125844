//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared identity map), [`build_router`]
//! for constructing the Axum router with middleware layers,
//! [`build_http_client`] for the connection-pooled hyper client,
//! [`HyperTransport`] (the production [`Transport`] collaborator), and
//! [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use http::header::TRANSFER_ENCODING;
use http::{Request, Response};
use http_body_util::Full;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::error::BoxError;
use crate::health::health_handler;
use crate::proxy;
use crate::proxy::client::{ProxyClient, Transport};

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, Full<Bytes>>;

pub struct AppState {
    pub default_client: Arc<ProxyClient>,
    pub host_clients: HashMap<String, Arc<ProxyClient>>,
    pub start_time: Instant,
}

impl AppState {
    /// An exact host match selects a named identity; anything else falls
    /// back to the default. No suffix matching happens at this layer —
    /// that is the service resolver's business, not identity selection.
    #[must_use]
    pub fn identity(&self, host: &str) -> &Arc<ProxyClient> {
        self.host_clients.get(host).unwrap_or(&self.default_client)
    }
}

/// Production transport: one pooled hyper client call per request, no
/// retries, no redirect following.
pub struct HyperTransport {
    client: HttpClient,
}

impl HyperTransport {
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn dispatch(&self, mut req: Request<Full<Bytes>>) -> Result<Response<Body>, BoxError> {
        // "identity" is an in-memory marker meaning "no chunked framing".
        // HTTP serializers treat identity as no marker at all, so it never
        // goes on the wire.
        if req
            .headers()
            .get(TRANSFER_ENCODING)
            .is_some_and(|value| value == "identity")
        {
            req.headers_mut().remove(TRANSFER_ENCODING);
        }

        let response = self.client.request(req).await?;
        Ok(response.map(Body::new))
    }
}

/// Build the pooled TLS client. `insecure` swaps the webpki trust roots
/// for a verifier that accepts anything — the `--no-verify-ssl` escape
/// hatch for private endpoints with self-signed certificates.
#[must_use]
pub fn build_http_client(insecure: bool, idle_timeout: Duration) -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = if insecure {
        tracing::warn!("peer TLS certificate validation is DISABLED");
        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoVerification::default()))
            .with_no_client_auth();
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(config)
            .https_or_http()
            .enable_http1()
            .build()
    } else {
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build()
    };

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(idle_timeout)
        .build(https)
}

pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(proxy::serve)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

mod danger {
    //! Certificate verifier that accepts everything. Only reachable via
    //! the explicit `--no-verify-ssl` flag.

    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::CryptoProvider;
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, SignatureScheme};

    #[derive(Debug)]
    pub struct NoVerification(CryptoProvider);

    impl Default for NoVerification {
        fn default() -> Self {
            Self(rustls::crypto::ring::default_provider())
        }
    }

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls12_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0.signature_verification_algorithms.supported_schemes()
        }
    }
}
