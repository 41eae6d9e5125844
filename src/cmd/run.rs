//! `signpost run` — start the proxy server.
//!
//! Builds the endpoint table, admission gate, transport, and one signing
//! client per configured identity, then starts the Axum HTTP server with
//! graceful shutdown.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::cli::{LogLevel, RunArgs};
use crate::config;
use crate::config::model::Identity;
use crate::error::GatewayError;
use crate::logging;
use crate::proxy::client::{ProxyClient, ProxyOptions, Transport};
use crate::proxy::endpoints::{EndpointTable, ServiceResolver};
use crate::proxy::ratelimit::AdmissionGate;
use crate::server::{self, AppState, HyperTransport};
use crate::signing::reqsign::ReqsignSigner;

pub async fn execute(args: RunArgs) -> Result<(), GatewayError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        args.log_level.clone()
    };
    logging::init(&level, log_format, args.log_signing_process);

    let identities = match &args.identities {
        Some(path) => Some(config::load(path).await?),
        None => None,
    };

    let table = EndpointTable::builtin();
    tracing::debug!(endpoints = table.len(), "built endpoint table");
    let resolver = Arc::new(ServiceResolver::new(table));
    let gate = Arc::new(AdmissionGate::new(args.rate_limit, args.burst_limit));
    let transport: Arc<dyn Transport> = Arc::new(HyperTransport::new(server::build_http_client(
        args.no_verify_ssl,
        Duration::from_secs(args.idle_timeout),
    )));

    let base_options = ProxyOptions {
        signing_name_override: args.name.clone(),
        signing_region_override: args.region.clone(),
        host_override: args.host.clone(),
        signing_host_override: args.sign_host.clone(),
        scheme_override: args.upstream_url_scheme.clone(),
        strip_headers: parse_header_names(&args.strip)?,
        duplicate_headers: parse_header_names(&args.duplicate_headers)?,
        custom_headers: parse_custom_headers(args.custom_headers.as_deref()),
        log_failed_requests: args.log_failed_requests,
        unsigned_payload: args.unsigned_payload,
    };

    let session_name = role_session_name();
    let build_client = |identity: Option<&Identity>| -> Arc<ProxyClient> {
        let mut options = base_options.clone();
        let mut role_arn = args.role_arn.clone();
        if let Some(identity) = identity {
            if identity.name.is_some() {
                options.signing_name_override = identity.name.clone();
            }
            if identity.region.is_some() {
                options.signing_region_override = identity.region.clone();
            }
            if identity.host.is_some() {
                options.host_override = identity.host.clone();
            }
            if identity.role_arn.is_some() {
                role_arn = identity.role_arn.clone();
            }
        }

        let signer = Arc::new(ReqsignSigner::new(
            role_arn.as_deref(),
            &session_name,
            options.signing_region_override.as_deref(),
        ));
        Arc::new(ProxyClient::new(
            signer,
            transport.clone(),
            resolver.clone(),
            gate.clone(),
            options,
        ))
    };

    let default_client =
        build_client(identities.as_ref().and_then(|set| set.default_identity()));
    let mut host_clients = HashMap::new();
    if let Some(set) = &identities {
        for (host, identity) in set.named() {
            host_clients.insert(host.clone(), build_client(Some(identity)));
        }
    }

    let identity_count = 1 + host_clients.len();
    let state = Arc::new(AppState {
        default_client,
        host_clients,
        start_time: Instant::now(),
    });

    let router = server::build_router(state.clone(), args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        identities = identity_count,
        strip_headers = ?args.strip,
        duplicate_headers = ?args.duplicate_headers,
        rate_limit = args.rate_limit,
        "signpost started"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(server::shutdown_signal())
        .await?;

    tracing::info!(
        uptime_seconds = state.start_time.elapsed().as_secs(),
        "signpost stopped"
    );
    Ok(())
}

fn parse_header_names(names: &[String]) -> Result<Vec<HeaderName>, GatewayError> {
    names
        .iter()
        .map(|name| {
            name.parse()
                .map_err(|e: http::header::InvalidHeaderName| GatewayError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })
        })
        .collect()
}

/// Parse the `--custom-headers` flag: comma-separated `key=value` pairs.
/// Invalid pairs are logged and skipped, matching the lenient handling
/// operators expect from container env wiring.
fn parse_custom_headers(raw: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let Some(raw) = raw else {
        return headers;
    };

    for pair in raw.split(',').filter(|pair| !pair.trim().is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            tracing::warn!(header = %pair, "invalid header format, skipping");
            continue;
        };
        match (
            key.trim().parse::<HeaderName>(),
            HeaderValue::from_str(value.trim()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => {
                tracing::warn!(header = %pair, "invalid header name or value, skipping");
            }
        }
    }
    headers
}

fn role_session_name() -> String {
    let suffix = std::env::var("HOSTNAME")
        .ok()
        .filter(|hostname| !hostname.is_empty())
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs().to_string())
                .unwrap_or_else(|_| "0".to_string())
        });
    format!("signpost-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_headers_parse_pairs_and_keep_order() {
        let headers = parse_custom_headers(Some("x-env=prod,x-team=infra"));
        assert_eq!(headers.get("x-env").unwrap(), "prod");
        assert_eq!(headers.get("x-team").unwrap(), "infra");
    }

    #[test]
    fn custom_headers_skip_malformed_pairs() {
        let headers = parse_custom_headers(Some("no-equals-sign,x-ok=yes"));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-ok").unwrap(), "yes");
    }

    #[test]
    fn custom_headers_allow_equals_in_values() {
        let headers = parse_custom_headers(Some("x-query=a=b"));
        assert_eq!(headers.get("x-query").unwrap(), "a=b");
    }

    #[test]
    fn header_name_parsing_rejects_invalid_names() {
        let err = parse_header_names(&["not a header".to_string()]).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidHeader { .. }));
    }

    #[test]
    fn session_name_carries_the_prefix() {
        assert!(role_session_name().starts_with("signpost-"));
    }
}
