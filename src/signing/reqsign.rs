//! Production [`SignRequests`] implementation backed by the reqsign crates.
//!
//! Credentials come from the standard AWS resolution chain (environment,
//! shared config, SSO, web identity, process, ECS, IMDSv2), optionally
//! wrapped in an STS assume-role provider when the gateway is configured
//! with a role ARN. One [`Signer`] is cached per (service, region) scope;
//! all of them share a single credential provider chain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::header::HeaderValue;
use http::request::Parts;
use http::uri::{PathAndQuery, Uri};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqsign_aws_v4::{
    AssumeRoleCredentialProvider, Credential, DefaultCredentialProvider, RequestSigner,
};
use reqsign_core::{Context, OsEnv, ProvideCredential, Signer};
use reqsign_file_read_tokio::TokioFileRead;
use reqsign_http_send_reqwest::ReqwestHttpSend;

use crate::error::BoxError;

use super::{PathEncoding, SignRequests, SigningScope};

const X_AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

/// Bytes left alone when escaping a path: unreserved characters plus the
/// segment separator. Everything else — `%` included — is encoded, which
/// is what turns an already-encoded path into its double-escaped form.
const PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Credential provider shared across the per-scope signer cache.
#[derive(Clone, Debug)]
struct SharedCredentials(Arc<dyn ProvideCredential<Credential = Credential>>);

#[async_trait]
impl ProvideCredential for SharedCredentials {
    type Credential = Credential;

    async fn provide_credential(
        &self,
        ctx: &Context,
    ) -> reqsign_core::Result<Option<Self::Credential>> {
        self.0.provide_credential(ctx).await
    }
}

#[derive(Debug)]
pub struct ReqsignSigner {
    ctx: Context,
    credentials: SharedCredentials,
    signers: Mutex<HashMap<(String, String), Signer<Credential>>>,
}

impl ReqsignSigner {
    /// Build a signer using the default credential chain, or an
    /// assume-role chain when `role_arn` is given. `sts_region` scopes the
    /// assume-role call; requests themselves are signed for whatever
    /// region each [`SigningScope`] carries.
    #[must_use]
    pub fn new(role_arn: Option<&str>, session_name: &str, sts_region: Option<&str>) -> Self {
        let ctx = Context::new()
            .with_file_read(TokioFileRead)
            .with_http_send(ReqwestHttpSend::default())
            .with_env(OsEnv);

        let credentials: Arc<dyn ProvideCredential<Credential = Credential>> = match role_arn {
            Some(role_arn) => {
                let sts_signer = Signer::new(
                    ctx.clone(),
                    DefaultCredentialProvider::new(),
                    RequestSigner::new("sts", sts_region.unwrap_or("us-east-1")),
                );
                let mut provider =
                    AssumeRoleCredentialProvider::new(role_arn.to_string(), sts_signer)
                        .with_role_session_name(session_name.to_string());
                if let Some(region) = sts_region {
                    provider = provider.with_region(region.to_string());
                }
                if std::env::var("AWS_STS_REGIONAL_ENDPOINTS").is_err() {
                    provider = provider.with_regional_sts_endpoint();
                }
                Arc::new(provider)
            }
            None => Arc::new(DefaultCredentialProvider::new()),
        };

        Self {
            ctx,
            credentials: SharedCredentials(credentials),
            signers: Mutex::new(HashMap::new()),
        }
    }

    fn signer_for(&self, service: &str, region: &str) -> Signer<Credential> {
        let mut signers = self.signers.lock().expect("signer cache mutex poisoned");
        signers
            .entry((service.to_string(), region.to_string()))
            .or_insert_with(|| {
                Signer::new(
                    self.ctx.clone(),
                    self.credentials.clone(),
                    RequestSigner::new(service, region),
                )
            })
            .clone()
    }

    async fn sign_scoped(
        &self,
        parts: &mut Parts,
        scope: SigningScope<'_>,
        expires_in: Option<Duration>,
    ) -> Result<(), BoxError> {
        let original = match scope.path_encoding {
            PathEncoding::DoubleEscape => {
                let original = parts.uri.clone();
                parts.uri = escaped_path_uri(&original)?;
                Some(original)
            }
            PathEncoding::Preserve => None,
        };

        let signer = self.signer_for(scope.service, scope.region);
        let result = signer.sign(parts, expires_in).await;

        // The escaped path never outlives this one call: restore it on
        // success and failure alike, keeping whatever query string the
        // signer wrote (presigning appends credential parameters).
        if let Some(original) = original {
            parts.uri = restored_path_uri(&original, &parts.uri)?;
        }

        result.map_err(Into::into)
    }
}

#[async_trait]
impl SignRequests for ReqsignSigner {
    async fn sign(
        &self,
        parts: &mut Parts,
        payload_hash: Option<&str>,
        scope: SigningScope<'_>,
    ) -> Result<(), BoxError> {
        if let Some(hash) = payload_hash {
            parts
                .headers
                .insert(X_AMZ_CONTENT_SHA256, HeaderValue::from_str(hash)?);
        }
        self.sign_scoped(parts, scope, None).await
    }

    async fn presign(
        &self,
        parts: &mut Parts,
        payload_hash: Option<&str>,
        scope: SigningScope<'_>,
        valid_for: Duration,
    ) -> Result<(), BoxError> {
        if let Some(hash) = payload_hash {
            parts
                .headers
                .insert(X_AMZ_CONTENT_SHA256, HeaderValue::from_str(hash)?);
        }
        self.sign_scoped(parts, scope, Some(valid_for)).await
    }
}

fn with_path_and_query(uri: &Uri, path: &str, query: Option<&str>) -> Result<Uri, BoxError> {
    let mut parts = uri.clone().into_parts();
    let pq = match query {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    parts.path_and_query = Some(PathAndQuery::try_from(pq.as_str())?);
    Ok(Uri::from_parts(parts)?)
}

fn escaped_path_uri(uri: &Uri) -> Result<Uri, BoxError> {
    let escaped = utf8_percent_encode(uri.path(), PATH_ESCAPE).to_string();
    with_path_and_query(uri, &escaped, uri.query())
}

fn restored_path_uri(original: &Uri, signed: &Uri) -> Result<Uri, BoxError> {
    with_path_and_query(signed, original.path(), signed.query())
}
