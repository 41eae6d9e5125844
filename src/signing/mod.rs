//! Request-signing capability interface.
//!
//! The proxy pipeline consumes signing through the narrow [`SignRequests`]
//! trait: two operations (header signing and URL presigning), both
//! mutating the request in place. The production implementation in
//! [`reqsign`] wraps the reqsign crates; tests substitute recording stubs.

pub mod reqsign;

use std::time::Duration;

use async_trait::async_trait;
use http::request::Parts;

use crate::error::BoxError;

/// How the URI path participates in the canonical request.
///
/// This is a per-call parameter rather than signer state so that two
/// concurrent requests signing through one shared signer can never
/// observe each other's escaping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEncoding {
    /// Standard SigV4: the already-encoded path is escaped once more.
    DoubleEscape,
    /// Object storage: the signature is computed over the raw path.
    Preserve,
}

/// One signing assignment: the service/region the credential is scoped to
/// and the path treatment for this single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningScope<'a> {
    pub service: &'a str,
    pub region: &'a str,
    pub path_encoding: PathEncoding,
}

/// External signing collaborator.
#[async_trait]
pub trait SignRequests: Send + Sync {
    /// Sign in place: mutates the request headers to carry the signature
    /// and related security headers. `payload_hash` is the hex SHA-256 of
    /// the request body; `None` signs an unsigned payload.
    async fn sign(
        &self,
        parts: &mut Parts,
        payload_hash: Option<&str>,
        scope: SigningScope<'_>,
    ) -> Result<(), BoxError>;

    /// Presign: mutates the URL query string with a time-bounded
    /// credential valid for `valid_for` from the call time.
    async fn presign(
        &self,
        parts: &mut Parts,
        payload_hash: Option<&str>,
        scope: SigningScope<'_>,
        valid_for: Duration,
    ) -> Result<(), BoxError>;
}
