//! Unified error types for Signpost.
//!
//! Defines [`GatewayError`] (the main crate error enum) and
//! [`ValidationError`] for identity-config validation failures. Both use
//! `thiserror` for `Display` and `Error` derives. Pipeline errors carry
//! the exact message the proxy handler relays to the client; setup errors
//! include contextual hints to guide the user toward a fix.

use std::path::PathBuf;

/// Boxed error used at the collaborator seams (signer, transport).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub identity: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "  identity {}: {} — {}",
            self.identity, self.field, self.message
        )?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    // -- Request pipeline --
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("unable to determine service from host: {0}")]
    UnresolvedService(String),

    #[error("unable to sign with specified signing method {method} for service {service}")]
    UnsupportedSigningMethod { method: String, service: String },

    /// The signing collaborator failed; its message is relayed verbatim.
    #[error("{source}")]
    Signing {
        #[source]
        source: BoxError,
    },

    /// The transport collaborator failed; its message is relayed verbatim.
    #[error("{source}")]
    Transport {
        #[source]
        source: BoxError,
    },

    #[error("unable to read request body: {source}")]
    BodyRead {
        #[source]
        source: BoxError,
    },

    #[error("invalid proxy target: {source}")]
    InvalidTarget {
        #[source]
        source: BoxError,
    },

    // -- Setup / configuration --
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: BoxError,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),
}
