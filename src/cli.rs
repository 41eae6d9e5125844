//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate, health), and their associated argument
//! structs. Every flag has an environment variable equivalent for
//! container deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "signpost",
    version,
    about = "AWS SigV4 request-signing reverse proxy",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        signpost run                               Sign by resolving the Host header\n  \
        signpost run --name execute-api --region eu-west-1\n  \
        signpost run --identities signpost.yaml    Multiple signing identities\n\n  \
        Docs: https://github.com/signpost-proxy/signpost"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Run(Box<RunArgs>),

    /// Validate an identity config file without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        signpost run -p 8080                                    Resolve targets from Host\n  \
        signpost run --host dynamodb.us-east-1.amazonaws.com    Fixed upstream\n  \
        signpost run --name s3 --region us-east-1 --role-arn arn:aws:iam::123456789012:role/proxy\n  \
        signpost run --rate-limit 200 --burst-limit 50          Admission control")]
pub struct RunArgs {
    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "BIND", default_value = "0.0.0.0")]
    pub bind: String,

    // -- Signing --
    /// AWS service to sign for (with --region, bypasses host resolution)
    #[arg(long, env = "SIGNING_NAME", help_heading = "Signing")]
    pub name: Option<String>,

    /// AWS region to sign for
    #[arg(long, env = "SIGNING_REGION", help_heading = "Signing")]
    pub region: Option<String>,

    /// Host to proxy to
    #[arg(long, env = "HOST_OVERRIDE", help_heading = "Signing")]
    pub host: Option<String>,

    /// Host to sign for (participates in the signature, not the routing)
    #[arg(long = "sign-host", env = "SIGNING_HOST", help_heading = "Signing")]
    pub sign_host: Option<String>,

    /// Protocol to proxy with
    #[arg(
        long = "upstream-url-scheme",
        env = "UPSTREAM_URL_SCHEME",
        help_heading = "Signing"
    )]
    pub upstream_url_scheme: Option<String>,

    /// Amazon Resource Name (ARN) of the role to assume
    #[arg(long = "role-arn", env = "ROLE_ARN", help_heading = "Signing")]
    pub role_arn: Option<String>,

    /// Prevent signing of the payload
    #[arg(long = "unsigned-payload", env = "UNSIGNED_PAYLOAD", help_heading = "Signing")]
    pub unsigned_payload: bool,

    /// Identity config file with per-host signing overrides
    #[arg(short, long, env = "IDENTITIES_FILE", help_heading = "Signing")]
    pub identities: Option<PathBuf>,

    // -- Headers --
    /// Headers to strip from the incoming request
    #[arg(
        short,
        long,
        env = "STRIP_HEADERS",
        value_delimiter = ',',
        help_heading = "Headers"
    )]
    pub strip: Vec<String>,

    /// Duplicate headers to an X-Original- prefixed name
    #[arg(
        long = "duplicate-headers",
        env = "DUPLICATE_HEADERS",
        value_delimiter = ',',
        help_heading = "Headers"
    )]
    pub duplicate_headers: Vec<String>,

    /// Comma-separated list of custom headers in key=value format
    #[arg(long = "custom-headers", env = "CUSTOM_HEADERS", help_heading = "Headers")]
    pub custom_headers: Option<String>,

    // -- Traffic shaping --
    /// Admitted requests per second (0 disables the limiter)
    #[arg(
        long = "rate-limit",
        env = "RATE_LIMIT",
        default_value_t = 0.0,
        help_heading = "Traffic shaping"
    )]
    pub rate_limit: f64,

    /// Maximum burst size for requests
    #[arg(
        long = "burst-limit",
        env = "BURST_LIMIT",
        default_value_t = 0,
        help_heading = "Traffic shaping"
    )]
    pub burst_limit: u32,

    // -- Transport --
    /// Disable peer TLS certificate validation
    #[arg(long = "no-verify-ssl", env = "NO_VERIFY_SSL", help_heading = "Transport")]
    pub no_verify_ssl: bool,

    /// Idle timeout to the upstream service, in seconds
    #[arg(
        long = "idle-timeout",
        env = "IDLE_TIMEOUT_SECS",
        default_value_t = 40,
        help_heading = "Transport"
    )]
    pub idle_timeout: u64,

    /// Max request body size in bytes
    #[arg(
        long = "max-body",
        env = "MAX_BODY_SIZE",
        default_value_t = 10_485_760,
        help_heading = "Transport"
    )]
    pub max_body: usize,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Enable additional logging, implies the debug log level
    #[arg(short, long)]
    pub verbose: bool,

    /// Log 4xx and 5xx response bodies
    #[arg(long = "log-failed-requests", env = "LOG_FAILED_REQUESTS")]
    pub log_failed_requests: bool,

    /// Log the signing process
    #[arg(long = "log-signing-process", env = "LOG_SIGNING_PROCESS")]
    pub log_signing_process: bool,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Identity config file to validate
    #[arg(default_value = "signpost.yaml")]
    pub config: PathBuf,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:8080")]
    pub url: String,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}
