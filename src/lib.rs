//! Signpost is an AWS SigV4 request-signing reverse proxy.
//!
//! It receives incoming HTTP requests, resolves the signing target from
//! the `Host` header (or configured overrides), signs the rewritten
//! request with SigV4 via the reqsign crates, forwards it upstream, and
//! relays the response back — buffered when the length is known, streamed
//! otherwise.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, health).
//! - [`config`] -- Identity configuration: per-host signing overrides
//!   with a mandatory `default` entry.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler, bypassing the pipeline.
//! - [`logging`] -- Structured tracing setup with JSON and pretty output.
//! - [`proxy`] -- Core pipeline: service resolution, admission control,
//!   the signing orchestrator, and the response relay.
//! - [`server`] -- Axum server setup, shared state, HTTP client and
//!   transport, graceful shutdown.
//! - [`signing`] -- The narrow signing capability interface and its
//!   reqsign-backed production implementation.

// Binary crate — public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod proxy;
pub mod server;
pub mod signing;
