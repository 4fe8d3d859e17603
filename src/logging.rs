//! Logging setup for the provider process.
//!
//! Everything is written to **stderr**: the host owns stdout and the
//! provider's own output must never interleave with it.
//!
//! # Quick Start
//!
//! ```ignore
//! use echostream_provider::{init_logging, EchoStreamProvider};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Reads RUST_LOG, defaulting to `info`
//!     init_logging();
//!
//!     tracing::info!("Starting provider");
//!     let provider = EchoStreamProvider::new();
//!     // hand `provider` to the host adapter
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`, `echostream_provider=debug`)
//!
//! # Examples
//!
//! ```bash
//! # Trace every GraphQL request and token refresh
//! RUST_LOG=echostream_provider=debug ./terraform-provider-echostream
//!
//! # Only the authentication flow
//! RUST_LOG=warn,echostream_provider::auth=debug ./terraform-provider-echostream
//! ```
//!
//! Credentials never reach the log: passwords, tokens and SRP material are
//! redacted by the `Debug` implementations of the types that carry them.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Initialize the default logging subscriber.
///
/// Filters by `RUST_LOG`, falling back to `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level.
///
/// Like [`init_logging`], but `default_level` applies when `RUST_LOG` is
/// not set.
///
/// ```ignore
/// use echostream_provider::init_logging_with_default;
///
/// init_logging_with_default("echostream_provider=debug");
/// ```
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Unlike [`init_logging`], this function does not panic if a subscriber
/// has already been set, which suits tests and embedders that may have
/// installed their own.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(filter("info"))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}
