//! Buildhook HTTP API.
//!
//! Receives Bitbucket push webhooks, admits them through the core gate and
//! streams the resulting satis build back to the caller as server-sent
//! events.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{sync::Arc, time::Duration};

use buildhook_core::TrustedRanges;
use buildhook_runner::SatisBuild;

pub mod config;
pub mod handlers;
pub mod server;
pub mod sse;

pub use config::Config;
pub use server::{create_router, start_server};

/// Shared application state for HTTP handlers.
///
/// Everything in here is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    /// Source allowlist
    pub trusted: Arc<TrustedRanges>,
    /// Build launcher
    pub build: Arc<SatisBuild>,
    /// Resolve the client from `X-Forwarded-For`
    pub behind_proxy: bool,
    /// Deadline for producing response headers
    pub request_timeout: Duration,
}

impl AppState {
    /// Creates state with a 30 second request timeout and the TCP peer as
    /// client address.
    pub fn new(trusted: TrustedRanges, build: SatisBuild) -> Self {
        Self {
            trusted: Arc::new(trusted),
            build: Arc::new(build),
            behind_proxy: false,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Builds state from validated configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            trusted: Arc::new(config.trusted_ranges()?),
            build: Arc::new(config.satis_build()),
            behind_proxy: config.behind_proxy,
            request_timeout: config.request_timeout(),
        })
    }

    /// Enables or disables `X-Forwarded-For` client resolution.
    pub fn with_behind_proxy(mut self, behind_proxy: bool) -> Self {
        self.behind_proxy = behind_proxy;
        self
    }
}
