//! Admission rules for incoming build webhooks.
//!
//! Provides CIDR allowlist matching and the authorization gate that turns a
//! raw webhook (client address, headers, body) into an admitted push or a
//! rejection. Everything here is pure: no I/O, no runtime, no framework.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cidr;
pub mod error;
pub mod models;
pub mod webhook;

pub use cidr::{is_in_any_range, CidrRange, TrustedRanges, DEFAULT_TRUSTED_RANGES};
pub use error::{HookError, Result};
pub use models::RepositoryName;
pub use webhook::{authorize, AdmittedPush, WebhookHeaders, REPOSITORY_NAME_PATHS};
