//! Authorization gate for Bitbucket push webhooks.
//!
//! Admission runs three checks in order and stops at the first failure:
//! 1. Delivery headers are present (`MalformedRequest`)
//! 2. The client address is inside the trusted ranges (`Unauthorized`)
//! 3. The body names a repository (`MalformedRequest`)
//!
//! The gate has no side effects; callers decide what to do with the
//! admitted push.

use std::net::IpAddr;

use serde_json::Value;

use crate::{
    cidr::TrustedRanges,
    error::{HookError, Result},
    models::RepositoryName,
};

/// Header carrying Bitbucket's per-delivery UUID.
pub const REQUEST_UUID_HEADER: &str = "X-Request-UUID";
/// Header carrying the event type, e.g. `repo:push`.
pub const EVENT_KEY_HEADER: &str = "X-Event-Key";
/// Header carrying the delivery attempt counter, starting at 1.
pub const ATTEMPT_NUMBER_HEADER: &str = "X-Attempt-Number";

/// JSON pointers tried in order for the repository full name.
///
/// Push payloads carry it at the top level; payloads relayed through a
/// `data` envelope nest it one level down.
pub const REPOSITORY_NAME_PATHS: [&str; 2] =
    ["/repository/full_name", "/data/repository/full_name"];

/// Raw delivery headers as received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    /// `X-Request-UUID`
    pub request_uuid: Option<String>,
    /// `X-Event-Key`
    pub event_key: Option<String>,
    /// `X-Attempt-Number`
    pub attempt_number: Option<String>,
}

impl WebhookHeaders {
    /// Collects the delivery headers through a case-insensitive lookup.
    ///
    /// The lookup receives the canonical header names defined in this
    /// module.
    pub fn from_lookup<'a, F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        Self {
            request_uuid: lookup(REQUEST_UUID_HEADER).map(str::to_string),
            event_key: lookup(EVENT_KEY_HEADER).map(str::to_string),
            attempt_number: lookup(ATTEMPT_NUMBER_HEADER).map(str::to_string),
        }
    }
}

/// A webhook that passed every admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedPush {
    /// Delivery UUID
    pub request_uuid: String,
    /// Event type
    pub event_key: String,
    /// Delivery attempt, always positive
    pub attempt_number: u32,
    /// Repository to rebuild
    pub repository: RepositoryName,
    /// Address the request came from
    pub client_ip: IpAddr,
}

/// Decides whether a webhook may trigger a build.
///
/// # Errors
///
/// - `HookError::MalformedRequest` if a delivery header is missing, empty or
///   zero, or if the body carries no repository full name
/// - `HookError::Unauthorized` if `client_ip` is outside `trusted`
pub fn authorize(
    trusted: &TrustedRanges,
    client_ip: IpAddr,
    headers: &WebhookHeaders,
    body: &[u8],
) -> Result<AdmittedPush> {
    let request_uuid = required_header(headers.request_uuid.as_deref(), REQUEST_UUID_HEADER)?;
    let event_key = required_header(headers.event_key.as_deref(), EVENT_KEY_HEADER)?;
    let attempt_number = attempt_number(headers.attempt_number.as_deref())?;

    if !trusted.contains_ip(client_ip) {
        return Err(HookError::Unauthorized);
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|_| HookError::malformed("webhook body is not valid JSON"))?;
    let repository = repository_name(&payload)
        .ok_or_else(|| HookError::malformed("repository.full_name is missing"))?;

    Ok(AdmittedPush { request_uuid, event_key, attempt_number, repository, client_ip })
}

/// Returns the first non-empty repository full name along
/// `REPOSITORY_NAME_PATHS`.
pub fn repository_name(payload: &Value) -> Option<RepositoryName> {
    REPOSITORY_NAME_PATHS
        .iter()
        .filter_map(|path| payload.pointer(path))
        .filter_map(Value::as_str)
        .find_map(|name| RepositoryName::new(name).ok())
}

fn required_header(value: Option<&str>, name: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(HookError::malformed(format!("missing {name} header"))),
    }
}

fn attempt_number(value: Option<&str>) -> Result<u32> {
    value
        .map(str::trim)
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| HookError::malformed(format!("missing {ATTEMPT_NUMBER_HEADER} header")))
}
