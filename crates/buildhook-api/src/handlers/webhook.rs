//! Bitbucket push webhook handler.
//!
//! Admits the push through the core gate, launches the satis build for the
//! pushed repository and streams its output back as server-sent events.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use buildhook_core::{authorize, HookError, WebhookHeaders};
use buildhook_runner::{stream_process, BuildEnvironment};
use bytes::Bytes;
use tracing::{error, info, instrument, warn};

use super::create_error_response;
use crate::{sse, AppState};

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Handles `POST /webhook/bitbucket`.
///
/// # Errors
///
/// Returns appropriate HTTP status codes:
/// - 400: Missing delivery header or repository name
/// - 403: Request did not come from a trusted range
/// - 500: Build process could not be started
#[instrument(
    name = "bitbucket_webhook",
    skip(state, headers, body),
    fields(
        peer = %peer,
        event_key = headers.get("x-event-key").and_then(|v| v.to_str().ok()).unwrap_or("none"),
        request_uuid = headers.get("x-request-uuid").and_then(|v| v.to_str().ok()).unwrap_or("none"),
    )
)]
pub async fn bitbucket_webhook(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let client_ip = client_ip(peer, &headers, state.behind_proxy);
    let webhook_headers =
        WebhookHeaders::from_lookup(|name| headers.get(name).and_then(|v| v.to_str().ok()));

    let push = match authorize(&state.trusted, client_ip, &webhook_headers, &body) {
        Ok(push) => push,
        Err(e) => {
            warn!(client_ip = %client_ip, error = %e, "Webhook rejected");
            return create_error_response(rejection_status(&e), e.code(), e.to_string());
        },
    };

    info!(
        repository = %push.repository,
        attempt = push.attempt_number,
        client_ip = %client_ip,
        "Webhook admitted, starting build"
    );

    let spec = state.build.process_for(&push.repository, BuildEnvironment::from_process());
    match stream_process(spec) {
        Ok(frames) => sse::build_response(frames),
        Err(e) => {
            error!(error = %e, "Failed to start build");
            create_error_response(StatusCode::INTERNAL_SERVER_ERROR, e.code(), e.to_string())
        },
    }
}

/// Address the request is attributed to.
///
/// Uses the right-most `X-Forwarded-For` entry when `behind_proxy` is set
/// and it parses; the TCP peer otherwise.
fn client_ip(peer: SocketAddr, headers: &HeaderMap, behind_proxy: bool) -> IpAddr {
    if behind_proxy {
        let forwarded = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').next())
            .and_then(|ip| ip.trim().parse().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    peer.ip()
}

fn rejection_status(error: &HookError) -> StatusCode {
    match error {
        HookError::Unauthorized => StatusCode::FORBIDDEN,
        HookError::MalformedRequest { .. } => StatusCode::BAD_REQUEST,
        HookError::InvalidAddress { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
