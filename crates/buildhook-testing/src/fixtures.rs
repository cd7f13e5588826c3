//! Webhook payloads and request builders.
//!
//! Defaults describe a valid Bitbucket push from loopback, so each test
//! only states the one thing it breaks.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{body::Body, extract::ConnectInfo, http::Request};
use serde_json::{json, Value};
use uuid::Uuid;

/// Route the webhook handler is mounted on.
pub const WEBHOOK_PATH: &str = "/webhook/bitbucket";

/// Minimal push payload with the repository at the top level.
pub fn push_payload(full_name: &str) -> Value {
    json!({
        "actor": {"display_name": "Test Runner"},
        "repository": {
            "full_name": full_name,
            "scm": "git",
            "is_private": true
        },
        "push": {"changes": []}
    })
}

/// Push payload wrapped in a `data` envelope.
pub fn enveloped_push_payload(full_name: &str) -> Value {
    json!({
        "data": {
            "repository": {"full_name": full_name},
            "push": {"changes": []}
        }
    })
}

/// Builder for webhook HTTP requests.
pub struct WebhookRequestBuilder {
    peer: SocketAddr,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl WebhookRequestBuilder {
    /// Valid push for `acme/widgets` from `127.0.0.1`.
    pub fn new() -> Self {
        Self {
            peer: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40_000),
            headers: vec![
                ("X-Request-UUID".to_string(), Uuid::new_v4().to_string()),
                ("X-Event-Key".to_string(), "repo:push".to_string()),
                ("X-Attempt-Number".to_string(), "1".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body: push_payload("acme/widgets").to_string().into_bytes(),
        }
    }

    /// Sets the TCP peer address.
    pub fn peer(mut self, ip: impl Into<IpAddr>) -> Self {
        self.peer = SocketAddr::new(ip.into(), self.peer.port());
        self
    }

    /// Sets or replaces a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Removes a header.
    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self
    }

    /// Uses a JSON body.
    pub fn json(mut self, payload: &Value) -> Self {
        self.body = payload.to_string().into_bytes();
        self
    }

    /// Uses a raw body.
    pub fn raw_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Header pairs as they will be sent.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Body bytes as they will be sent.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Peer address as it will be seen by the server.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Builds a POST request with `ConnectInfo` attached, ready for
    /// `oneshot`.
    pub fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(WEBHOOK_PATH);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let mut request = builder.body(Body::from(self.body)).expect("valid request parts");
        request.extensions_mut().insert(ConnectInfo(self.peer));
        request
    }
}

impl Default for WebhookRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
