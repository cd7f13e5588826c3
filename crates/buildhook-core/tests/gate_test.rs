//! Integration tests for webhook admission.
//!
//! Drives `authorize` with realistic Bitbucket payloads and the default
//! trusted ranges.

use std::net::{IpAddr, Ipv4Addr};

use buildhook_core::{authorize, HookError, TrustedRanges, WebhookHeaders};
use buildhook_testing::{enveloped_push_payload, push_payload};
use serde_json::json;

fn headers() -> WebhookHeaders {
    WebhookHeaders {
        request_uuid: Some("0f6c2a54-3b1d-4c55-9d4e-7b1f3a2c9e10".to_string()),
        event_key: Some("repo:push".to_string()),
        attempt_number: Some("1".to_string()),
    }
}

fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(a, b, c, d))
}

#[test]
fn loopback_push_is_admitted() {
    let body = push_payload("acme/widgets").to_string();

    let push = authorize(&TrustedRanges::default(), ip(127, 0, 0, 1), &headers(), body.as_bytes())
        .expect("loopback should be trusted");

    assert_eq!(push.repository.as_str(), "acme/widgets");
}

#[test]
fn bitbucket_range_push_is_admitted() {
    let body = push_payload("acme/widgets").to_string();

    let result =
        authorize(&TrustedRanges::default(), ip(104, 192, 140, 7), &headers(), body.as_bytes());

    assert!(result.is_ok());
}

#[test]
fn documentation_address_is_unauthorized() {
    let body = push_payload("acme/widgets").to_string();

    let result =
        authorize(&TrustedRanges::default(), ip(203, 0, 113, 5), &headers(), body.as_bytes());

    assert_eq!(result.unwrap_err(), HookError::Unauthorized);
}

#[test]
fn missing_event_key_is_malformed() {
    let mut headers = headers();
    headers.event_key = None;
    let body = push_payload("acme/widgets").to_string();

    let result = authorize(&TrustedRanges::default(), ip(127, 0, 0, 1), &headers, body.as_bytes());

    assert!(matches!(result, Err(HookError::MalformedRequest { .. })));
}

#[test]
fn zero_attempt_number_is_malformed() {
    let mut headers = headers();
    headers.attempt_number = Some("0".to_string());
    let body = push_payload("acme/widgets").to_string();

    let result = authorize(&TrustedRanges::default(), ip(127, 0, 0, 1), &headers, body.as_bytes());

    assert!(matches!(result, Err(HookError::MalformedRequest { .. })));
}

#[test]
fn body_without_repository_is_malformed_even_with_valid_headers() {
    let bodies = [
        json!({}),
        json!({"repository": {}}),
        json!({"repository": {"full_name": ""}}),
        json!({"data": {"repository": {"name": "widgets"}}}),
        json!({"data": {}}),
    ];

    for body in bodies {
        let result = authorize(
            &TrustedRanges::default(),
            ip(127, 0, 0, 1),
            &headers(),
            body.to_string().as_bytes(),
        );
        assert!(
            matches!(result, Err(HookError::MalformedRequest { .. })),
            "expected malformed for {body}"
        );
    }
}

#[test]
fn enveloped_payload_is_admitted() {
    let body = enveloped_push_payload("acme/nested").to_string();

    let push = authorize(&TrustedRanges::default(), ip(127, 0, 0, 1), &headers(), body.as_bytes())
        .expect("enveloped payload should be accepted");

    assert_eq!(push.repository.as_str(), "acme/nested");
}

#[test]
fn custom_allowlist_replaces_defaults() {
    let trusted = TrustedRanges::parse(&["10.20.0.0/16"]).unwrap();
    let body = push_payload("acme/widgets").to_string();

    assert!(authorize(&trusted, ip(10, 20, 5, 5), &headers(), body.as_bytes()).is_ok());
    assert_eq!(
        authorize(&trusted, ip(127, 0, 0, 1), &headers(), body.as_bytes()).unwrap_err(),
        HookError::Unauthorized
    );
}

#[test]
fn gate_is_repeatable() {
    let body = push_payload("acme/widgets").to_string();
    let trusted = TrustedRanges::default();

    let first = authorize(&trusted, ip(127, 0, 0, 1), &headers(), body.as_bytes());
    let second = authorize(&trusted, ip(127, 0, 0, 1), &headers(), body.as_bytes());

    assert_eq!(first, second);
}
