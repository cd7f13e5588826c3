//! Error taxonomy for webhook admission.
//!
//! Codes are stable so clients and logs can tell rejections apart without
//! parsing messages.

use thiserror::Error;

/// Result type alias using `HookError`.
pub type Result<T> = std::result::Result<T, HookError>;

/// Reasons a webhook is not admitted, plus allowlist parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// Required header or body field missing, empty or zero (E1001).
    #[error("[E1001] Malformed request: {reason}")]
    MalformedRequest {
        /// What was missing or invalid
        reason: String,
    },

    /// Source address is not inside any trusted range (E1002).
    ///
    /// The message is intentionally generic and never names the ranges.
    #[error("[E1002] Unauthorized: request did not originate from a trusted source")]
    Unauthorized,

    /// Address or CIDR string is not well-formed IPv4 (E1003).
    #[error("[E1003] Invalid address: {input:?} is not an IPv4 address or CIDR range")]
    InvalidAddress {
        /// The offending input
        input: String,
    },
}

impl HookError {
    /// Creates a malformed-request error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest { reason: reason.into() }
    }

    /// Creates an invalid-address error.
    pub fn invalid_address(input: impl Into<String>) -> Self {
        Self::InvalidAddress { input: input.into() }
    }

    /// Returns the error code (E1001-E1003).
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MalformedRequest { .. } => "E1001",
            Self::Unauthorized => "E1002",
            Self::InvalidAddress { .. } => "E1003",
        }
    }
}
