//! Test fixtures shared by the buildhook crates.
//!
//! Provides webhook payload and request builders for exercising the gate
//! and the HTTP layer, plus throwaway project directories with a
//! scripted build for exercising real subprocess streaming.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod fixtures;
pub mod scripts;

pub use fixtures::{enveloped_push_payload, push_payload, WebhookRequestBuilder, WEBHOOK_PATH};
pub use scripts::{FakeProject, SHELL};

/// Parses a `text/event-stream` body into the frames it carries.
///
/// Comment lines (keep-alives) are skipped; each `data:` line becomes one
/// entry in order.
pub fn sse_frames(body: &str) -> Vec<String> {
    body.split("\n\n")
        .flat_map(str::lines)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_frames_skips_comments() {
        let body = "data: $ satis build\n\n:keep-alive\n\ndata: line1\n\ndata: __done__\n\n";
        assert_eq!(sse_frames(body), vec!["$ satis build", "line1", "__done__"]);
    }
}
