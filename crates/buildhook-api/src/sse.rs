//! Server-sent event encoding of build frames.
//!
//! Each frame becomes one `data:` event. Keep-alive comments hold idle
//! connections open while a build is quiet.

use std::{convert::Infallible, time::Duration};

use axum::response::{
    sse::{Event, KeepAlive, Sse},
    IntoResponse, Response,
};
use buildhook_runner::{Frame, FrameStream};
use futures::{Stream, StreamExt};

/// Interval between keep-alive comments.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Encodes one frame as an SSE event.
pub fn frame_event(frame: &Frame) -> Event {
    Event::default().data(frame.text())
}

/// Maps a frame stream to SSE events.
pub fn frame_events(frames: FrameStream) -> impl Stream<Item = Result<Event, Infallible>> {
    frames.map(|frame| Ok(frame_event(&frame)))
}

/// Streams `frames` as a `text/event-stream` response.
///
/// The response body owns the stream, so a client disconnect drops it and
/// the build is killed.
pub fn build_response(frames: FrameStream) -> Response {
    Sse::new(frame_events(frames))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
        .into_response()
}
