//! Server-Sent Events support

use crate::runtime::DisplayEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert broadcast stream to SSE stream
pub fn sse_stream(
    init_event: DisplayEvent,
    broadcast_rx: tokio::sync::broadcast::Receiver<DisplayEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Create stream that starts with init event then broadcasts
    let init = futures::stream::once(async move { Ok(to_axum_event(&init_event)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(to_axum_event(&event))),
        Err(_) => None, // Skip lagged messages
    });

    let combined = init.chain(broadcasts);

    Sse::new(combined).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn to_axum_event(event: &DisplayEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event_name(event)).data(data)
}

fn event_name(event: &DisplayEvent) -> &'static str {
    match event {
        DisplayEvent::Init { .. } => "init",
        DisplayEvent::Clear => "clear",
        DisplayEvent::Render { .. } => "render",
        DisplayEvent::Delta { .. } => "delta",
        DisplayEvent::Status { .. } => "status",
        DisplayEvent::Summary { .. } => "summary",
        DisplayEvent::Busy { .. } => "busy",
    }
}
