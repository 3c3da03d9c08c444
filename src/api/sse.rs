//! Server-Sent Events support

use crate::runtime::{SseEvent, Subscription};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Events for one client: the snapshot, then every broadcast. A client that
/// falls behind gets the latest full view in place of what it missed.
pub fn session_events(subscription: Subscription) -> impl Stream<Item = SseEvent> {
    let Subscription {
        view,
        events,
        latest,
    } = subscription;

    let init = futures::stream::once(async move { SseEvent::Init { view } });
    let updates = BroadcastStream::new(events).map(move |result| match result {
        Ok(event) => event,
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            tracing::debug!(missed, "SSE client lagged, resending latest view");
            SseEvent::Render {
                view: latest.borrow().clone(),
            }
        }
    });

    init.chain(updates)
}

/// Serve a subscription as an SSE response
pub fn sse_stream(
    subscription: Subscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = session_events(subscription).map(|event| Ok(sse_event_to_axum(event)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn sse_event_to_axum(event: SseEvent) -> Event {
    let (event_type, data) = match event {
        SseEvent::Init { view } => (
            "init",
            json!({
                "type": "init",
                "view": view
            }),
        ),
        SseEvent::Render { view } => (
            "render",
            json!({
                "type": "render",
                "view": view
            }),
        ),
        SseEvent::Error { message } => (
            "error",
            json!({
                "type": "error",
                "message": message
            }),
        ),
    };

    Event::default().event(event_type).data(data.to_string())
}
