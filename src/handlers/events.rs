use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};

use crate::AppState;

/// GET /sse/events: stream of storage change events.
///
/// The listener lives inside the stream, so it is released when the client
/// disconnects or a write fails and axum drops the body.
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let listener = state.notifier.subscribe();
    tracing::info!(listener = listener.id(), "SSE connection opened");

    let events = stream::unfold(listener, |mut listener| async move {
        let change = listener.recv().await?;
        let event = Event::default()
            .event("update")
            .json_data(change.as_ref());
        Some((event, listener))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
