use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use log::debug;
use serde_json::json;

use crate::fanout::{FanoutEvent, CONNECTED};

use super::AppState;

fn to_sse(event: &FanoutEvent) -> Event {
    Event::default()
        .event(event.name.as_str())
        .data(event.data.to_string())
}

/// `GET /events`: streams reconciled state changes as server-sent events.
///
/// Each connection gets its own relay queue; a slow client loses events
/// instead of slowing anyone else down.
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let relay = state.fanout.subscribe(state.observer_capacity);
    debug!(
        "Observer attached ({} connected)",
        state.fanout.observer_count()
    );

    let connected = to_sse(&FanoutEvent {
        name: CONNECTED.to_string(),
        data: json!({ "status": "connected" }),
    });

    let updates = stream::unfold(relay, |mut relay| async move {
        let event = relay.recv().await?;
        Some((to_sse(&event), relay))
    });

    let events = stream::once(async move { connected })
        .chain(updates)
        .map(Ok::<_, Infallible>);

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(state.keep_alive)
            .text("keep-alive"),
    )
}
