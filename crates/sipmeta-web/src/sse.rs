//! Server-Sent Events for cache activity

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use sipmeta_core::{EventBus, TokenEvent};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Create an SSE stream from the event bus
/// Takes EventBus by value (cheap clone, Arc internally)
pub fn create_sse_stream(event_bus: EventBus) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = event_bus.subscribe();
    let stream = BroadcastStream::new(rx);

    // Lagged receivers drop the missed events
    let sse_stream = stream.filter_map(|result: Result<TokenEvent, _>| {
        result.ok().map(|event| Ok(to_sse_event(&event)))
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &TokenEvent) -> Event {
    let data = match event {
        TokenEvent::FetchFailed { contract_id, reason } => {
            json!({ "contractId": contract_id.as_str(), "reason": reason })
        }
        other => json!({ "contractId": other.contract_id().as_str() }),
    };
    Event::default().event(event.kind()).data(data.to_string())
}
