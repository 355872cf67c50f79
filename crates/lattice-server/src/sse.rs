//! Topic subscriptions as server-sent event streams

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};
use tokio_util::sync::CancellationToken;

use lattice_analysis::Subscription;

use crate::ServerState;

/// Stream a topic to the client with the broker's replay semantics:
/// buffered events first, then live publishes in version order. The
/// stream ends when the client disconnects or the server shuts down.
pub async fn subscribe_topic(
    Path(topic): Path<String>,
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    tracing::debug!("subscribing client to {topic}");
    let subscription = state.broker.subscribe(&topic);
    let cancel = state.cancel.clone();

    let stream = stream::unfold(
        (subscription, cancel),
        |(mut subscription, cancel): (Subscription, CancellationToken)| async move {
            let event = tokio::select! {
                _ = cancel.cancelled() => return None,
                event = subscription.recv() => event?,
            };
            let sse = match SseEvent::default()
                .event(event.event_type.clone())
                .json_data(&event)
            {
                Ok(sse) => sse,
                Err(err) => {
                    tracing::error!("event serialisation failed: {err}");
                    SseEvent::default().comment("serialisation failure")
                }
            };
            Some((Ok(sse), (subscription, cancel)))
        },
    );
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use lattice_analysis::{Broker, ModuleHolder, TopicConfig};
    use lattice_core::Module;

    fn state() -> Arc<ServerState> {
        Arc::new(ServerState::new(
            Arc::new(ModuleHolder::new(Module::new("m", "/ws"))),
            Arc::new(Broker::new()),
            CancellationToken::new(),
        ))
    }

    #[tokio::test]
    async fn replayed_event_arrives_first() {
        let state = state();
        state
            .broker
            .register_topic("workspace_status", TopicConfig::latest_only());
        state.broker.publish(
            "workspace_status",
            "status",
            serde_json::json!({"state": "ready"}),
        );

        let mut subscription = state.broker.subscribe("workspace_status");
        let replayed = subscription.recv().await.unwrap();
        assert_eq!(replayed.version, 0);
        assert_eq!(replayed.data["state"], "ready");
    }

    #[tokio::test]
    async fn shutdown_ends_the_stream() {
        let state = state();
        let sse_state = state.clone();
        let subscription = sse_state.broker.subscribe("t");
        let cancel = sse_state.cancel.clone();
        let mut stream = Box::pin(stream::unfold(
            (subscription, cancel),
            |(mut subscription, cancel)| async move {
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    event = subscription.recv() => {
                        event.map(|event| (event.version, (subscription, cancel)))
                    }
                }
            },
        ));

        state.broker.publish("t", "tick", serde_json::json!(1));
        assert_eq!(stream.next().await, Some(0));
        state.cancel.cancel();
        assert_eq!(stream.next().await, None);
    }
}
