//! Realtime collaboration relay.
//!
//! A broadcast primitive, not a collaboration protocol: every inbound text
//! frame is re-emitted verbatim to all connected sockets, including the
//! sender. The editor event names riding in the frames (`file:update`,
//! `execution:output`, ...) are opaque to the server; there is no room
//! scoping, no ordering contract and no conflict resolution beyond last
//! write wins.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::Response;
use futures_util::SinkExt as _;
use futures_util::StreamExt as _;
use tokio::sync::broadcast;

use super::AppState;

/// Frames kept in flight per receiver before a slow client starts skipping
const RELAY_CAPACITY: usize = 4096;

/// The global fan-out hub, cloneable and held in the app state
#[derive(Clone)]
pub struct RelayHub {
    sender: broadcast::Sender<Arc<str>>,
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(RELAY_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the hub; every session holds its own receiver
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.sender.subscribe()
    }

    /// Fan a frame out to every subscriber, the publisher included
    pub fn publish(&self, frame: impl Into<Arc<str>>) {
        // send() errors when there is no receiver, which is fine
        let _ = self.sender.send(frame.into());
    }
}

/// Upgrade to the collaboration relay socket
#[utoipa::path(
    get, path = "/ws",
    tag = "relay",
    responses(
        (status = 101, description = "Switching to the WebSocket protocol"),
    )
)]
pub(in crate::views) async fn websocket(
    State(app_state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let relay = app_state.relay.clone();
    ws.on_upgrade(move |socket| relay_session(socket, relay))
}

async fn relay_session(socket: WebSocket, relay: RelayHub) {
    let mut subscription = relay.subscribe();
    let (mut sink, mut stream) = socket.split();

    // hub -> socket
    let forward = tokio::spawn(async move {
        loop {
            match subscription.recv().await {
                Ok(frame) => {
                    if sink.send(Message::Text(frame.as_ref().into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "relay subscriber lagging, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // socket -> hub
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(frame)) => {
                tracing::trace!(bytes = frame.len(), "relaying frame");
                relay.publish(frame.as_str());
            }
            Ok(Message::Close(_)) | Err(_) => break,
            // pings are answered by axum, binary frames are not part of the protocol
            Ok(_) => {}
        }
    }

    forward.abort();
    tracing::debug!("socket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn frames_reach_every_subscriber_verbatim() {
        let hub = RelayHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        let frame = r#"{"event":"file:update","payload":"fn main() {}"}"#;
        hub.publish(frame);

        assert_eq!(first.recv().await.unwrap().as_ref(), frame);
        assert_eq!(second.recv().await.unwrap().as_ref(), frame);
    }

    #[tokio::test]
    async fn the_publisher_receives_its_own_frames() {
        let hub = RelayHub::new();
        let mut own = hub.subscribe();

        hub.publish("hello");

        assert_eq!(own.recv().await.unwrap().as_ref(), "hello");
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let hub = RelayHub::new();
        hub.publish("nobody listens");
    }

    #[tokio::test]
    async fn late_subscribers_miss_earlier_frames() {
        let hub = RelayHub::new();
        let mut early = hub.subscribe();
        hub.publish("first");

        let mut late = hub.subscribe();
        hub.publish("second");

        assert_eq!(early.recv().await.unwrap().as_ref(), "first");
        assert_eq!(early.recv().await.unwrap().as_ref(), "second");
        // no replay for newcomers
        assert_eq!(late.recv().await.unwrap().as_ref(), "second");
    }
}
