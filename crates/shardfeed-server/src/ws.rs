//! WebSocket subscriber endpoint.
//!
//! Each connection gets a bounded outbound queue drained by its own writer
//! task. The broadcaster only ever calls `try_send` on that queue, so a slow
//! or stuck client fills its own queue and loses messages without holding
//! up any indexing thread.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};

use shardfeed_core::{DeliveryError, Envelope, SendHandle, Subscriber};

use crate::state::AppState;

/// [`SendHandle`] over a subscriber's bounded outbound queue.
pub struct ChannelSendHandle {
    tx: mpsc::Sender<Envelope>,
}

impl ChannelSendHandle {
    pub fn new(tx: mpsc::Sender<Envelope>) -> Self {
        Self { tx }
    }
}

impl SendHandle for ChannelSendHandle {
    fn send(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        self.tx.try_send(envelope.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Backpressure,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// WebSocket upgrade handler for change subscribers
pub async fn ws_changes(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_subscriber(socket, state))
}

/// Serve one subscriber until either side closes
async fn handle_subscriber(socket: WebSocket, state: AppState) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Envelope>(state.config.send_buffer);

    state.registry().register(Subscriber::new(
        connection_id.as_str(),
        Arc::new(ChannelSendHandle::new(tx)),
    ));
    tracing::info!(connection_id = %connection_id, "subscriber connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            if sender.send(Message::Text(envelope.into())).await.is_err() {
                break;
            }
        }
    });

    // Clients have nothing to say; only watch for close or error.
    let recv_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(connection_id = %recv_id, "WebSocket error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.registry().unregister(&connection_id);
    tracing::info!(connection_id = %connection_id, "subscriber disconnected");
}
