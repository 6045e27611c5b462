//! WebSocket route for realtime market data

use crate::{
    AppState,
    error::{ApiError, Result},
};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// WebSocket endpoint clients subscribe through
pub async fn pusher_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Handle one client's connection until it closes or the hub drops it
async fn handle_connection(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    info!("Connection opened to [{}]", client_id);

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    if let Err(e) = state.hub.register(client_id, outbound_tx) {
        error!("Failed to register [{}]: {}", client_id, e);
        return;
    }

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Subscription messages from the client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        info!("Received message [{}] from [{}]", text.as_str(), client_id);
                        match state
                            .hub
                            .handle_message(client_id, text.as_str(), &state.repository)
                        {
                            Ok(Some(response)) => {
                                if let Err(e) = send_text(&mut sender, response.to_string()).await {
                                    error!("Failed to send initial data to [{}]: {}", client_id, e);
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => error!("Rejected message from [{}]: {}", client_id, e),
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Connection closed to [{}]", client_id);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error for [{}]: {}", client_id, e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended for [{}]", client_id);
                        break;
                    }
                    _ => {
                        // Binary, ping and pong frames carry no subscriptions
                    }
                }
            }

            // Market updates pushed by the hub
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(text) => {
                        if let Err(e) = send_text(&mut sender, text).await {
                            error!("Failed to push to [{}]: {}", client_id, e);
                            break;
                        }
                    }
                    None => {
                        info!("Hub dropped [{}], closing connection", client_id);
                        let _ = sender.close().await;
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = state.hub.remove_client(client_id) {
        error!("Failed to remove [{}] from channels: {}", client_id, e);
    }
    debug!("WebSocket connection closed for [{}]", client_id);
}

async fn send_text(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    text: String,
) -> Result<()> {
    sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| ApiError::internal(&format!("WebSocket send failed: {}", e)))
}
